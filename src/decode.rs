//! Output decoder for subject reports
//!
//! Subjects print one metric per line as `key: value`. Lines are split at the
//! first `:` only, both halves are trimmed, and blank lines are skipped.
//! Values stay strings; numeric conversion happens at extraction time through
//! [`parse_metric`], which names the key and raw value on failure.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Error, Result};

/// Why a report line was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeFailure {
    /// No `:` on the line
    MissingSeparator,
    /// Nothing before the `:`
    EmptyKey,
    /// Nothing after the `:`
    EmptyValue,
    /// Key already reported on an earlier line
    DuplicateKey,
}

impl fmt::Display for DecodeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::MissingSeparator => "missing `:` separator",
            Self::EmptyKey => "empty key",
            Self::EmptyValue => "empty value",
            Self::DuplicateKey => "duplicate key",
        })
    }
}

/// Malformed report line. `line` is 1-based and counts blank lines.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {reason}: {text:?}")]
pub struct DecodeError {
    /// 1-based line number
    pub line: usize,
    /// The offending line as printed
    pub text: String,
    /// What is wrong with it
    pub reason: DecodeFailure,
}

/// Decoded metrics from one invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    entries: BTreeMap<String, String>,
}

impl Record {
    /// Raw value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Number of metrics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the report was empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate `(key, value)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Decode a subject report.
///
/// # Errors
///
/// Returns [`DecodeError`] for the first malformed line; nothing from the
/// report is admitted in that case.
///
/// # Example
///
/// ```rust
/// use runtime_sweep::decode::decode;
///
/// let record = decode("time_ms: 12.5\nthroughput_mbps: 100").unwrap();
/// assert_eq!(record.get("time_ms"), Some("12.5"));
/// assert_eq!(record.get("throughput_mbps"), Some("100"));
/// ```
pub fn decode(raw: &str) -> std::result::Result<Record, DecodeError> {
    let mut entries = BTreeMap::new();

    for (idx, text) in raw.lines().enumerate() {
        if text.trim().is_empty() {
            continue;
        }
        let fail = |reason| DecodeError {
            line: idx + 1,
            text: text.to_string(),
            reason,
        };

        let (key, value) = text
            .split_once(':')
            .ok_or_else(|| fail(DecodeFailure::MissingSeparator))?;
        let (key, value) = (key.trim(), value.trim());
        if key.is_empty() {
            return Err(fail(DecodeFailure::EmptyKey));
        }
        if value.is_empty() {
            return Err(fail(DecodeFailure::EmptyValue));
        }
        if entries.insert(key.to_string(), value.to_string()).is_some() {
            return Err(fail(DecodeFailure::DuplicateKey));
        }
    }

    Ok(Record { entries })
}

/// Convert a reported metric value to `f64`.
///
/// # Errors
///
/// Returns [`Error::InvalidMetric`] naming `key` and `raw` if the value is not
/// a finite number.
pub fn parse_metric(key: &str, raw: &str) -> Result<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| Error::InvalidMetric {
            key: key.to_string(),
            value: raw.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_two_metrics() {
        let record = decode("time_ms: 12.5\nthroughput_mbps: 100").unwrap();
        let expected: Record = [("time_ms", "12.5"), ("throughput_mbps", "100")]
            .into_iter()
            .collect();
        assert_eq!(record, expected);
    }

    #[test]
    fn test_decode_missing_colon_names_line_one() {
        let err = decode("malformed_line_no_colon").unwrap_err();
        assert_eq!(err.line, 1);
        assert_eq!(err.reason, DecodeFailure::MissingSeparator);
        assert_eq!(err.text, "malformed_line_no_colon");
    }

    #[test]
    fn test_decode_line_numbers_count_blank_lines() {
        let err = decode("time_ms: 1\n\n   : 5\n").unwrap_err();
        assert_eq!(err.line, 3);
        assert_eq!(err.reason, DecodeFailure::EmptyKey);
    }

    #[test]
    fn test_decode_splits_at_first_colon_only() {
        let record = decode("started_at: 12:30:01").unwrap();
        assert_eq!(record.get("started_at"), Some("12:30:01"));
    }

    #[test]
    fn test_decode_trims_whitespace() {
        let record = decode("  iops :   2048  \r\n\n").unwrap();
        assert_eq!(record.get("iops"), Some("2048"));
        assert_eq!(record.len(), 1);
    }

    #[test]
    fn test_decode_rejects_empty_value() {
        let err = decode("iops:").unwrap_err();
        assert_eq!(err.reason, DecodeFailure::EmptyValue);
    }

    #[test]
    fn test_decode_rejects_duplicate_key() {
        let err = decode("time_ms: 1\ntime_ms: 2").unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(err.reason, DecodeFailure::DuplicateKey);
    }

    #[test]
    fn test_decode_empty_report() {
        assert!(decode("\n\n").unwrap().is_empty());
    }

    #[test]
    fn test_parse_metric_reports_key_and_value() {
        assert!((parse_metric("time_ms", "40").unwrap() - 40.0).abs() < f64::EPSILON);
        let err = parse_metric("time_ms", "fast").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("time_ms"));
        assert!(msg.contains("fast"));
        assert!(parse_metric("iops", "NaN").is_err());
    }
}
