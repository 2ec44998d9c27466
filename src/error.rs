//! Error types for runtime-sweep
//!
//! Every fatal error carries enough context (subject, axis point, command line,
//! captured output) to rerun the failing invocation by hand.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::decode::DecodeError;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Identity of one (subject, axis point) invocation, attached to fatal errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationContext {
    /// Variant label of the subject.
    pub subject: String,
    /// Name of the swept parameter.
    pub axis: String,
    /// Axis value rendered as text.
    pub value: String,
    /// Shell-quoted command lines that were run, server first when paired.
    pub commands: Vec<String>,
}

impl fmt::Display for InvocationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "subject `{}` at {}={}", self.subject, self.axis, self.value)?;
        for command in &self.commands {
            write!(f, "\n  $ {command}")?;
        }
        Ok(())
    }
}

/// runtime-sweep error types
#[derive(Error, Debug)]
pub enum Error {
    /// Subject binary missing or not executable
    #[error("failed to spawn process for {context}: {source}")]
    Spawn {
        /// Failing invocation
        context: Box<InvocationContext>,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// Subject (or load generator) exited unsuccessfully
    #[error("subject exited with {status} for {context}\nstderr:\n{stderr}")]
    SubjectFailure {
        /// Failing invocation
        context: Box<InvocationContext>,
        /// Exit status description
        status: String,
        /// Captured standard output
        stdout: String,
        /// Captured standard error
        stderr: String,
    },

    /// Invocation exceeded its timeout and was killed
    #[error("timed out after {elapsed:?} for {context}")]
    Timeout {
        /// Failing invocation
        context: Box<InvocationContext>,
        /// Time waited before the process was killed
        elapsed: Duration,
    },

    /// Subject report could not be decoded
    #[error("undecodable report for {context}: {source}\nraw output:\n{output}")]
    Decode {
        /// Failing invocation
        context: Box<InvocationContext>,
        /// Offending line
        #[source]
        source: DecodeError,
        /// Raw captured output
        output: String,
    },

    /// A record lacks the metric being aggregated
    #[error("metric `{metric}` missing from subject `{subject}` at axis index {index} ({axis}={value})")]
    MissingMetric {
        /// Variant label
        subject: String,
        /// Metric key that was requested
        metric: String,
        /// Axis index of the record
        index: usize,
        /// Axis name
        axis: String,
        /// Axis value rendered as text
        value: String,
    },

    /// A metric value is not a finite number
    #[error("metric `{key}` has non-numeric value {value:?}")]
    InvalidMetric {
        /// Metric key
        key: String,
        /// Raw reported value
        value: String,
    },

    /// Parameter name has no flag mapping
    #[error("unknown parameter `{param}` for {target}")]
    UnknownParameter {
        /// Parameter name
        param: String,
        /// Subject label or process role the parameter was rendered for
        target: String,
    },

    /// Sweep axis violates its invariants
    #[error("invalid sweep axis `{axis}`: {reason}")]
    InvalidAxis {
        /// Axis name
        axis: String,
        /// What is wrong with it
        reason: String,
    },

    /// A result column does not match the axis length
    #[error("column `{label}` has {actual} values, expected {expected}")]
    RaggedColumn {
        /// Column label
        label: String,
        /// Axis length
        expected: usize,
        /// Column length
        actual: usize,
    },

    /// Port allocator ran past the end of the port range
    #[error("port range exhausted")]
    PortsExhausted,

    /// Plan or engine configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage error (CSV/Parquet/SVG sinks)
    #[error("Storage error: {0}")]
    StorageError(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Arrow error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Invocation context of a fatal invocation error, if it has one.
    #[must_use]
    pub fn context(&self) -> Option<&InvocationContext> {
        match self {
            Self::Spawn { context, .. }
            | Self::SubjectFailure { context, .. }
            | Self::Timeout { context, .. }
            | Self::Decode { context, .. } => Some(context),
            _ => None,
        }
    }
}
