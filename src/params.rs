//! Parameter values and the parameter → command-line flag mapping
//!
//! Subjects are black boxes driven purely by flags. A [`FlagMapping`] turns a
//! [`ParamMap`] into an argument vector deterministically: positional
//! arguments first (by index), then flags in the order the mapping declares
//! them. Any parameter the mapping does not know is rejected before a process
//! is spawned.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Named parameter values for one invocation.
pub type ParamMap = BTreeMap<String, Scalar>;

/// A scalar parameter or axis value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    /// Boolean toggle, rendered as a presence flag.
    Bool(bool),
    /// Integer (sizes, counts, ports).
    Int(i64),
    /// Floating point value.
    Float(f64),
    /// Free text (paths, addresses).
    Text(String),
}

impl Scalar {
    /// Numeric view of the value, used for chart positioning.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Bool(_) | Self::Text(_) => None,
        }
    }

    /// Whether the value is an integer or float.
    #[must_use]
    pub const fn is_numeric(&self) -> bool {
        matches!(self, Self::Int(_) | Self::Float(_))
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// How one parameter appears on a subject's command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "arg", rename_all = "snake_case")]
pub enum FlagSpec {
    /// `-b 4096`
    Valued(String),
    /// `-d` when the value is `true`, nothing when `false`
    Presence(String),
    /// Bare argument at this position, ahead of every flag
    Positional(usize),
}

/// One parameter name bound to its flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagEntry {
    /// Parameter name
    pub param: String,
    /// Command-line rendering
    pub spec: FlagSpec,
}

/// Ordered parameter → flag mapping for one process role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlagMapping {
    entries: Vec<FlagEntry>,
}

impl FlagMapping {
    /// Create an empty mapping.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a `-x <value>` flag.
    #[must_use]
    pub fn valued(self, param: impl Into<String>, flag: impl Into<String>) -> Self {
        self.with(param, FlagSpec::Valued(flag.into()))
    }

    /// Append a bare boolean flag.
    #[must_use]
    pub fn presence(self, param: impl Into<String>, flag: impl Into<String>) -> Self {
        self.with(param, FlagSpec::Presence(flag.into()))
    }

    /// Append a positional argument.
    #[must_use]
    pub fn positional(self, param: impl Into<String>, index: usize) -> Self {
        self.with(param, FlagSpec::Positional(index))
    }

    /// Append an arbitrary entry. A later entry for the same parameter replaces
    /// the earlier one in place.
    #[must_use]
    pub fn with(mut self, param: impl Into<String>, spec: FlagSpec) -> Self {
        let param = param.into();
        if let Some(entry) = self.entries.iter_mut().find(|e| e.param == param) {
            entry.spec = spec;
        } else {
            self.entries.push(FlagEntry { param, spec });
        }
        self
    }

    /// Whether `param` has a mapping.
    #[must_use]
    pub fn contains(&self, param: &str) -> bool {
        self.entries.iter().any(|e| e.param == param)
    }

    /// Mapping entries in declaration order.
    #[must_use]
    pub fn entries(&self) -> &[FlagEntry] {
        &self.entries
    }

    /// Check the mapping itself: positional indices must be unique.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] on a repeated positional index.
    pub fn validate(&self) -> Result<()> {
        let mut seen = BTreeMap::new();
        for entry in &self.entries {
            if let FlagSpec::Positional(index) = entry.spec {
                if let Some(other) = seen.insert(index, &entry.param) {
                    return Err(Error::Config(format!(
                        "positional argument {index} mapped by both `{other}` and `{}`",
                        entry.param
                    )));
                }
            }
        }
        Ok(())
    }

    /// Ensure every name in `params` has a mapping, without rendering.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownParameter`] naming `target`.
    pub fn check<'a>(&self, params: impl IntoIterator<Item = &'a String>, target: &str) -> Result<()> {
        for param in params {
            if !self.contains(param) {
                return Err(Error::UnknownParameter {
                    param: param.clone(),
                    target: target.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Render `params` into an argument vector.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownParameter`] if a parameter has no mapping
    /// - [`Error::Config`] if a presence flag gets a non-boolean value or the
    ///   positional arguments present leave a gap
    pub fn render(&self, params: &ParamMap, target: &str) -> Result<Vec<String>> {
        self.check(params.keys(), target)?;

        let mut positionals: Vec<(usize, String)> = Vec::new();
        let mut flags = Vec::new();

        for entry in &self.entries {
            let Some(value) = params.get(&entry.param) else {
                continue;
            };
            match &entry.spec {
                FlagSpec::Positional(index) => positionals.push((*index, value.to_string())),
                FlagSpec::Valued(flag) => {
                    flags.push(flag.clone());
                    flags.push(value.to_string());
                }
                FlagSpec::Presence(flag) => match value {
                    Scalar::Bool(true) => flags.push(flag.clone()),
                    Scalar::Bool(false) => {}
                    other => {
                        return Err(Error::Config(format!(
                            "presence flag `{flag}` for `{}` needs a boolean, got {other}",
                            entry.param
                        )))
                    }
                },
            }
        }

        positionals.sort_by_key(|(index, _)| *index);
        for (expected, (index, _)) in positionals.iter().enumerate() {
            if *index != expected {
                return Err(Error::Config(format!(
                    "positional argument {expected} missing for {target}"
                )));
            }
        }

        let mut args: Vec<String> = positionals.into_iter().map(|(_, v)| v).collect();
        args.extend(flags);
        Ok(args)
    }
}
