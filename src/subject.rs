//! Subject variants: an external binary plus the label it is reported under

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::params::{ParamMap, Scalar};

/// One subject variant.
///
/// The label only names the result column and chart series. Anything that
/// should change the invocation (direct I/O, fixed descriptors) must be an
/// explicit parameter override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectRef {
    label: String,
    program: PathBuf,
    /// Arguments placed before any mapped parameter.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    leading_args: Vec<String>,
    /// Parameters layered over the baseline for this variant.
    #[serde(default, skip_serializing_if = "ParamMap::is_empty")]
    overrides: ParamMap,
    /// Baseline parameters this subject does not accept.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    exclude: BTreeSet<String>,
}

impl SubjectRef {
    /// Create a subject variant.
    #[must_use]
    pub fn new(label: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        Self {
            label: label.into(),
            program: program.into(),
            leading_args: Vec::new(),
            overrides: ParamMap::new(),
            exclude: BTreeSet::new(),
        }
    }

    /// Add a fixed leading argument.
    #[must_use]
    pub fn with_leading_arg(mut self, arg: impl Into<String>) -> Self {
        self.leading_args.push(arg.into());
        self
    }

    /// Override a baseline parameter for this variant.
    #[must_use]
    pub fn with_override(mut self, param: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.overrides.insert(param.into(), value.into());
        self
    }

    /// Drop a baseline parameter for this variant.
    #[must_use]
    pub fn with_exclude(mut self, param: impl Into<String>) -> Self {
        self.exclude.insert(param.into());
        self
    }

    /// Display label (column and series name).
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Path of the subject binary.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Resolve a relative program path against `dir`.
    #[must_use]
    pub fn resolved_in(mut self, dir: &Path) -> Self {
        if self.program.is_relative() {
            self.program = dir.join(&self.program);
        }
        self
    }

    /// Fixed leading arguments.
    #[must_use]
    pub fn leading_args(&self) -> &[String] {
        &self.leading_args
    }

    /// Parameter overrides.
    #[must_use]
    pub const fn overrides(&self) -> &ParamMap {
        &self.overrides
    }

    /// Whether the subject drops `param`.
    #[must_use]
    pub fn excludes(&self, param: &str) -> bool {
        self.exclude.contains(param)
    }

    /// Whether sweeping `axis_name` leaves this subject's invocation unchanged.
    #[must_use]
    pub fn is_invariant_to(&self, axis_name: &str) -> bool {
        self.excludes(axis_name)
    }
}
