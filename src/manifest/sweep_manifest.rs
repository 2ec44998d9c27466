//! Sweep Manifest - provenance of one sweep run

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ArtifactRecord, InvocationRecord, InvocationStatus};
use crate::axis::SweepAxis;
use crate::params::ParamMap;
use crate::Result;

/// Sweep Manifest is the root entity of a sweep's provenance.
///
/// It records the axis, baseline and subject order the sweep was run with,
/// every invocation in execution order, and the artifacts written from the
/// result table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SweepManifest {
    name: String,
    axis: SweepAxis,
    baseline: ParamMap,
    subjects: Vec<String>,
    created_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    invocations: Vec<InvocationRecord>,
    artifacts: Vec<ArtifactRecord>,
}

impl SweepManifest {
    /// Create a new manifest with the current timestamp.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        axis: SweepAxis,
        baseline: ParamMap,
        subjects: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            axis,
            baseline,
            subjects,
            created_at: Utc::now(),
            finished_at: None,
            invocations: Vec::new(),
            artifacts: Vec::new(),
        }
    }

    /// Get the sweep name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the sweep axis.
    #[must_use]
    pub const fn axis(&self) -> &SweepAxis {
        &self.axis
    }

    /// Get the baseline parameters.
    #[must_use]
    pub const fn baseline(&self) -> &ParamMap {
        &self.baseline
    }

    /// Get subject labels in sweep order.
    #[must_use]
    pub fn subjects(&self) -> &[String] {
        &self.subjects
    }

    /// Get the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Get the finish timestamp, if the sweep completed.
    #[must_use]
    pub const fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Append an invocation record, returning its index.
    pub fn push_invocation(&mut self, invocation: InvocationRecord) -> usize {
        self.invocations.push(invocation);
        self.invocations.len() - 1
    }

    /// Mutable access to a recorded invocation.
    pub fn invocation_mut(&mut self, index: usize) -> Option<&mut InvocationRecord> {
        self.invocations.get_mut(index)
    }

    /// All invocations in execution order.
    #[must_use]
    pub fn invocations(&self) -> &[InvocationRecord] {
        &self.invocations
    }

    /// Invocations of one subject, ordered by axis index.
    #[must_use]
    pub fn invocations_for(&self, subject: &str) -> Vec<&InvocationRecord> {
        let mut found: Vec<&InvocationRecord> = self
            .invocations
            .iter()
            .filter(|inv| inv.subject() == subject)
            .collect();
        found.sort_by_key(|inv| inv.axis_index());
        found
    }

    /// The first failed or timed-out invocation, if any.
    #[must_use]
    pub fn failure(&self) -> Option<&InvocationRecord> {
        self.invocations.iter().find(|inv| {
            matches!(
                inv.status(),
                InvocationStatus::Failed | InvocationStatus::TimedOut
            )
        })
    }

    /// Record an artifact written from the sweep's table.
    pub fn add_artifact(&mut self, artifact: ArtifactRecord) {
        self.artifacts.push(artifact);
    }

    /// Artifacts written so far.
    #[must_use]
    pub fn artifacts(&self) -> &[ArtifactRecord] {
        &self.artifacts
    }

    /// Mark the sweep finished now.
    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Write the manifest as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be created or written.
    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path.as_ref())?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}
