//! Invocation Record - one (subject, axis point) execution

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::params::Scalar;

/// Status of an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationStatus {
    /// Built but not yet started.
    Pending,
    /// Subject process is running.
    Running,
    /// Report captured and decoded.
    Success,
    /// Spawn, exit status or decode failure.
    Failed,
    /// Killed after exceeding its timeout.
    TimedOut,
    /// Record reused from an earlier point (axis-invariant subject).
    Replicated,
}

/// Invocation Record tracks one subject invocation from start to completion.
///
/// The command lines are stored exactly as run, so a failing point can be
/// reproduced by pasting them into a shell.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvocationRecord {
    subject: String,
    axis_index: usize,
    axis_value: Scalar,
    commands: Vec<String>,
    status: InvocationStatus,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl InvocationRecord {
    /// Create a new invocation record in Pending status.
    ///
    /// # Arguments
    ///
    /// * `subject` - Variant label
    /// * `axis_index` - Position of the point on the sweep axis
    /// * `axis_value` - Value of the swept parameter
    #[must_use]
    pub fn new(subject: impl Into<String>, axis_index: usize, axis_value: Scalar) -> Self {
        Self {
            subject: subject.into(),
            axis_index,
            axis_value,
            commands: Vec::new(),
            status: InvocationStatus::Pending,
            started_at: None,
            ended_at: None,
            error: None,
        }
    }

    /// Get the subject label.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Get the axis index.
    #[must_use]
    pub const fn axis_index(&self) -> usize {
        self.axis_index
    }

    /// Get the axis value.
    #[must_use]
    pub const fn axis_value(&self) -> &Scalar {
        &self.axis_value
    }

    /// Get the command lines that were run.
    #[must_use]
    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    /// Get the current status.
    #[must_use]
    pub const fn status(&self) -> InvocationStatus {
        self.status
    }

    /// Get the start timestamp, if started.
    #[must_use]
    pub const fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Get the end timestamp, if completed.
    #[must_use]
    pub const fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// Get the error message of a failed invocation.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Start the invocation, transitioning from Pending to Running.
    pub fn start(&mut self) {
        self.status = InvocationStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Record the command lines that were run.
    pub fn set_commands(&mut self, commands: Vec<String>) {
        self.commands = commands;
    }

    /// Complete the invocation with the given final status.
    pub fn complete(&mut self, status: InvocationStatus) {
        self.status = status;
        self.ended_at = Some(Utc::now());
    }

    /// Complete the invocation as failed with `error`.
    pub fn fail(&mut self, status: InvocationStatus, error: impl Into<String>) {
        self.error = Some(error.into());
        self.complete(status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invocation_status_default() {
        let record = InvocationRecord::new("Condy", 0, Scalar::Int(1));
        assert_eq!(record.status(), InvocationStatus::Pending);
        assert!(record.started_at().is_none());
    }

    #[test]
    fn test_invocation_lifecycle() {
        let mut record = InvocationRecord::new("Condy", 2, Scalar::Int(4));
        record.start();
        assert_eq!(record.status(), InvocationStatus::Running);
        record.fail(InvocationStatus::TimedOut, "timed out after 10s");
        assert_eq!(record.status(), InvocationStatus::TimedOut);
        assert_eq!(record.error(), Some("timed out after 10s"));
        assert!(record.ended_at() >= record.started_at());
    }
}
