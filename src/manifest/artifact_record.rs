//! Artifact Record - files written by sinks for a sweep

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Artifact Record represents one file produced from a result table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactRecord {
    kind: String,
    path: PathBuf,
    size_bytes: u64,
    created_at: DateTime<Utc>,
}

impl ArtifactRecord {
    /// Create a new artifact record.
    ///
    /// # Arguments
    ///
    /// * `kind` - Sink that wrote it (e.g., "csv", "parquet", "svg")
    /// * `path` - Location of the file
    /// * `size_bytes` - Size of the file in bytes
    #[must_use]
    pub fn new(kind: impl Into<String>, path: impl Into<PathBuf>, size_bytes: u64) -> Self {
        Self {
            kind: kind.into(),
            path: path.into(),
            size_bytes,
            created_at: Utc::now(),
        }
    }

    /// Get the sink kind.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Get the file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the size in bytes.
    #[must_use]
    pub const fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Get the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
