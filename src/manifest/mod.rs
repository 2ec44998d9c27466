//! Sweep provenance
//!
//! A manifest is written next to every result table so that any point can be
//! rerun by hand.
//!
//! ## Schema Overview
//!
//! ```text
//! SweepManifest (1) ──< InvocationRecord (N) [execution order]
//!                   └──< ArtifactRecord (N)  [csv, parquet, svg]
//! ```

mod artifact_record;
mod invocation_record;
mod sweep_manifest;

pub use artifact_record::ArtifactRecord;
pub use invocation_record::{InvocationRecord, InvocationStatus};
pub use sweep_manifest::SweepManifest;
