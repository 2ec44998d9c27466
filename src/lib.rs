//! # runtime-sweep: Parameterized Benchmark Sweeps
//!
//! **Version**: 0.1.0
//!
//! runtime-sweep drives external benchmark binaries (one per runtime
//! implementation, called *subjects*) across a range of values for one
//! parameter at a time, decodes the `key: value` report each subject prints,
//! and collects one metric into a table with one row per swept value and
//! one column per subject variant.
//!
//! ## Pipeline
//!
//! ```text
//! SweepPlan ─> SweepEngine ─> Invoke ─> decode ─> aggregate ─> Sink (csv/parquet/svg)
//!                  │                                              │
//!                  └─> EnvironmentController              SweepManifest (json)
//! ```
//!
//! - Invocations run strictly one at a time, in axis order within subject
//!   order.
//! - The first fatal error aborts the sweep: series are either complete
//!   and equal in length or absent.
//! - Server subjects are paired with a load generator and always torn down
//!   before the next invocation.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::path::Path;
//! use runtime_sweep::plan::builtin::builtin;
//!
//! let plan = builtin("spawn", Path::new("./build/benchmarks"))?;
//! for outcome in plan.execute()? {
//!     println!("{}: {} rows", outcome.axis, outcome.table.num_rows());
//! }
//! # Ok::<(), runtime_sweep::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod aggregate;
pub mod axis;
pub mod decode;
pub mod engine;
pub mod env;
pub mod error;
pub mod fixture;
pub mod invoke;
pub mod manifest;
pub mod params;
pub mod plan;
pub mod ports;
pub mod sink;
pub mod subject;
pub mod table;

pub use error::{Error, Result};
