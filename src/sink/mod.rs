//! Result sinks: persist a [`ResultTable`] as CSV, Parquet, or an SVG chart
//!
//! Every sink writes into an output directory under a caller-chosen stem
//! (`<dir>/<stem>.<extension>`), and the resulting file is reported back as
//! an [`ArtifactRecord`] for the sweep manifest.

mod chart;
mod csv;
mod parquet;

pub use chart::{render_svg, ChartSink, ChartStyle, Scale};
pub use csv::{render_csv, CsvSink};
pub use parquet::{load_parquet, write_parquet, ParquetSink};

use std::fs;
use std::path::Path;

use tracing::info;

use crate::manifest::ArtifactRecord;
use crate::table::ResultTable;
use crate::Result;

/// A destination format for result tables.
pub trait Sink {
    /// Artifact kind recorded in the manifest.
    fn kind(&self) -> &'static str;

    /// File extension without the dot.
    fn extension(&self) -> &'static str;

    /// Write `table` to `path`, replacing any existing file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written
    fn write(&self, table: &ResultTable, path: &Path) -> Result<()>;
}

/// Write `table` to `<dir>/<stem>.<ext>` with every sink in `sinks`,
/// creating `dir` if needed.
///
/// # Errors
///
/// Returns the first sink or filesystem error; files already written stay.
pub fn write_all(
    sinks: &[&dyn Sink],
    table: &ResultTable,
    dir: &Path,
    stem: &str,
) -> Result<Vec<ArtifactRecord>> {
    fs::create_dir_all(dir)?;
    let mut artifacts = Vec::with_capacity(sinks.len());
    for sink in sinks {
        let path = dir.join(format!("{stem}.{}", sink.extension()));
        sink.write(table, &path)?;
        let size = fs::metadata(&path)?.len();
        info!(kind = sink.kind(), path = %path.display(), size, "wrote artifact");
        artifacts.push(ArtifactRecord::new(sink.kind(), path, size));
    }
    Ok(artifacts)
}
