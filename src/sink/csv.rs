//! CSV sink: header `<axis_name>,<label1>,<label2>,...`, one row per axis value

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use super::Sink;
use crate::table::ResultTable;
use crate::Result;

/// Writes result tables as comma-separated text.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvSink;

impl Sink for CsvSink {
    fn kind(&self) -> &'static str {
        "csv"
    }

    fn extension(&self) -> &'static str {
        "csv"
    }

    fn write(&self, table: &ResultTable, path: &Path) -> Result<()> {
        fs::write(path, render_csv(table))?;
        Ok(())
    }
}

fn field(text: &str) -> String {
    if text.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", text.replace('"', "\"\""))
    } else {
        text.to_string()
    }
}

/// Render `table` as CSV text. Values use Rust's shortest round-tripping
/// decimal form.
#[must_use]
pub fn render_csv(table: &ResultTable) -> String {
    let mut out = field(table.axis().name());
    for column in table.columns() {
        out.push(',');
        out.push_str(&field(column.label()));
    }
    out.push('\n');

    for index in 0..table.num_rows() {
        let Some((value, row)) = table.row(index) else {
            break;
        };
        out.push_str(&field(&value.to_string()));
        for v in row {
            // Writing to a String cannot fail.
            let _ = write!(out, ",{v}");
        }
        out.push('\n');
    }
    out
}
