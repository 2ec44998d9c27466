//! Parquet sink (Arrow columnar format)
//!
//! The table is stored as a single record batch: the axis column first, one
//! `Float64` column per variant. Loading reverses
//! [`ResultTable::to_record_batch`].

use std::fs::File;
use std::path::Path;

use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;

use super::Sink;
use crate::table::ResultTable;
use crate::{Error, Result};

/// Writes result tables as Parquet files.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParquetSink;

impl Sink for ParquetSink {
    fn kind(&self) -> &'static str {
        "parquet"
    }

    fn extension(&self) -> &'static str {
        "parquet"
    }

    fn write(&self, table: &ResultTable, path: &Path) -> Result<()> {
        write_parquet(table, path)
    }
}

/// Write `table` to a Parquet file.
///
/// # Errors
///
/// Returns error if the file cannot be created or encoded
pub fn write_parquet<P: AsRef<Path>>(table: &ResultTable, path: P) -> Result<()> {
    let batch = table.to_record_batch()?;

    let file = File::create(path.as_ref())
        .map_err(|e| Error::StorageError(format!("Failed to create Parquet file: {e}")))?;

    let props = WriterProperties::builder().build();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))
        .map_err(|e| Error::StorageError(format!("Failed to create Parquet writer: {e}")))?;
    writer
        .write(&batch)
        .map_err(|e| Error::StorageError(format!("Failed to write record batch: {e}")))?;
    writer
        .close()
        .map_err(|e| Error::StorageError(format!("Failed to finish Parquet file: {e}")))?;
    Ok(())
}

/// Load a table written by [`write_parquet`].
///
/// # Errors
/// Returns error if file cannot be read or parsed
pub fn load_parquet<P: AsRef<Path>>(path: P) -> Result<ResultTable> {
    let file = File::open(path.as_ref())
        .map_err(|e| Error::StorageError(format!("Failed to open Parquet file: {e}")))?;

    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .map_err(|e| Error::StorageError(format!("Failed to parse Parquet file: {e}")))?;
    let schema = builder.schema().clone();

    let reader = builder
        .build()
        .map_err(|e| Error::StorageError(format!("Failed to create Parquet reader: {e}")))?;

    let mut batches = Vec::new();
    for batch in reader {
        let batch = batch
            .map_err(|e| Error::StorageError(format!("Failed to read record batch: {e}")))?;
        batches.push(batch);
    }

    let batch: RecordBatch = arrow::compute::concat_batches(&schema, &batches)?;
    ResultTable::from_record_batch(&batch)
}
