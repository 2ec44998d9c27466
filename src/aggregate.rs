//! Aggregator: per-variant record sequences → [`ResultTable`]

use crate::axis::SweepAxis;
use crate::decode::parse_metric;
use crate::engine::SubjectRecords;
use crate::table::ResultTable;
use crate::{Error, Result};

/// Extract `metric_key` from every record, one column per subject named by
/// its variant label, in subject order.
///
/// # Errors
///
/// - [`Error::MissingMetric`] naming the subject and axis index of the first
///   record without `metric_key`; no row is ever dropped
/// - [`Error::InvalidMetric`] if a value is not a finite number
/// - [`Error::RaggedColumn`] if a subject has a different number of records
///   than the axis has values
pub fn aggregate(
    axis: &SweepAxis,
    per_subject: &[SubjectRecords],
    metric_key: &str,
) -> Result<ResultTable> {
    let mut table = ResultTable::new(axis.clone());

    for series in per_subject {
        let label = series.subject.label();
        if series.records.len() != axis.len() {
            return Err(Error::RaggedColumn {
                label: label.to_string(),
                expected: axis.len(),
                actual: series.records.len(),
            });
        }

        let values = series
            .records
            .iter()
            .zip(axis.values())
            .enumerate()
            .map(|(index, (record, value))| {
                let raw = record.get(metric_key).ok_or_else(|| Error::MissingMetric {
                    subject: label.to_string(),
                    metric: metric_key.to_string(),
                    index,
                    axis: axis.name().to_string(),
                    value: value.to_string(),
                })?;
                parse_metric(metric_key, raw)
            })
            .collect::<Result<Vec<f64>>>()?;

        table.push_column(label, values)?;
    }

    Ok(table)
}
