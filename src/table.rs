//! Result table: one row per axis value, one column per subject variant
//!
//! The table is the only artifact that outlives a sweep. Every column has
//! exactly one value per axis point, row `i` belonging to `axis.values()[i]`;
//! nothing is interpolated or gap-filled.

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;

use crate::axis::SweepAxis;
use crate::params::Scalar;
use crate::{Error, Result};

/// One variant's metric values in axis order.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    label: String,
    values: Vec<f64>,
}

impl Column {
    /// Variant label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Values in axis order.
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

/// Row-aligned aggregation of one metric across variants.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultTable {
    axis: SweepAxis,
    columns: Vec<Column>,
}

impl ResultTable {
    /// Empty table over `axis`.
    #[must_use]
    pub const fn new(axis: SweepAxis) -> Self {
        Self {
            axis,
            columns: Vec::new(),
        }
    }

    /// Append a column.
    ///
    /// # Errors
    ///
    /// - [`Error::RaggedColumn`] if `values` does not have one entry per axis value
    /// - [`Error::Config`] if `label` is already a column
    pub fn push_column(&mut self, label: impl Into<String>, values: Vec<f64>) -> Result<()> {
        let label = label.into();
        if values.len() != self.axis.len() {
            return Err(Error::RaggedColumn {
                label,
                expected: self.axis.len(),
                actual: values.len(),
            });
        }
        if self.column(&label).is_some() {
            return Err(Error::Config(format!("duplicate column `{label}`")));
        }
        self.columns.push(Column { label, values });
        Ok(())
    }

    /// The swept axis.
    #[must_use]
    pub const fn axis(&self) -> &SweepAxis {
        &self.axis
    }

    /// Columns in subject order.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Values of the column named `label`.
    #[must_use]
    pub fn column(&self, label: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|c| c.label == label)
            .map(|c| c.values.as_slice())
    }

    /// Number of rows (axis points).
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.axis.len()
    }

    /// Number of variant columns.
    #[must_use]
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Row `index`: the axis value and each column's value.
    #[must_use]
    pub fn row(&self, index: usize) -> Option<(&Scalar, Vec<f64>)> {
        let value = self.axis.values().get(index)?;
        Some((value, self.columns.iter().map(|c| c.values[index]).collect()))
    }

    /// Multiply every value by `factor` (unit conversion).
    #[must_use]
    pub fn scaled(mut self, factor: f64) -> Self {
        for column in &mut self.columns {
            for value in &mut column.values {
                *value *= factor;
            }
        }
        self
    }

    /// Convert to an Arrow batch: the axis column first, then one
    /// non-nullable `Float64` column per variant.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Arrow`] if the batch cannot be assembled.
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        let values = self.axis.values();
        let axis_array: ArrayRef = if values.iter().all(|v| matches!(v, Scalar::Int(_))) {
            Arc::new(Int64Array::from_iter_values(values.iter().map(|v| match v {
                Scalar::Int(i) => *i,
                _ => 0,
            })))
        } else if self.axis.is_numeric() {
            Arc::new(Float64Array::from_iter_values(
                values.iter().map(|v| v.as_f64().unwrap_or(f64::NAN)),
            ))
        } else if values.iter().all(|v| matches!(v, Scalar::Bool(_))) {
            Arc::new(BooleanArray::from(
                values
                    .iter()
                    .map(|v| matches!(v, Scalar::Bool(true)))
                    .collect::<Vec<bool>>(),
            ))
        } else {
            Arc::new(StringArray::from_iter_values(
                values.iter().map(ToString::to_string),
            ))
        };

        let mut fields = vec![Field::new(
            self.axis.name(),
            axis_array.data_type().clone(),
            false,
        )];
        let mut arrays = vec![axis_array];
        for column in &self.columns {
            fields.push(Field::new(&column.label, DataType::Float64, false));
            arrays.push(Arc::new(Float64Array::from(column.values.clone())));
        }

        Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)?)
    }

    /// Rebuild a table from a batch written by [`to_record_batch`](Self::to_record_batch).
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageError`] if the batch has no columns, an
    /// unsupported axis type, or a non-`Float64` value column.
    pub fn from_record_batch(batch: &RecordBatch) -> Result<Self> {
        let schema = batch.schema();
        if batch.num_columns() == 0 {
            return Err(Error::StorageError("result batch has no columns".into()));
        }

        let axis_column = batch.column(0);
        let axis_values: Vec<Scalar> = match axis_column.data_type() {
            DataType::Int64 => downcast::<Int64Array>(axis_column)?
                .values()
                .iter()
                .map(|v| Scalar::Int(*v))
                .collect(),
            DataType::Float64 => downcast::<Float64Array>(axis_column)?
                .values()
                .iter()
                .map(|v| Scalar::Float(*v))
                .collect(),
            DataType::Boolean => {
                let array = downcast::<BooleanArray>(axis_column)?;
                (0..array.len()).map(|i| Scalar::Bool(array.value(i))).collect()
            }
            DataType::Utf8 => {
                let array = downcast::<StringArray>(axis_column)?;
                (0..array.len())
                    .map(|i| Scalar::Text(array.value(i).to_string()))
                    .collect()
            }
            other => {
                return Err(Error::StorageError(format!(
                    "unsupported axis column type {other}"
                )))
            }
        };

        let axis = SweepAxis::new(schema.field(0).name().clone(), axis_values)?;
        let mut table = Self::new(axis);
        for (field, array) in schema.fields().iter().zip(batch.columns()).skip(1) {
            let values = downcast::<Float64Array>(array)?.values().to_vec();
            table.push_column(field.name().clone(), values)?;
        }
        Ok(table)
    }
}

fn downcast<T: 'static>(array: &ArrayRef) -> Result<&T> {
    array.as_any().downcast_ref::<T>().ok_or_else(|| {
        Error::StorageError(format!(
            "unexpected column type {}",
            array.data_type()
        ))
    })
}
