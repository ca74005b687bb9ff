//! Arrow export
//!
//! Scalar columns map to native Arrow types where one exists
//! (`bool`, `int`, `float`, `datetime`, float series as their last value);
//! every other type is rendered as text.

use std::sync::Arc;

use arrow::array::{
    ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray, TimestampMillisecondArray,
    UInt64Array,
};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};

use super::{BucketTable, SeriesTable, Table};
use crate::attribute::{AttributeType, AttributeValue};
use crate::Result;

const UTC: &str = "UTC";

fn timestamp_type() -> DataType {
    DataType::Timestamp(TimeUnit::Millisecond, Some(UTC.into()))
}

#[allow(clippy::cast_precision_loss)]
fn float_cell(value: &AttributeValue) -> Option<f64> {
    match value {
        AttributeValue::Float(v) => Some(*v),
        AttributeValue::FloatSeries(agg) => Some(agg.last),
        AttributeValue::Int(v) => Some(*v as f64),
        _ => None,
    }
}

fn timestamps(values: impl Iterator<Item = Option<DateTime<Utc>>>) -> ArrayRef {
    let millis: Vec<Option<i64>> = values.map(|v| v.map(|t| t.timestamp_millis())).collect();
    Arc::new(TimestampMillisecondArray::from(millis).with_timezone(UTC))
}

fn scalar_column(attribute_type: AttributeType, cells: &[Option<&AttributeValue>]) -> (DataType, ArrayRef) {
    match attribute_type {
        AttributeType::Bool => {
            let values: Vec<Option<bool>> = cells
                .iter()
                .map(|c| match c {
                    Some(AttributeValue::Bool(b)) => Some(*b),
                    _ => None,
                })
                .collect();
            (DataType::Boolean, Arc::new(BooleanArray::from(values)))
        }
        AttributeType::Int => {
            let values: Vec<Option<i64>> = cells
                .iter()
                .map(|c| match c {
                    Some(AttributeValue::Int(v)) => Some(*v),
                    _ => None,
                })
                .collect();
            (DataType::Int64, Arc::new(Int64Array::from(values)))
        }
        AttributeType::Float | AttributeType::FloatSeries => {
            let values: Vec<Option<f64>> = cells.iter().map(|c| c.and_then(float_cell)).collect();
            (DataType::Float64, Arc::new(Float64Array::from(values)))
        }
        AttributeType::Datetime => {
            let array = timestamps(cells.iter().map(|c| match c {
                Some(AttributeValue::Datetime(t)) => Some(*t),
                _ => None,
            }));
            (timestamp_type(), array)
        }
        _ => {
            let values: Vec<Option<String>> = cells
                .iter()
                .map(|c| c.map(AttributeValue::display_text))
                .collect();
            (DataType::Utf8, Arc::new(StringArray::from(values)))
        }
    }
}

impl Table {
    /// Convert to an Arrow record batch.
    ///
    /// The first column holds entity labels and is named after the entity
    /// kind (`experiment` or `run`).
    ///
    /// # Errors
    ///
    /// Returns an Arrow error if the batch cannot be built.
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        let mut fields = vec![Field::new(self.kind().index_name(), DataType::Utf8, false)];
        let labels: Vec<&str> = self.rows().iter().map(|r| r.label.as_str()).collect();
        let mut columns: Vec<ArrayRef> = vec![Arc::new(StringArray::from(labels))];

        for (index, column) in self.columns().iter().enumerate() {
            let cells: Vec<Option<&AttributeValue>> = self
                .rows()
                .iter()
                .map(|r| r.cells.get(index).and_then(Option::as_ref))
                .collect();
            let (data_type, array) = scalar_column(column.definition.attribute_type(), &cells);
            fields.push(Field::new(&column.name, data_type, true));
            columns.push(array);
        }

        Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?)
    }
}

impl SeriesTable {
    /// Convert to an Arrow record batch in long format
    /// (`label, attribute, step, value, timestamp, is_preview, preview_completion`).
    ///
    /// Numeric tables carry `Float64` values, others `Utf8`.
    ///
    /// # Errors
    ///
    /// Returns an Arrow error if the batch cannot be built.
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        let rows = self.rows();
        let value_type = if self.is_numeric() {
            DataType::Float64
        } else {
            DataType::Utf8
        };
        let schema = Schema::new(vec![
            Field::new(self.kind().index_name(), DataType::Utf8, false),
            Field::new("attribute", DataType::Utf8, false),
            Field::new("step", DataType::Float64, false),
            Field::new("value", value_type, true),
            Field::new("timestamp", timestamp_type(), true),
            Field::new("is_preview", DataType::Boolean, false),
            Field::new("preview_completion", DataType::Float64, false),
        ]);

        let values: ArrayRef = if self.is_numeric() {
            Arc::new(Float64Array::from(
                rows.iter().map(|r| r.point.value.as_f64()).collect::<Vec<_>>(),
            ))
        } else {
            Arc::new(StringArray::from(
                rows.iter()
                    .map(|r| Some(r.point.value.display_text()))
                    .collect::<Vec<_>>(),
            ))
        };

        let columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from(rows.iter().map(|r| r.label.as_str()).collect::<Vec<_>>())),
            Arc::new(StringArray::from(rows.iter().map(|r| r.column.as_str()).collect::<Vec<_>>())),
            Arc::new(Float64Array::from(rows.iter().map(|r| r.point.step).collect::<Vec<_>>())),
            values,
            timestamps(rows.iter().map(|r| r.point.timestamp)),
            Arc::new(BooleanArray::from(rows.iter().map(|r| r.point.is_preview).collect::<Vec<_>>())),
            Arc::new(Float64Array::from(
                rows.iter().map(|r| r.point.preview_completion).collect::<Vec<_>>(),
            )),
        ];

        Ok(RecordBatch::try_new(Arc::new(schema), columns)?)
    }
}

impl BucketTable {
    /// Convert to an Arrow record batch
    /// (`label, attribute, bucket, from_step, to_step, step, value`).
    ///
    /// # Errors
    ///
    /// Returns an Arrow error if the batch cannot be built.
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        let rows = self.rows();
        let schema = Schema::new(vec![
            Field::new(self.kind().index_name(), DataType::Utf8, false),
            Field::new("attribute", DataType::Utf8, false),
            Field::new("bucket", DataType::UInt64, false),
            Field::new("from_step", DataType::Float64, false),
            Field::new("to_step", DataType::Float64, false),
            Field::new("step", DataType::Float64, false),
            Field::new("value", DataType::Float64, false),
        ]);

        let columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from(rows.iter().map(|r| r.label.as_str()).collect::<Vec<_>>())),
            Arc::new(StringArray::from(rows.iter().map(|r| r.column.as_str()).collect::<Vec<_>>())),
            Arc::new(UInt64Array::from(
                rows.iter().map(|r| r.bucket.index as u64).collect::<Vec<_>>(),
            )),
            Arc::new(Float64Array::from(rows.iter().map(|r| r.bucket.from_step).collect::<Vec<_>>())),
            Arc::new(Float64Array::from(rows.iter().map(|r| r.bucket.to_step).collect::<Vec<_>>())),
            Arc::new(Float64Array::from(rows.iter().map(|r| r.bucket.point.step).collect::<Vec<_>>())),
            Arc::new(Float64Array::from(rows.iter().map(|r| r.bucket.point.value).collect::<Vec<_>>())),
        ];

        Ok(RecordBatch::try_new(Arc::new(schema), columns)?)
    }
}
