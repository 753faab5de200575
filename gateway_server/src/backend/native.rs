//! Assembly of driver rows into Arrow columns of the driver's own types.
//!
//! SQL drivers hand back values row by row. Each column's Arrow type is
//! taken from its first non-null value; the adapter casts to the canonical
//! schema afterwards where the route calls for it.

use std::sync::Arc;

use arrow::{
    array::{
        ArrayRef, BooleanArray, Float32Array, Float64Array, Int16Array, Int32Array, Int64Array,
        NullArray, StringArray, TimestampMicrosecondArray,
    },
    datatypes::{DataType, Field, Schema, TimeUnit},
    record_batch::RecordBatch,
};
use gateway_table::Table;

use super::SourceError;

/// One value as a driver reported it.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeValue {
    Null,
    Boolean(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Utf8(String),
    /// Microseconds since the epoch, without a time zone.
    TimestampMicros(i64),
}

impl NativeValue {
    fn data_type(&self) -> DataType {
        match self {
            Self::Null => DataType::Null,
            Self::Boolean(_) => DataType::Boolean,
            Self::Int16(_) => DataType::Int16,
            Self::Int32(_) => DataType::Int32,
            Self::Int64(_) => DataType::Int64,
            Self::Float32(_) => DataType::Float32,
            Self::Float64(_) => DataType::Float64,
            Self::Utf8(_) => DataType::Utf8,
            Self::TimestampMicros(_) => DataType::Timestamp(TimeUnit::Microsecond, None),
        }
    }
}

/// Collect the values of one column as `Option<T>`, rejecting any value
/// whose type differs from the column's.
fn collect<T>(
    column: &str,
    expected: &DataType,
    values: Vec<NativeValue>,
    f: impl Fn(NativeValue) -> Result<T, NativeValue>,
) -> Result<Vec<Option<T>>, SourceError> {
    values
        .into_iter()
        .map(|v| match v {
            NativeValue::Null => Ok(None),
            v => f(v).map(Some).map_err(|other| SourceError::MixedTypes {
                column: column.to_string(),
                expected: expected.clone(),
                found: other.data_type(),
            }),
        })
        .collect()
}

fn build_array(column: &str, values: Vec<NativeValue>) -> Result<ArrayRef, SourceError> {
    let data_type = values
        .iter()
        .find(|v| **v != NativeValue::Null)
        .map(NativeValue::data_type)
        .unwrap_or(DataType::Null);

    let array: ArrayRef = match &data_type {
        DataType::Null => Arc::new(NullArray::new(values.len())),
        DataType::Boolean => Arc::new(BooleanArray::from(collect(
            column,
            &data_type,
            values,
            |v| match v {
                NativeValue::Boolean(b) => Ok(b),
                other => Err(other),
            },
        )?)),
        DataType::Int16 => Arc::new(Int16Array::from(collect(
            column,
            &data_type,
            values,
            |v| match v {
                NativeValue::Int16(i) => Ok(i),
                other => Err(other),
            },
        )?)),
        DataType::Int32 => Arc::new(Int32Array::from(collect(
            column,
            &data_type,
            values,
            |v| match v {
                NativeValue::Int32(i) => Ok(i),
                other => Err(other),
            },
        )?)),
        DataType::Int64 => Arc::new(Int64Array::from(collect(
            column,
            &data_type,
            values,
            |v| match v {
                NativeValue::Int64(i) => Ok(i),
                other => Err(other),
            },
        )?)),
        DataType::Float32 => Arc::new(Float32Array::from(collect(
            column,
            &data_type,
            values,
            |v| match v {
                NativeValue::Float32(x) => Ok(x),
                other => Err(other),
            },
        )?)),
        DataType::Float64 => Arc::new(Float64Array::from(collect(
            column,
            &data_type,
            values,
            |v| match v {
                NativeValue::Float64(x) => Ok(x),
                other => Err(other),
            },
        )?)),
        DataType::Utf8 => Arc::new(StringArray::from(collect(
            column,
            &data_type,
            values,
            |v| match v {
                NativeValue::Utf8(s) => Ok(s),
                other => Err(other),
            },
        )?)),
        DataType::Timestamp(TimeUnit::Microsecond, None) => {
            Arc::new(TimestampMicrosecondArray::from(collect(
                column,
                &data_type,
                values,
                |v| match v {
                    NativeValue::TimestampMicros(t) => Ok(t),
                    other => Err(other),
                },
            )?))
        }
        other => {
            return Err(SourceError::UnsupportedType {
                column: column.to_string(),
                found: other.to_string(),
            });
        }
    };
    Ok(array)
}

/// Build a single-batch table from `rows`, each holding one value per entry
/// of `columns`.
pub fn native_table(columns: &[&str], rows: Vec<Vec<NativeValue>>) -> Result<Table, SourceError> {
    let mut by_column: Vec<Vec<NativeValue>> = columns
        .iter()
        .map(|_| Vec::with_capacity(rows.len()))
        .collect();

    for (row_idx, row) in rows.into_iter().enumerate() {
        if row.len() != columns.len() {
            return Err(SourceError::RowWidth {
                row: row_idx,
                expected: columns.len(),
                actual: row.len(),
            });
        }
        for (column, value) in by_column.iter_mut().zip(row) {
            column.push(value);
        }
    }

    let arrays = columns
        .iter()
        .zip(by_column)
        .map(|(name, values)| build_array(name, values))
        .collect::<Result<Vec<_>, _>>()?;

    let schema = Arc::new(Schema::new(
        columns
            .iter()
            .zip(&arrays)
            .map(|(name, array)| Field::new(*name, array.data_type().clone(), true))
            .collect::<Vec<_>>(),
    ));

    let batch = RecordBatch::try_new(schema, arrays)?;
    Ok(Table::from_batch(batch))
}

#[cfg(test)]
mod tests {
    use arrow::array::{Array, AsArray};

    use super::*;

    #[test]
    fn types_follow_first_non_null_value() {
        let table = native_table(
            &["id", "value"],
            vec![
                vec![NativeValue::Int32(1), NativeValue::Null],
                vec![NativeValue::Int32(2), NativeValue::Float32(1.5)],
            ],
        )
        .unwrap();

        let schema = table.schema();
        assert_eq!(schema.field(0).data_type(), &DataType::Int32);
        assert_eq!(schema.field(1).data_type(), &DataType::Float32);

        let batch = &table.batches()[0];
        assert!(batch.column(1).is_null(0));
        assert_eq!(
            batch
                .column(1)
                .as_primitive::<arrow::datatypes::Float32Type>()
                .value(1),
            1.5
        );
    }

    #[test]
    fn all_null_and_empty_columns() {
        let table = native_table(&["value"], vec![vec![NativeValue::Null]]).unwrap();
        assert_eq!(table.schema().field(0).data_type(), &DataType::Null);

        let table = native_table(&["id", "value"], vec![]).unwrap();
        assert_eq!(table.num_rows(), 0);
        assert_eq!(table.num_columns(), 2);
    }

    #[test]
    fn mixed_types_are_rejected() {
        let err = native_table(
            &["value"],
            vec![
                vec![NativeValue::Float64(1.0)],
                vec![NativeValue::Utf8("x".into())],
            ],
        )
        .unwrap_err();
        assert!(
            matches!(err, SourceError::MixedTypes { ref column, .. } if column == "value"),
            "{err}"
        );
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let err = native_table(&["id", "name"], vec![vec![NativeValue::Int64(1)]]).unwrap_err();
        assert!(matches!(err, SourceError::RowWidth { row: 0, .. }), "{err}");
    }
}
