use std::{fmt::Debug, sync::Arc};

use arrow::{
    array::{ArrayRef, Float64Array, Int64Array, StringArray, TimestampMicrosecondArray},
    datatypes::{DataType, TimeUnit},
    record_batch::RecordBatch,
};
use async_trait::async_trait;
use bson::{Bson, Document};
use gateway_table::{
    Table, canonical_schema,
    schema::{CANONICAL_COLUMNS, ID_COLUMN, NAME_COLUMN, TIMESTAMP_COLUMN, VALUE_COLUMN},
};

use super::{Adapter, BackendError, NativeValue, SourceError, native_table};
use crate::router::{BackendKind, Projection};

/// Name of the identity field every document store adds.
pub const DOCUMENT_ID_FIELD: &str = "_id";

/// A collection that can be read with a field-filtered find-all.
#[async_trait]
pub trait DocumentSource: Debug + Send + Sync + 'static {
    /// Return every document of the collection, reduced by `projection`
    /// (`1` includes a field, `0` excludes it). The cursor and connection
    /// live only for this call.
    async fn find(&self, projection: &Document) -> Result<Vec<Document>, SourceError>;
}

/// The projection for `fields`, always excluding the identity field.
pub fn document_projection(fields: &[&str]) -> Document {
    let mut projection = Document::new();
    projection.insert(DOCUMENT_ID_FIELD, 0);
    for field in fields {
        projection.insert(*field, 1);
    }
    projection
}

/// Reads a collection from a document store.
///
/// Documents carry no typed schema, so full-row results are built directly
/// against the canonical schema instead of being cast afterwards.
#[derive(Debug, Clone)]
pub struct DocumentAdapter {
    source: Arc<dyn DocumentSource>,
}

impl DocumentAdapter {
    pub fn new(source: Arc<dyn DocumentSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Adapter for DocumentAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Document
    }

    async fn fetch(&self, projection: Projection) -> Result<Table, BackendError> {
        let backend = self.kind();
        let fields: &[&str] = match projection {
            Projection::All => &CANONICAL_COLUMNS,
            Projection::Values => &[VALUE_COLUMN],
        };

        let documents = self
            .source
            .find(&document_projection(fields))
            .await
            .map_err(|source| BackendError::from_source(backend, source))?;

        match projection {
            Projection::All => canonical_table(&documents),
            Projection::Values => values_table(&documents),
        }
        .map_err(|source| BackendError::from_source(backend, source))
    }
}

/// Read `field` of `document`, treating a missing field like an explicit
/// null.
fn read<T>(
    index: usize,
    document: &Document,
    field: &str,
    expected: DataType,
    f: impl Fn(&Bson) -> Option<T>,
) -> Result<Option<T>, SourceError> {
    match document.get(field) {
        None | Some(Bson::Null) => Ok(None),
        Some(value) => f(value)
            .map(Some)
            .ok_or_else(|| SourceError::DocumentField {
                index,
                field: field.to_string(),
                expected,
                found: format!("{:?}", value.element_type()),
            }),
    }
}

fn canonical_table(documents: &[Document]) -> Result<Table, SourceError> {
    let ids: Int64Array = documents
        .iter()
        .enumerate()
        .map(|(i, d)| {
            read(i, d, ID_COLUMN, DataType::Int64, |b| match b {
                Bson::Int64(v) => Some(*v),
                Bson::Int32(v) => Some(i64::from(*v)),
                _ => None,
            })
        })
        .collect::<Result<_, _>>()?;

    let names: StringArray = documents
        .iter()
        .enumerate()
        .map(|(i, d)| {
            read(i, d, NAME_COLUMN, DataType::Utf8, |b| {
                b.as_str().map(str::to_string)
            })
        })
        .collect::<Result<_, _>>()?;

    let values: Float64Array = documents
        .iter()
        .enumerate()
        .map(|(i, d)| {
            read(i, d, VALUE_COLUMN, DataType::Float64, |b| match b {
                Bson::Double(v) => Some(*v),
                Bson::Int32(v) => Some(f64::from(*v)),
                Bson::Int64(v) => Some(*v as f64),
                _ => None,
            })
        })
        .collect::<Result<_, _>>()?;

    let timestamps: TimestampMicrosecondArray = documents
        .iter()
        .enumerate()
        .map(|(i, d)| {
            read(
                i,
                d,
                TIMESTAMP_COLUMN,
                DataType::Timestamp(TimeUnit::Microsecond, None),
                |b| match b {
                    Bson::DateTime(dt) => dt.timestamp_millis().checked_mul(1_000),
                    _ => None,
                },
            )
        })
        .collect::<Result<_, _>>()?;

    let columns: Vec<ArrayRef> = vec![
        Arc::new(ids),
        Arc::new(names),
        Arc::new(values),
        Arc::new(timestamps),
    ];
    let batch = RecordBatch::try_new(canonical_schema(), columns)?;
    Ok(Table::from_batch(batch))
}

fn native_value(value: Option<&Bson>) -> Result<NativeValue, SourceError> {
    Ok(match value {
        None | Some(Bson::Null) => NativeValue::Null,
        Some(Bson::Double(v)) => NativeValue::Float64(*v),
        Some(Bson::Int32(v)) => NativeValue::Int32(*v),
        Some(Bson::Int64(v)) => NativeValue::Int64(*v),
        Some(Bson::Boolean(v)) => NativeValue::Boolean(*v),
        Some(Bson::String(v)) => NativeValue::Utf8(v.clone()),
        Some(Bson::DateTime(dt)) => {
            let millis = dt.timestamp_millis();
            let micros = millis
                .checked_mul(1_000)
                .ok_or_else(|| SourceError::TimestampOutOfRange {
                    column: VALUE_COLUMN.to_string(),
                    value: millis,
                    unit: "ms",
                })?;
            NativeValue::TimestampMicros(micros)
        }
        Some(other) => NativeValue::Utf8(other.to_string()),
    })
}

/// Bring the numeric encodings of one field to a single type. A float
/// anywhere makes every number Float64; otherwise Int32 values are widened
/// to Int64 when both are present.
fn widen_numbers(values: Vec<NativeValue>) -> Vec<NativeValue> {
    let any_float = values.iter().any(|v| matches!(v, NativeValue::Float64(_)));
    let any_int64 = values.iter().any(|v| matches!(v, NativeValue::Int64(_)));

    values
        .into_iter()
        .map(|v| match v {
            NativeValue::Int32(i) if any_float => NativeValue::Float64(f64::from(i)),
            NativeValue::Int64(i) if any_float => NativeValue::Float64(i as f64),
            NativeValue::Int32(i) if any_int64 => NativeValue::Int64(i64::from(i)),
            v => v,
        })
        .collect()
}

fn values_table(documents: &[Document]) -> Result<Table, SourceError> {
    let values = documents
        .iter()
        .map(|d| native_value(d.get(VALUE_COLUMN)))
        .collect::<Result<Vec<_>, _>>()?;
    let rows = widen_numbers(values)
        .into_iter()
        .map(|value| vec![value])
        .collect();
    native_table(&[VALUE_COLUMN], rows)
}
