//! In-memory stand-ins for the three stores, seeded with the same sensor
//! readings in each store's own representation.
use std::sync::Arc;

use arrow::{
    array::{Float32Array, Float64Array, Int32Array, StringArray, TimestampMicrosecondArray},
    datatypes::{DataType, Field, Schema, TimeUnit},
    record_batch::RecordBatch,
};
use bson::{Document, doc, oid::ObjectId};
use gateway_table::{
    Table,
    schema::{ID_COLUMN, NAME_COLUMN, TIMESTAMP_COLUMN, VALUE_COLUMN},
    test_util::FIXTURE_TIMESTAMP_MICROS,
};

use crate::backend::{
    Backends, DocumentAdapter, EmbeddedAdapter, RelationalAdapter,
    memory::{MemoryDocumentSource, MemorySqlSource},
};

/// The readings every fixture store holds. Their mean value is 40.0.
pub const SENSOR_ROWS: [(i64, &str, f64); 3] = [
    (1, "Sensor_1", 20.0),
    (2, "Sensor_2", 40.0),
    (3, "Sensor_3", 60.0),
];

/// Table name the fixture SQL sources are registered under.
pub const SENSOR_TABLE: &str = "sensor_data";

fn timestamp_field() -> Field {
    Field::new(
        TIMESTAMP_COLUMN,
        DataType::Timestamp(TimeUnit::Microsecond, None),
        true,
    )
}

/// [`SENSOR_ROWS`] as a relational driver reports them: 32-bit ids and
/// 32-bit floats.
pub fn relational_table() -> Table {
    let schema = Arc::new(Schema::new(vec![
        Field::new(ID_COLUMN, DataType::Int32, false),
        Field::new(NAME_COLUMN, DataType::Utf8, true),
        Field::new(VALUE_COLUMN, DataType::Float32, true),
        timestamp_field(),
    ]));
    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(Int32Array::from_iter_values(
                SENSOR_ROWS.iter().map(|r| r.0 as i32),
            )),
            Arc::new(StringArray::from_iter_values(SENSOR_ROWS.iter().map(|r| r.1))),
            Arc::new(Float32Array::from_iter_values(
                SENSOR_ROWS.iter().map(|r| r.2 as f32),
            )),
            Arc::new(TimestampMicrosecondArray::from_iter_values(
                SENSOR_ROWS.iter().map(|_| FIXTURE_TIMESTAMP_MICROS),
            )),
        ],
    )
    .expect("fixture batch is well formed");
    Table::from_batch(batch)
}

/// [`SENSOR_ROWS`] as an embedded engine reports them: 32-bit ids and
/// doubles.
pub fn embedded_table() -> Table {
    let schema = Arc::new(Schema::new(vec![
        Field::new(ID_COLUMN, DataType::Int32, true),
        Field::new(NAME_COLUMN, DataType::Utf8, true),
        Field::new(VALUE_COLUMN, DataType::Float64, true),
        timestamp_field(),
    ]));
    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(Int32Array::from_iter_values(
                SENSOR_ROWS.iter().map(|r| r.0 as i32),
            )),
            Arc::new(StringArray::from_iter_values(SENSOR_ROWS.iter().map(|r| r.1))),
            Arc::new(Float64Array::from_iter_values(SENSOR_ROWS.iter().map(|r| r.2))),
            Arc::new(TimestampMicrosecondArray::from_iter_values(
                SENSOR_ROWS.iter().map(|_| FIXTURE_TIMESTAMP_MICROS),
            )),
        ],
    )
    .expect("fixture batch is well formed");
    Table::from_batch(batch)
}

/// [`SENSOR_ROWS`] as stored documents, identity field included.
pub fn documents() -> Vec<Document> {
    SENSOR_ROWS
        .iter()
        .map(|(id, name, value)| {
            doc! {
                "_id": ObjectId::new(),
                "id": *id,
                "name": *name,
                "value": *value,
                "timestamp": bson::DateTime::from_millis(FIXTURE_TIMESTAMP_MICROS / 1_000),
            }
        })
        .collect()
}

/// All three adapters over the in-memory fixture stores.
pub fn sensor_backends() -> Backends {
    Backends::new(
        RelationalAdapter::new(
            Arc::new(MemorySqlSource::new(relational_table())),
            SENSOR_TABLE,
        ),
        DocumentAdapter::new(Arc::new(MemoryDocumentSource::new(documents()))),
        EmbeddedAdapter::new(
            Arc::new(MemorySqlSource::new(embedded_table())),
            SENSOR_TABLE,
        ),
    )
}

/// Adapters whose stores all refuse connections.
pub fn unavailable_backends() -> Backends {
    Backends::new(
        RelationalAdapter::new(
            Arc::new(MemorySqlSource::unavailable("connection refused")),
            SENSOR_TABLE,
        ),
        DocumentAdapter::new(Arc::new(MemoryDocumentSource::unavailable(
            "connection refused",
        ))),
        EmbeddedAdapter::new(
            Arc::new(MemorySqlSource::unavailable("database file missing")),
            SENSOR_TABLE,
        ),
    )
}
