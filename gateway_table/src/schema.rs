//! The canonical sensor schema.
//!
//! Every full-row result leaving a backend adapter must match this schema
//! exactly: same column names, same order, same logical types.

use std::sync::{Arc, LazyLock};

use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};

pub const ID_COLUMN: &str = "id";
pub const NAME_COLUMN: &str = "name";
pub const VALUE_COLUMN: &str = "value";
pub const TIMESTAMP_COLUMN: &str = "timestamp";

/// Canonical column names, in schema order.
pub const CANONICAL_COLUMNS: [&str; 4] = [ID_COLUMN, NAME_COLUMN, VALUE_COLUMN, TIMESTAMP_COLUMN];

static CANONICAL_SCHEMA: LazyLock<SchemaRef> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        Field::new(ID_COLUMN, DataType::Int64, true),
        Field::new(NAME_COLUMN, DataType::Utf8, true),
        Field::new(VALUE_COLUMN, DataType::Float64, true),
        Field::new(
            TIMESTAMP_COLUMN,
            DataType::Timestamp(TimeUnit::Microsecond, None),
            true,
        ),
    ]))
});

/// Returns the canonical schema: `id: int64, name: utf8, value: float64,
/// timestamp: timestamp(us)`.
pub fn canonical_schema() -> SchemaRef {
    Arc::clone(&CANONICAL_SCHEMA)
}

/// Two schemas are compatible iff they have identical `(name, type)`
/// sequences. Nullability and metadata are not compared.
pub fn is_compatible(a: &Schema, b: &Schema) -> bool {
    a.fields().len() == b.fields().len()
        && a
            .fields()
            .iter()
            .zip(b.fields().iter())
            .all(|(x, y)| x.name() == y.name() && x.data_type() == y.data_type())
}

/// Short `name: type` rendering used in error messages.
pub fn describe(schema: &Schema) -> String {
    schema
        .fields()
        .iter()
        .map(|f| format!("{}: {}", f.name(), f.data_type()))
        .collect::<Vec<_>>()
        .join(", ")
}
