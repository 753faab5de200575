//! Row-oriented view of a canonical table.
//!
//! Only used as a baseline: materializing every row into a struct is what a
//! columnar consumer avoids, and the benchmark measures the difference.

use arrow::{
    array::AsArray,
    datatypes::{Float64Type, Int64Type, TimestampMicrosecondType},
};

use crate::{Result, Table, canonical_schema};

/// One sensor reading.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorRow {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub value: Option<f64>,
    pub timestamp_micros: Option<i64>,
}

impl Table {
    /// Materialize every row. The table must have the canonical schema.
    pub fn to_rows(&self) -> Result<Vec<SensorRow>> {
        self.ensure_schema(&canonical_schema())?;

        let mut rows = Vec::with_capacity(self.num_rows());
        for batch in self.batches() {
            let ids = batch.column(0).as_primitive::<Int64Type>();
            let names = batch.column(1).as_string::<i32>();
            let values = batch.column(2).as_primitive::<Float64Type>();
            let timestamps = batch.column(3).as_primitive::<TimestampMicrosecondType>();

            rows.extend(
                ids.iter()
                    .zip(names.iter())
                    .zip(values.iter())
                    .zip(timestamps.iter())
                    .map(|(((id, name), value), timestamp_micros)| SensorRow {
                        id,
                        name: name.map(str::to_string),
                        value,
                        timestamp_micros,
                    }),
            );
        }
        Ok(rows)
    }
}

/// Mean of `value` over materialized rows, skipping missing values.
pub fn mean_of_rows(rows: &[SensorRow]) -> Option<f64> {
    let (count, sum) = rows
        .iter()
        .filter_map(|r| r.value)
        .fold((0usize, 0.0), |(c, s), v| (c + 1, s + v));
    (count > 0).then(|| sum / count as f64)
}
