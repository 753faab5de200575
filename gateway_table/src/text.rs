//! Text-serialized payloads.
//!
//! The text path renders a whole table as a JSON array of objects and ships
//! that string as the only value of a one-row, one-column table. It exists
//! as a worst-case baseline against columnar transfer.

use std::sync::{Arc, LazyLock};

use arrow::{
    array::{Array, AsArray, StringArray},
    datatypes::{DataType, Field, Schema, SchemaRef},
    record_batch::RecordBatch,
};
use serde::{Deserialize, Serialize};

use crate::{Error, Result, Table};

/// Name of the single column of a text payload table.
pub const TEXT_COLUMN: &str = "json_data";

static TEXT_SCHEMA: LazyLock<SchemaRef> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![Field::new(
        TEXT_COLUMN,
        DataType::Utf8,
        true,
    )]))
});

pub fn text_schema() -> SchemaRef {
    Arc::clone(&TEXT_SCHEMA)
}

/// A row as it appears in the JSON text. Timestamps are rendered as ISO 8601
/// strings and absent values are omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRecord {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl Table {
    /// Render every row as a JSON object inside one JSON array.
    pub fn to_json_text(&self) -> Result<String> {
        let mut writer = arrow_json::ArrayWriter::new(Vec::new());
        for batch in self.batches() {
            writer.write(batch)?;
        }
        writer.finish()?;
        Ok(String::from_utf8(writer.into_inner())?)
    }

    /// Wrap the JSON rendering of this table as a single-row, single-column
    /// table.
    pub fn to_text_payload(&self) -> Result<Self> {
        let text = self.to_json_text()?;
        let batch = RecordBatch::try_new(
            text_schema(),
            vec![Arc::new(StringArray::from(vec![text]))],
        )?;
        Ok(Self::from_batch(batch))
    }

    /// Borrow the JSON text held by a payload built with
    /// [`Self::to_text_payload`].
    pub fn text_payload(&self) -> Result<&str> {
        self.ensure_schema(&TEXT_SCHEMA)
            .map_err(|_| Error::NotATextPayload)?;
        if self.num_rows() != 1 {
            return Err(Error::NotATextPayload);
        }
        let batch = self
            .batches()
            .iter()
            .find(|b| b.num_rows() == 1)
            .ok_or(Error::NotATextPayload)?;
        let column = batch.column(0).as_string::<i32>();
        if column.is_null(0) {
            return Err(Error::NotATextPayload);
        }
        Ok(column.value(0))
    }
}

/// Fully deserialize JSON text into generic objects, one per row.
pub fn parse_rows(text: &str) -> Result<Vec<serde_json::Map<String, serde_json::Value>>> {
    Ok(serde_json::from_str(text)?)
}

/// Deserialize JSON text of canonical rows.
pub fn parse_records(text: &str) -> Result<Vec<TextRecord>> {
    Ok(serde_json::from_str(text)?)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::schema::{NAME_COLUMN, VALUE_COLUMN};
    use crate::test_util::sensor_table;

    #[test]
    fn text_round_trip_keeps_rows() {
        let a = sensor_table(&[(1, "Sensor_1", 20.0), (2, "Sensor_2", 40.0)]);
        let b = sensor_table(&[(3, "Sensor_3", 60.5)]);
        let table = Table::concat(&[a, b]).unwrap();

        let payload = table.to_text_payload().unwrap();
        assert_eq!(payload.num_rows(), 1);
        assert_eq!(payload.num_columns(), 1);
        assert_eq!(payload.schema().field(0).name(), TEXT_COLUMN);

        let records = parse_records(payload.text_payload().unwrap()).unwrap();
        assert_eq!(records.len(), table.num_rows());

        let parsed: BTreeSet<(String, u64)> = records
            .iter()
            .map(|r| (r.name.clone().unwrap(), r.value.unwrap().to_bits()))
            .collect();
        let expected: BTreeSet<(String, u64)> = table
            .to_rows()
            .unwrap()
            .into_iter()
            .map(|r| (r.name.unwrap(), r.value.unwrap().to_bits()))
            .collect();
        assert_eq!(parsed, expected);

        assert_eq!(
            records[0].timestamp.as_deref(),
            Some("2024-01-01T00:00:00")
        );
    }

    #[test]
    fn generic_rows_have_all_columns() {
        let table = sensor_table(&[(7, "Sensor_7", 1.5)]);
        let rows = parse_rows(&table.to_json_text().unwrap()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][NAME_COLUMN], "Sensor_7");
        assert_eq!(rows[0][VALUE_COLUMN], 1.5);
    }

    #[test]
    fn empty_table_renders_empty_array() {
        let table = Table::empty(crate::canonical_schema());
        let records = parse_records(&table.to_json_text().unwrap()).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn non_payload_is_rejected() {
        let table = sensor_table(&[(1, "a", 1.0)]);
        assert!(matches!(
            table.text_payload().unwrap_err(),
            Error::NotATextPayload
        ));
    }
}
