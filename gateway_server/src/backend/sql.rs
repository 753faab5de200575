use std::{fmt::Debug, sync::Arc};

use async_trait::async_trait;
use gateway_table::{
    Table, canonical_schema,
    schema::{CANONICAL_COLUMNS, VALUE_COLUMN},
};

use super::{Adapter, BackendError, SourceError};
use crate::router::{BackendKind, Projection};

/// A whole-table read of some columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlQuery {
    pub table: String,
    pub columns: Vec<&'static str>,
}

impl SqlQuery {
    pub fn new(table: impl Into<String>, projection: Projection) -> Self {
        let columns = match projection {
            Projection::All => CANONICAL_COLUMNS.to_vec(),
            Projection::Values => vec![VALUE_COLUMN],
        };
        Self {
            table: table.into(),
            columns,
        }
    }

    /// The statement text, with every identifier quoted.
    pub fn sql(&self) -> String {
        let columns = self
            .columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let table = self
            .table
            .split('.')
            .map(quote_ident)
            .collect::<Vec<_>>()
            .join(".");
        format!("SELECT {columns} FROM {table}")
    }
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// A store that answers [`SqlQuery`]s with tables of its own column types.
#[async_trait]
pub trait SqlSource: Debug + Send + Sync + 'static {
    /// Run `query` on a connection opened for this call only. The result
    /// has one column per entry of `query.columns`, in that order.
    async fn query(&self, query: &SqlQuery) -> Result<Table, SourceError>;
}

async fn fetch_sql(
    backend: BackendKind,
    source: &dyn SqlSource,
    table: &str,
    projection: Projection,
) -> Result<Table, BackendError> {
    let query = SqlQuery::new(table, projection);
    let native = source
        .query(&query)
        .await
        .map_err(|source| BackendError::from_source(backend, source))?;

    match projection {
        Projection::All => native
            .cast_to(&canonical_schema())
            .map_err(|source| BackendError::SchemaMismatch { backend, source }),
        // passed through in the store's type
        Projection::Values => {
            if native.num_columns() != 1 {
                return Err(BackendError::SchemaMismatch {
                    backend,
                    source: gateway_table::Error::ColumnNotFound(VALUE_COLUMN.to_string()),
                });
            }
            native
                .column_index(VALUE_COLUMN)
                .map_err(|source| BackendError::SchemaMismatch { backend, source })?;
            Ok(native)
        }
    }
}

/// Reads a flat table from a relational database.
#[derive(Debug, Clone)]
pub struct RelationalAdapter {
    source: Arc<dyn SqlSource>,
    table: String,
}

impl RelationalAdapter {
    pub fn new(source: Arc<dyn SqlSource>, table: impl Into<String>) -> Self {
        Self {
            source,
            table: table.into(),
        }
    }
}

#[async_trait]
impl Adapter for RelationalAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Relational
    }

    async fn fetch(&self, projection: Projection) -> Result<Table, BackendError> {
        fetch_sql(self.kind(), self.source.as_ref(), &self.table, projection).await
    }
}

/// Reads a table from a local file of an embedded analytical engine.
#[derive(Debug, Clone)]
pub struct EmbeddedAdapter {
    source: Arc<dyn SqlSource>,
    table: String,
}

impl EmbeddedAdapter {
    pub fn new(source: Arc<dyn SqlSource>, table: impl Into<String>) -> Self {
        Self {
            source,
            table: table.into(),
        }
    }
}

#[async_trait]
impl Adapter for EmbeddedAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Embedded
    }

    async fn fetch(&self, projection: Projection) -> Result<Table, BackendError> {
        fetch_sql(self.kind(), self.source.as_ref(), &self.table, projection).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::{
        array::{Float64Array, Int64Array, StringArray},
        datatypes::{DataType, Field, Schema},
        record_batch::RecordBatch,
    };

    use super::*;
    use crate::backend::memory::MemorySqlSource;

    #[test]
    fn statements_quote_identifiers() {
        assert_eq!(
            SqlQuery::new("sensor_data", Projection::All).sql(),
            r#"SELECT "id", "name", "value", "timestamp" FROM "sensor_data""#
        );
        assert_eq!(
            SqlQuery::new("public.sensor_data", Projection::Values).sql(),
            r#"SELECT "value" FROM "public"."sensor_data""#
        );
        assert_eq!(
            SqlQuery::new(r#"odd"name"#, Projection::Values).sql(),
            r#"SELECT "value" FROM "odd""name""#
        );
    }

    #[tokio::test]
    async fn uncastable_column_is_schema_mismatch() {
        // timestamps stored as free text
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, true),
            Field::new("name", DataType::Utf8, true),
            Field::new("value", DataType::Float64, true),
            Field::new("timestamp", DataType::Utf8, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![1])),
                Arc::new(StringArray::from(vec!["Sensor_1"])),
                Arc::new(Float64Array::from(vec![20.0])),
                Arc::new(StringArray::from(vec!["yesterday"])),
            ],
        )
        .unwrap();
        let source = MemorySqlSource::new(Table::from_batch(batch));
        let adapter = EmbeddedAdapter::new(Arc::new(source), "sensor_data");

        let err = adapter.fetch(Projection::All).await.unwrap_err();
        assert!(err.is_schema_mismatch(), "{err}");
        assert_eq!(err.backend(), BackendKind::Embedded);

        // the values path never casts
        let values = adapter.fetch(Projection::Values).await.unwrap();
        assert_eq!(values.num_rows(), 1);
    }
}
