//! Sources backed by data held in memory.
//!
//! Used where a store is not configured or its driver is not compiled in,
//! and by tests that exercise the gateway without external services.

use async_trait::async_trait;
use bson::{Bson, Document};
use gateway_table::Table;

use super::{DocumentSource, SourceError, SqlQuery, SqlSource, document::DOCUMENT_ID_FIELD};

/// Answers queries from a fixed table, or fails every query as unreachable.
#[derive(Debug, Clone)]
pub struct MemorySqlSource {
    table: Result<Table, String>,
}

impl MemorySqlSource {
    /// A source holding `table` in whatever column types it was built with.
    pub fn new(table: Table) -> Self {
        Self { table: Ok(table) }
    }

    /// A source that cannot be connected to.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            table: Err(reason.into()),
        }
    }
}

#[async_trait]
impl SqlSource for MemorySqlSource {
    async fn query(&self, query: &SqlQuery) -> Result<Table, SourceError> {
        let table = self
            .table
            .as_ref()
            .map_err(|reason| SourceError::connect(reason.clone()))?;

        let indices = query
            .columns
            .iter()
            .map(|c| table.column_index(c))
            .collect::<Result<Vec<_>, _>>()
            .map_err(SourceError::query)?;

        let schema = table.schema().project(&indices)?;
        let batches = table
            .batches()
            .iter()
            .map(|b| b.project(&indices))
            .collect::<Result<Vec<_>, _>>()?;

        Table::try_new(schema.into(), batches).map_err(SourceError::query)
    }
}

/// Answers finds from a fixed set of documents.
#[derive(Debug, Clone)]
pub struct MemoryDocumentSource {
    documents: Result<Vec<Document>, String>,
}

impl MemoryDocumentSource {
    pub fn new(documents: Vec<Document>) -> Self {
        Self {
            documents: Ok(documents),
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            documents: Err(reason.into()),
        }
    }
}

#[async_trait]
impl DocumentSource for MemoryDocumentSource {
    async fn find(&self, projection: &Document) -> Result<Vec<Document>, SourceError> {
        let documents = self
            .documents
            .as_ref()
            .map_err(|reason| SourceError::connect(reason.clone()))?;

        Ok(documents
            .iter()
            .map(|d| apply_projection(d, projection))
            .collect())
    }
}

fn is_included(flag: &Bson) -> bool {
    !matches!(
        flag,
        Bson::Int32(0) | Bson::Int64(0) | Bson::Boolean(false)
    )
}

/// Keep the fields `projection` includes; if it includes none, keep all
/// fields it does not exclude. The identity field is kept unless excluded.
fn apply_projection(document: &Document, projection: &Document) -> Document {
    let any_included = projection
        .iter()
        .any(|(k, v)| k != DOCUMENT_ID_FIELD && is_included(v));

    document
        .iter()
        .filter(|(k, _)| match projection.get(k.as_str()) {
            Some(flag) => is_included(flag),
            None => !any_included || k.as_str() == DOCUMENT_ID_FIELD,
        })
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use super::*;
    use crate::{backend::SqlQuery, router::Projection, test_util};

    #[test]
    fn projection_semantics() {
        let d = doc! { "_id": 7, "id": 1, "name": "a", "value": 2.0 };

        assert_eq!(
            apply_projection(&d, &doc! { "_id": 0, "value": 1 }),
            doc! { "value": 2.0 }
        );
        assert_eq!(
            apply_projection(&d, &doc! { "value": 1 }),
            doc! { "_id": 7, "value": 2.0 }
        );
        assert_eq!(
            apply_projection(&d, &doc! { "_id": 0 }),
            doc! { "id": 1, "name": "a", "value": 2.0 }
        );
    }

    #[tokio::test]
    async fn sql_projection_selects_columns_in_order() {
        let source = MemorySqlSource::new(test_util::relational_table());
        let table = source
            .query(&SqlQuery::new("sensor_data", Projection::Values))
            .await
            .unwrap();
        assert_eq!(table.num_columns(), 1);
        assert_eq!(table.num_rows(), 3);

        let bad = SqlQuery {
            table: "sensor_data".to_string(),
            columns: vec!["missing"],
        };
        let err = source.query(&bad).await.unwrap_err();
        assert!(err.is_unavailable(), "{err}");
    }

    #[tokio::test]
    async fn unavailable_sources_fail_to_connect() {
        let err = MemorySqlSource::unavailable("refused")
            .query(&SqlQuery::new("t", Projection::All))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Connect(_)), "{err}");

        let err = MemoryDocumentSource::unavailable("refused")
            .find(&doc! {})
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Connect(_)), "{err}");
    }
}
