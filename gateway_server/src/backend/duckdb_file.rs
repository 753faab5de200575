use std::path::{Path, PathBuf};

use ::duckdb::{AccessMode, Config, Connection};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use gateway_table::Table;
use tracing::debug;

use super::{SourceError, SqlQuery, SqlSource};

/// A DuckDB database file, opened read-only for each query.
///
/// Results come out of the engine as Arrow record batches and are passed on
/// in the engine's own column types.
#[derive(Debug, Clone)]
pub struct DuckDbSource {
    path: PathBuf,
}

impl DuckDbSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SqlSource for DuckDbSource {
    async fn query(&self, query: &SqlQuery) -> Result<Table, SourceError> {
        let path = self.path.clone();
        let query = query.clone();
        // the engine runs on the calling thread
        tokio::task::spawn_blocking(move || query_blocking(&path, &query))
            .await
            .map_err(SourceError::query)?
    }
}

fn query_blocking(path: &Path, query: &SqlQuery) -> Result<Table, SourceError> {
    let config = Config::default()
        .access_mode(AccessMode::ReadOnly)
        .map_err(SourceError::connect)?;
    let conn = Connection::open_with_flags(path, config).map_err(SourceError::connect)?;

    let sql = query.sql();
    debug!(path = %path.display(), %sql, "querying duckdb");

    let mut stmt = conn.prepare(&sql).map_err(SourceError::query)?;
    let batches = stmt.query_arrow([]).map_err(SourceError::query)?;
    let schema = batches.get_schema();
    let batches: Vec<RecordBatch> = batches.collect();

    debug!(batches = batches.len(), "duckdb query done");
    Ok(Table::try_new(schema, batches)?)
}
