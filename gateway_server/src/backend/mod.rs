//! Backend adapters.
//!
//! An [`Adapter`] turns a [`Projection`] into a [`Table`] read from one
//! store. The three adapters share that interface; which one serves a
//! request is decided by the route, see [`Backends::fetch`].
//!
//! Adapters do not hold connections. Every fetch acquires its own
//! connection through a source ([`SqlSource`] or [`DocumentSource`]) and
//! releases it before returning, on success and on failure.

use std::fmt::Debug;

use arrow::{datatypes::DataType, error::ArrowError};
use async_trait::async_trait;
use gateway_table::Table;

use crate::router::{BackendKind, OutputMode, Projection, RouteSpec};

mod document;
#[cfg(feature = "duckdb")]
mod duckdb_file;
pub mod memory;
mod native;
#[cfg(feature = "mongodb")]
mod mongo;
#[cfg(feature = "postgres")]
mod postgres;
mod sql;

pub use document::{DocumentAdapter, DocumentSource, document_projection};
#[cfg(feature = "duckdb")]
pub use duckdb_file::DuckDbSource;
#[cfg(feature = "mongodb")]
pub use mongo::MongoSource;
pub use native::{NativeValue, native_table};
#[cfg(feature = "postgres")]
pub use postgres::PostgresSource;
pub use sql::{EmbeddedAdapter, RelationalAdapter, SqlQuery, SqlSource};

pub type DynError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised by a source while talking to its store.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("cannot connect: {0}")]
    Connect(#[source] DynError),

    #[error("query failed: {0}")]
    Query(#[source] DynError),

    #[error("column '{column}' mixes {expected} and {found} values")]
    MixedTypes {
        column: String,
        expected: DataType,
        found: DataType,
    },

    #[error("column '{column}' has unsupported type {found}")]
    UnsupportedType { column: String, found: String },

    #[error("column '{column}' holds a timestamp out of range: {value} {unit}")]
    TimestampOutOfRange {
        column: String,
        value: i64,
        unit: &'static str,
    },

    #[error("row {row} has {actual} values, expected {expected}")]
    RowWidth {
        row: usize,
        expected: usize,
        actual: usize,
    },

    #[error("field '{field}' of document {index} cannot be read as {expected}: found {found}")]
    DocumentField {
        index: usize,
        field: String,
        expected: DataType,
        found: String,
    },

    #[error("arrow error: {0}")]
    Arrow(#[from] ArrowError),

    #[error("inconsistent result: {0}")]
    Table(#[from] gateway_table::Error),
}

impl SourceError {
    pub fn connect(e: impl Into<DynError>) -> Self {
        Self::Connect(e.into())
    }

    pub fn query(e: impl Into<DynError>) -> Self {
        Self::Query(e.into())
    }

    /// True if the store could not be reached or refused the query, as
    /// opposed to returning data of the wrong shape.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Connect(_) | Self::Query(_))
    }
}

/// Errors of a single fetch, tagged with the backend that raised them.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("{backend} backend unavailable: {source}")]
    Unavailable {
        backend: BackendKind,
        #[source]
        source: SourceError,
    },

    #[error("{backend} returned data that cannot be decoded: {source}")]
    Decode {
        backend: BackendKind,
        #[source]
        source: SourceError,
    },

    #[error("{backend} result does not fit the canonical schema: {source}")]
    SchemaMismatch {
        backend: BackendKind,
        #[source]
        source: gateway_table::Error,
    },

    #[error("cannot serialize {backend} result as text: {source}")]
    Serialize {
        backend: BackendKind,
        #[source]
        source: gateway_table::Error,
    },
}

impl BackendError {
    pub fn from_source(backend: BackendKind, source: SourceError) -> Self {
        if source.is_unavailable() {
            Self::Unavailable { backend, source }
        } else {
            Self::Decode { backend, source }
        }
    }

    pub fn backend(&self) -> BackendKind {
        match self {
            Self::Unavailable { backend, .. }
            | Self::Decode { backend, .. }
            | Self::SchemaMismatch { backend, .. }
            | Self::Serialize { backend, .. } => *backend,
        }
    }

    /// True if the data could not be coerced into the expected shape.
    pub fn is_schema_mismatch(&self) -> bool {
        matches!(self, Self::Decode { .. } | Self::SchemaMismatch { .. })
    }
}

/// One store, behind the fetch interface the router dispatches to.
#[async_trait]
pub trait Adapter: Debug + Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Read the whole dataset.
    ///
    /// With [`Projection::All`] the result has exactly the canonical schema.
    /// With [`Projection::Values`] it holds the single `value` column in the
    /// store's native type.
    async fn fetch(&self, projection: Projection) -> Result<Table, BackendError>;

    /// Read the whole dataset and wrap its JSON rendering as the only value
    /// of a one-row, one-column table.
    async fn fetch_as_text_blob(&self) -> Result<Table, BackendError> {
        let table = self.fetch(Projection::All).await?;
        table
            .to_text_payload()
            .map_err(|source| BackendError::Serialize {
                backend: self.kind(),
                source,
            })
    }
}

/// The three adapters the gateway serves from.
#[derive(Debug, Clone)]
pub struct Backends {
    relational: RelationalAdapter,
    document: DocumentAdapter,
    embedded: EmbeddedAdapter,
}

impl Backends {
    pub fn new(
        relational: RelationalAdapter,
        document: DocumentAdapter,
        embedded: EmbeddedAdapter,
    ) -> Self {
        Self {
            relational,
            document,
            embedded,
        }
    }

    /// Produce the table `route` asks for.
    pub async fn fetch(&self, route: RouteSpec) -> Result<Table, BackendError> {
        match route.backend {
            BackendKind::Relational => serve(&self.relational, route).await,
            BackendKind::Document => serve(&self.document, route).await,
            BackendKind::Embedded => serve(&self.embedded, route).await,
        }
    }
}

async fn serve<A: Adapter>(adapter: &A, route: RouteSpec) -> Result<Table, BackendError> {
    match route.output {
        OutputMode::Columnar => adapter.fetch(route.projection).await,
        OutputMode::Text => adapter.fetch_as_text_blob().await,
    }
}

#[cfg(test)]
mod tests {
    use gateway_table::{
        canonical_schema,
        schema::VALUE_COLUMN,
        text::{TEXT_COLUMN, parse_records},
    };

    use super::*;
    use crate::{
        router::resolve,
        test_util::{sensor_backends, unavailable_backends},
    };

    fn backends() -> Backends {
        sensor_backends()
    }

    #[tokio::test]
    async fn full_fetch_is_canonical_for_every_backend() {
        let backends = backends();
        for backend in BackendKind::ALL {
            let table = backends.fetch(resolve(backend.name()).unwrap()).await.unwrap();
            assert_eq!(table.schema(), canonical_schema(), "{backend}");
            assert_eq!(table.num_rows(), 3, "{backend}");
            assert_eq!(table.mean(VALUE_COLUMN).unwrap(), Some(40.0), "{backend}");
        }
    }

    #[tokio::test]
    async fn values_fetch_keeps_native_type() {
        let backends = backends();
        let expected = [
            (BackendKind::Relational, DataType::Float32),
            (BackendKind::Document, DataType::Float64),
            (BackendKind::Embedded, DataType::Float64),
        ];
        for (backend, data_type) in expected {
            let ticket = format!("{}_values", backend.name());
            let table = backends.fetch(resolve(&ticket).unwrap()).await.unwrap();
            assert_eq!(table.num_columns(), 1, "{ticket}");
            assert_eq!(table.schema().field(0).name(), VALUE_COLUMN);
            assert_eq!(table.schema().field(0).data_type(), &data_type, "{ticket}");
            assert_eq!(table.mean(VALUE_COLUMN).unwrap(), Some(40.0), "{ticket}");
        }
    }

    #[tokio::test]
    async fn text_fetch_wraps_all_rows() {
        let backends = backends();
        for backend in BackendKind::ALL {
            let ticket = format!("{}_json", backend.name());
            let table = backends.fetch(resolve(&ticket).unwrap()).await.unwrap();
            assert_eq!(table.schema().field(0).name(), TEXT_COLUMN);
            let records = parse_records(table.text_payload().unwrap()).unwrap();
            assert_eq!(records.len(), 3, "{ticket}");
        }
    }

    #[tokio::test]
    async fn unavailable_source_is_reported() {
        let backends = unavailable_backends();
        for (ticket, _) in crate::router::ROUTES {
            let err = backends.fetch(resolve(ticket).unwrap()).await.unwrap_err();
            assert!(matches!(err, BackendError::Unavailable { .. }), "{ticket}: {err}");
            assert!(!err.is_schema_mismatch());
        }
    }
}
