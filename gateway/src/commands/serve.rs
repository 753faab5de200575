//! Entrypoint for the gateway server
use std::sync::Arc;

use gateway_clap_blocks::{
    backend::BackendConfig, chunk::ChunkConfig, socket_addr::BindAddr,
};
use gateway_flight::ChunkEncoderBuilder;
use gateway_logging::cli::LoggingConfig;
use gateway_server::{
    Backends, GatewayService,
    backend::{DocumentAdapter, DocumentSource, EmbeddedAdapter, RelationalAdapter, SqlSource},
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// The default bind address for the Arrow Flight endpoint.
pub const DEFAULT_FLIGHT_BIND_ADDR: &str = "0.0.0.0:8888";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Cannot bind Flight endpoint to {addr}: {source}")]
    Bind {
        addr: BindAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Server(#[from] gateway_server::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, clap::Parser)]
pub struct Config {
    /// logging options
    #[clap(flatten)]
    pub(crate) logging_config: LoggingConfig,

    /// The address on which the Arrow Flight endpoint listens.
    #[clap(
        long = "flight-bind",
        env = "GATEWAY_FLIGHT_BIND_ADDR",
        default_value = DEFAULT_FLIGHT_BIND_ADDR,
        action
    )]
    pub flight_bind_address: BindAddr,

    #[clap(flatten)]
    pub backend_config: BackendConfig,

    #[clap(flatten)]
    pub chunk_config: ChunkConfig,
}

pub async fn command(config: Config) -> Result<()> {
    let backends = build_backends(&config.backend_config);
    let encoder = ChunkEncoderBuilder::new()
        .with_max_chunk_rows(config.chunk_config.max_chunk_rows)
        .with_max_chunk_bytes(config.chunk_config.max_chunk_bytes);
    let service = GatewayService::new(backends).with_encoder(encoder);

    let addr = config.flight_bind_address;
    let listener = TcpListener::bind(*addr)
        .await
        .map_err(|source| Error::Bind { addr, source })?;

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            wait_for_signal().await;
            shutdown.cancel();
        }
    });

    gateway_server::serve(listener, service, shutdown).await?;
    Ok(())
}

/// Wire each adapter to its store, or to an unavailable stand-in when the
/// binary was built without that store's driver.
fn build_backends(config: &BackendConfig) -> Backends {
    Backends::new(
        RelationalAdapter::new(relational_source(config), &config.postgres_table),
        DocumentAdapter::new(document_source(config)),
        EmbeddedAdapter::new(embedded_source(config), &config.duckdb_table),
    )
}

#[cfg(feature = "postgres")]
fn relational_source(config: &BackendConfig) -> Arc<dyn SqlSource> {
    info!(table = %config.postgres_table, "relational backend: postgres");
    Arc::new(gateway_server::backend::PostgresSource::new(
        &config.postgres_dsn,
    ))
}

#[cfg(not(feature = "postgres"))]
fn relational_source(_config: &BackendConfig) -> Arc<dyn SqlSource> {
    info!("relational backend: disabled");
    Arc::new(gateway_server::backend::memory::MemorySqlSource::unavailable(
        "built without the postgres driver",
    ))
}

#[cfg(feature = "mongodb")]
fn document_source(config: &BackendConfig) -> Arc<dyn DocumentSource> {
    info!(
        database = %config.mongo_database,
        collection = %config.mongo_collection,
        "document backend: mongodb"
    );
    Arc::new(gateway_server::backend::MongoSource::new(
        &config.mongo_uri,
        &config.mongo_database,
        &config.mongo_collection,
    ))
}

#[cfg(not(feature = "mongodb"))]
fn document_source(_config: &BackendConfig) -> Arc<dyn DocumentSource> {
    info!("document backend: disabled");
    Arc::new(
        gateway_server::backend::memory::MemoryDocumentSource::unavailable(
            "built without the mongodb driver",
        ),
    )
}

#[cfg(feature = "duckdb")]
fn embedded_source(config: &BackendConfig) -> Arc<dyn SqlSource> {
    info!(path = %config.duckdb_path.display(), "embedded backend: duckdb");
    Arc::new(gateway_server::backend::DuckDbSource::new(
        config.duckdb_path.clone(),
    ))
}

#[cfg(not(feature = "duckdb"))]
fn embedded_source(_config: &BackendConfig) -> Arc<dyn SqlSource> {
    info!("embedded backend: disabled");
    Arc::new(gateway_server::backend::memory::MemorySqlSource::unavailable(
        "built without the duckdb driver",
    ))
}

/// Wait for a `SIGTERM` or `SIGINT` to stop the process on UNIX systems
#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let (Ok(mut term), Ok(mut int)) = (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) else {
        tracing::warn!("cannot register signal handlers, falling back to ctrl+c");
        let _ = tokio::signal::ctrl_c().await;
        return;
    };

    tokio::select! {
        _ = term.recv() => info!("Received SIGTERM"),
        _ = int.recv() => info!("Received SIGINT"),
    }
}

/// Wait for a `ctrl+c` to stop the process on Windows systems
#[cfg(windows)]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Received SIGINT");
}
