//! Sensor gateway server.
//!
//! Routes Arrow Flight `DoGet` tickets to one of three stores, normalizes
//! what they return into [`Table`]s and streams those back in chunks.
//!
//! [`Table`]: gateway_table::Table

#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(
    missing_debug_implementations,
    clippy::explicit_iter_loop,
    clippy::use_self,
    clippy::clone_on_ref_ptr,
    clippy::future_not_send
)]

use snafu::{ResultExt, Snafu};
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub mod backend;
pub mod router;
mod service;
pub mod test_util;

pub use backend::{Backends, BackendError, SourceError};
pub use router::{ROUTES, RouteSpec, UnknownTicket};
pub use service::{GatewayService, RequestState};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("gRPC transport error: {}", source))]
    Transport { source: tonic::transport::Error },

    #[snafu(display("Unable to read listener address: {}", source))]
    LocalAddr { source: std::io::Error },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Serve `service` on `listener` until `shutdown` is cancelled.
///
/// Requests in flight when `shutdown` fires are allowed to finish.
pub async fn serve(
    listener: TcpListener,
    service: GatewayService,
    shutdown: CancellationToken,
) -> Result<()> {
    let addr = listener.local_addr().context(LocalAddrSnafu)?;
    info!(%addr, "gRPC server listening");

    let stream = TcpListenerStream::new(listener);
    tonic::transport::Server::builder()
        .add_service(service.into_server())
        .serve_with_incoming_shutdown(stream, shutdown.cancelled())
        .await
        .context(TransportSnafu)?;

    info!("gRPC server shut down");
    Ok(())
}
