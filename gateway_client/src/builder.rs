use std::time::Duration;

use arrow_flight::flight_service_client::FlightServiceClient;
use tonic::transport::Endpoint;

use crate::{Client, Result};

/// Default cap on a single decoded gRPC message: 100 MiB.
///
/// Text payload tickets carry a whole table in one row, which easily
/// exceeds tonic's 4 MiB default.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;

/// Configure and construct a new [`Client`].
///
/// ```no_run
/// # async fn run() -> Result<(), gateway_client::Error> {
/// use gateway_client::ClientBuilder;
/// use std::time::Duration;
///
/// let client = ClientBuilder::default()
///     .connect_timeout(Duration::from_secs(5))
///     .build("http://127.0.0.1:8888")
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ClientBuilder {
    max_message_size: usize,
    connect_timeout: Duration,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            connect_timeout: Duration::from_secs(1),
        }
    }
}

impl ClientBuilder {
    /// Connect to the gateway at `url`.
    pub async fn build(self, url: impl AsRef<str>) -> Result<Client> {
        let channel = Endpoint::from_shared(url.as_ref().to_string())?
            .connect_timeout(self.connect_timeout)
            .connect()
            .await?;

        let inner = FlightServiceClient::new(channel)
            .max_decoding_message_size(self.max_message_size);
        Ok(Client::new(inner))
    }

    /// Largest single message the client accepts from the server.
    pub fn max_message_size(self, max_message_size: usize) -> Self {
        Self {
            max_message_size,
            ..self
        }
    }

    /// How long to wait for the TCP connection to be accepted.
    pub fn connect_timeout(self, connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            ..self
        }
    }
}
