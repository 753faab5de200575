use std::time::{Duration, Instant};

use arrow::{datatypes::Schema, record_batch::RecordBatch};
use arrow_flight::{
    Criteria, FlightInfo, Ticket, flight_service_client::FlightServiceClient,
};
use futures::{StreamExt, TryStreamExt, stream::BoxStream};
use gateway_flight::{Chunk, decode_batches, decode_table};
use gateway_table::Table;
use tonic::transport::Channel;
use tracing::debug;

use crate::{Error, Result};

/// A table fetched for one ticket, with the time it took.
#[derive(Debug)]
pub struct Fetched {
    pub table: Table,
    /// From sending the request until the stream was fully consumed and
    /// decoded.
    pub elapsed: Duration,
}

/// One ticket the server advertises.
#[derive(Debug, Clone, PartialEq)]
pub struct TicketInfo {
    pub ticket: String,
    /// Present when the ticket always returns the same schema.
    pub schema: Option<Schema>,
}

/// Record batches of one response, in arrival order.
pub type BatchStream = BoxStream<'static, Result<RecordBatch>>;

/// An Arrow Flight client for the gateway. Build one with
/// [`ClientBuilder`](crate::ClientBuilder).
#[derive(Debug, Clone)]
pub struct Client {
    inner: FlightServiceClient<Channel>,
}

impl Client {
    pub(crate) fn new(inner: FlightServiceClient<Channel>) -> Self {
        Self { inner }
    }

    /// Fetch the whole table for `ticket`.
    ///
    /// Returns once the server ends the stream; an error status at any
    /// point fails the whole request.
    pub async fn request(&mut self, ticket: &str) -> Result<Fetched> {
        let start = Instant::now();
        let response = self
            .inner
            .do_get(Ticket::new(ticket.to_string()))
            .await?
            .into_inner();

        let table = decode_table(response).await?;
        let elapsed = start.elapsed();

        debug!(ticket, rows = table.num_rows(), ?elapsed, "fetched table");
        Ok(Fetched { table, elapsed })
    }

    /// Stream the record batches for `ticket` as they arrive.
    ///
    /// The stream yields at most one error and then ends.
    pub async fn stream(&mut self, ticket: &str) -> Result<BatchStream> {
        let response = self
            .inner
            .do_get(Ticket::new(ticket.to_string()))
            .await?
            .into_inner();

        Ok(decode_batches(response)
            .map_err(Error::from)
            .try_filter_map(|chunk| async move {
                Ok(match chunk {
                    Chunk::Data(batch) => Some(batch),
                    Chunk::Schema(_) => None,
                })
            })
            .boxed())
    }

    /// List the tickets the server knows.
    pub async fn list_tickets(&mut self) -> Result<Vec<TicketInfo>> {
        let infos: Vec<FlightInfo> = self
            .inner
            .list_flights(Criteria::default())
            .await?
            .into_inner()
            .try_collect()
            .await?;

        infos
            .into_iter()
            .filter_map(|info| {
                let ticket = info.flight_descriptor.as_ref()?.path.first()?.clone();
                Some((ticket, info))
            })
            .map(|(ticket, info)| {
                let schema = if info.schema.is_empty() {
                    None
                } else {
                    Some(
                        info.try_decode_schema()
                            .map_err(|e| Error::ProtocolViolation(e.to_string()))?,
                    )
                };
                Ok(TicketInfo { ticket, schema })
            })
            .collect()
    }
}
