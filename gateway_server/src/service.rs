//! The Arrow Flight service.
//!
//! `DoGet` is the only data path. Each call moves through
//! [`RequestState`]s: the ticket is received, routed, fetched from its
//! backend, and the resulting table is streamed back in chunks.
//!
//! ```text
//!  AWAIT_TICKET ──▶ ROUTE ──▶ FETCH ──▶ ENCODE_STREAM ──▶ DONE
//!                     │         │            │
//!                     └─────────┴────────────┴──▶ ERROR
//! ```
//!
//! Failures before the stream starts are returned in place of the stream;
//! a failure while encoding ends the stream with an error status. A valid
//! empty result is a schema chunk and no data chunks, never an error.

use std::{
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Instant,
};

use arrow::error::ArrowError;
use arrow_flight::{
    Action, ActionType, Criteria, Empty, FlightData, FlightDescriptor, FlightEndpoint, FlightInfo,
    HandshakeRequest, HandshakeResponse, PollInfo, PutResult, SchemaResult, Ticket,
    flight_descriptor::DescriptorType,
    flight_service_server::{FlightService as Flight, FlightServiceServer as FlightServer},
};
use futures::{Stream, StreamExt, ready, stream::BoxStream};
use gateway_flight::ChunkEncoderBuilder;
use gateway_table::canonical_schema;
use snafu::{ResultExt, Snafu};
use tonic::{Request, Response, Streaming};
use tracing::{debug, info, warn};

use crate::{
    backend::{BackendError, Backends},
    router::{self, ROUTES, RouteSpec, UnknownTicket},
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("{}", source))]
    Route { source: UnknownTicket },

    #[snafu(display("Error fetching '{}': {}", ticket, source))]
    Fetch {
        ticket: String,
        source: BackendError,
    },

    #[snafu(display("Failed to encode schema: {}", source))]
    EncodeSchema { source: ArrowError },

    #[snafu(display("Unsupported flight descriptor: {}", description))]
    UnsupportedDescriptor { description: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl From<Error> for tonic::Status {
    /// Log `err` at a level matching who is at fault, then map it to a
    /// status code.
    fn from(err: Error) -> Self {
        // client mistakes are info, store and encoding failures warn
        let msg = "DoGet request failed";
        let ticket = err.ticket();
        match &err {
            Error::Route { .. } | Error::UnsupportedDescriptor { .. } => {
                info!(e=%err, %ticket, msg)
            }
            Error::Fetch { source, .. } if source.is_schema_mismatch() => {
                warn!(e=%err, %ticket, msg)
            }
            Error::Fetch { .. } => info!(e=%err, %ticket, msg),
            Error::EncodeSchema { .. } => warn!(e=%err, %ticket, msg),
        }
        err.into_status()
    }
}

impl Error {
    fn into_status(self) -> tonic::Status {
        let msg = self.to_string();

        let code = match self {
            Self::Route { .. } => tonic::Code::NotFound,
            Self::Fetch { source, .. } => match source {
                BackendError::Unavailable { .. } => tonic::Code::Unavailable,
                BackendError::Decode { .. } | BackendError::SchemaMismatch { .. } => {
                    tonic::Code::FailedPrecondition
                }
                BackendError::Serialize { .. } => tonic::Code::Internal,
            },
            Self::EncodeSchema { .. } => tonic::Code::Internal,
            Self::UnsupportedDescriptor { .. } => tonic::Code::InvalidArgument,
        };

        tonic::Status::new(code, msg)
    }

    /// returns the ticket, if known, used for logging
    fn ticket(&self) -> &str {
        match self {
            Self::Route { source } => &source.ticket,
            Self::Fetch { ticket, .. } => ticket,
            Self::EncodeSchema { .. } | Self::UnsupportedDescriptor { .. } => "<unknown>",
        }
    }
}

type TonicStream<T> = Pin<Box<dyn Stream<Item = Result<T, tonic::Status>> + Send + 'static>>;

/// Where a `DoGet` call is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    AwaitTicket,
    Route,
    Fetch,
    EncodeStream,
    Done,
    Error,
}

impl RequestState {
    pub fn can_advance_to(self, next: Self) -> bool {
        use RequestState::*;
        matches!(
            (self, next),
            (AwaitTicket, Route)
                | (Route, Fetch)
                | (Route, Error)
                | (Fetch, EncodeStream)
                | (Fetch, Error)
                | (EncodeStream, Done)
                | (EncodeStream, Error)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }
}

/// Tracks and logs one `DoGet` call.
#[derive(Debug)]
struct RequestTracker {
    ticket: String,
    state: RequestState,
    start: Instant,
}

impl RequestTracker {
    fn new() -> Self {
        Self {
            ticket: String::new(),
            state: RequestState::AwaitTicket,
            start: Instant::now(),
        }
    }

    fn advance(&mut self, next: RequestState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "invalid DoGet transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!(ticket=%self.ticket, from=?self.state, to=?next, "DoGet state");
        self.state = next;
    }

    /// Move to [`RequestState::Error`] and convert `err` for the caller.
    fn fail(&mut self, err: Error) -> tonic::Status {
        self.advance(RequestState::Error);
        err.into()
    }
}

/// Serves the gateway's tickets over Arrow Flight.
#[derive(Debug, Clone)]
pub struct GatewayService {
    backends: Arc<Backends>,
    encoder: ChunkEncoderBuilder,
}

impl GatewayService {
    pub fn new(backends: Backends) -> Self {
        Self {
            backends: Arc::new(backends),
            encoder: ChunkEncoderBuilder::new(),
        }
    }

    /// Use `encoder` to chunk every response.
    pub fn with_encoder(mut self, encoder: ChunkEncoderBuilder) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn into_server(self) -> FlightServer<Self> {
        FlightServer::new(self)
    }

    async fn run_do_get(
        &self,
        mut tracker: RequestTracker,
        ticket: Ticket,
    ) -> Result<GetStream, tonic::Status> {
        tracker.advance(RequestState::Route);
        tracker.ticket = String::from_utf8_lossy(&ticket.ticket).into_owned();

        let route = match router::resolve_bytes(&ticket.ticket).context(RouteSnafu) {
            Ok(route) => route,
            Err(e) => return Err(tracker.fail(e)),
        };

        info!(
            ticket=%tracker.ticket,
            backend=%route.backend,
            projection=?route.projection,
            output=?route.output,
            "DoGet request",
        );

        tracker.advance(RequestState::Fetch);
        let table = match self.backends.fetch(route).await.context(FetchSnafu {
            ticket: tracker.ticket.clone(),
        }) {
            Ok(table) => table,
            Err(e) => return Err(tracker.fail(e)),
        };

        debug!(
            ticket=%tracker.ticket,
            rows=table.num_rows(),
            elapsed=?tracker.start.elapsed(),
            "Fetched table",
        );

        tracker.advance(RequestState::EncodeStream);
        Ok(GetStream {
            inner: self.encoder.clone().build(table),
            tracker,
            chunks: 0,
            done: false,
        })
    }
}

fn flight_info(ticket: &str, route: &RouteSpec) -> Result<FlightInfo> {
    let endpoint = FlightEndpoint::new().with_ticket(Ticket::new(ticket.as_bytes().to_vec()));
    let info = FlightInfo::new()
        .with_descriptor(FlightDescriptor::new_path(vec![ticket.to_string()]))
        .with_endpoint(endpoint);

    if route.is_canonical() {
        info.try_with_schema(&canonical_schema())
            .context(EncodeSchemaSnafu)
    } else {
        Ok(info)
    }
}

#[tonic::async_trait]
impl Flight for GatewayService {
    type HandshakeStream = TonicStream<HandshakeResponse>;
    type ListFlightsStream = TonicStream<FlightInfo>;
    type DoGetStream = TonicStream<FlightData>;
    type DoPutStream = TonicStream<PutResult>;
    type DoActionStream = TonicStream<arrow_flight::Result>;
    type ListActionsStream = TonicStream<ActionType>;
    type DoExchangeStream = TonicStream<FlightData>;

    async fn get_schema(
        &self,
        _request: Request<FlightDescriptor>,
    ) -> Result<Response<SchemaResult>, tonic::Status> {
        Err(tonic::Status::unimplemented(
            "get_schema is not supported by the gateway",
        ))
    }

    async fn do_get(
        &self,
        request: Request<Ticket>,
    ) -> Result<Response<Self::DoGetStream>, tonic::Status> {
        let stream = self
            .run_do_get(RequestTracker::new(), request.into_inner())
            .await?;
        Ok(Response::new(Box::pin(stream) as TonicStream<FlightData>))
    }

    async fn handshake(
        &self,
        _request: Request<Streaming<HandshakeRequest>>,
    ) -> Result<Response<Self::HandshakeStream>, tonic::Status> {
        Err(tonic::Status::unimplemented(
            "handshake is not supported by the gateway",
        ))
    }

    /// Lists one flight per known ticket.
    async fn list_flights(
        &self,
        _request: Request<Criteria>,
    ) -> Result<Response<Self::ListFlightsStream>, tonic::Status> {
        let infos = ROUTES
            .iter()
            .map(|(ticket, route)| flight_info(ticket, route))
            .collect::<Result<Vec<_>>>()?;

        debug!(flights = infos.len(), "ListFlights request");
        let stream = futures::stream::iter(infos.into_iter().map(Ok));
        Ok(Response::new(stream.boxed()))
    }

    /// Describes the flight for a path descriptor naming one ticket.
    async fn get_flight_info(
        &self,
        request: Request<FlightDescriptor>,
    ) -> Result<Response<FlightInfo>, tonic::Status> {
        let descriptor = request.into_inner();
        let ticket = match descriptor.r#type() {
            DescriptorType::Path => match descriptor.path.as_slice() {
                [ticket] => ticket.clone(),
                _ => {
                    return Err(Error::UnsupportedDescriptor {
                        description: format!("path with {} elements", descriptor.path.len()),
                    }
                    .into());
                }
            },
            DescriptorType::Cmd => {
                return Err(Error::UnsupportedDescriptor {
                    description: "command".to_string(),
                }
                .into());
            }
            DescriptorType::Unknown => {
                return Err(Error::UnsupportedDescriptor {
                    description: "unknown type".to_string(),
                }
                .into());
            }
        };

        let route = router::resolve(&ticket).context(RouteSnafu)?;
        Ok(Response::new(flight_info(&ticket, &route)?))
    }

    async fn poll_flight_info(
        &self,
        _request: Request<FlightDescriptor>,
    ) -> Result<Response<PollInfo>, tonic::Status> {
        Err(tonic::Status::unimplemented(
            "poll_flight_info is not supported by the gateway",
        ))
    }

    async fn do_put(
        &self,
        _request: Request<Streaming<FlightData>>,
    ) -> Result<Response<Self::DoPutStream>, tonic::Status> {
        Err(tonic::Status::unimplemented("do_put is not supported by the gateway"))
    }

    async fn do_action(
        &self,
        _request: Request<Action>,
    ) -> Result<Response<Self::DoActionStream>, tonic::Status> {
        Err(tonic::Status::unimplemented(
            "do_action is not supported by the gateway",
        ))
    }

    async fn list_actions(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<Self::ListActionsStream>, tonic::Status> {
        Err(tonic::Status::unimplemented(
            "list_actions is not supported by the gateway",
        ))
    }

    async fn do_exchange(
        &self,
        _request: Request<Streaming<FlightData>>,
    ) -> Result<Response<Self::DoExchangeStream>, tonic::Status> {
        Err(tonic::Status::unimplemented(
            "do_exchange is not supported by the gateway",
        ))
    }
}

/// The response stream of one `DoGet` call.
///
/// Chunks are produced as the transport polls for them, so a slow reader
/// holds back encoding.
struct GetStream {
    inner: BoxStream<'static, gateway_flight::Result<FlightData>>,
    tracker: RequestTracker,
    chunks: usize,
    done: bool,
}

impl Stream for GetStream {
    type Item = Result<FlightData, tonic::Status>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if self.done {
                return Poll::Ready(None);
            }

            let res = ready!(self.inner.poll_next_unpin(cx));
            match res {
                None => {
                    self.done = true;
                    self.tracker.advance(RequestState::Done);
                    debug!(
                        ticket=%self.tracker.ticket,
                        chunks=self.chunks,
                        elapsed=?self.tracker.start.elapsed(),
                        "Completed DoGet request",
                    );
                }
                Some(Ok(data)) => {
                    self.chunks += 1;
                    return Poll::Ready(Some(Ok(data)));
                }
                Some(Err(e)) => {
                    self.done = true;
                    self.tracker.advance(RequestState::Error);
                    info!(ticket=%self.tracker.ticket, %e, "Error encoding DoGet response");
                    return Poll::Ready(Some(Err(e.into())));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use arrow::{
        array::{Float32Array, Int64Array, StringArray},
        datatypes::{DataType, Field, Schema},
        record_batch::RecordBatch,
    };
    use futures::TryStreamExt;
    use gateway_flight::decode_table;
    use gateway_table::{Table, schema::VALUE_COLUMN};

    use super::*;
    use crate::{
        backend::{
            DocumentAdapter, EmbeddedAdapter, RelationalAdapter,
            memory::{MemoryDocumentSource, MemorySqlSource},
        },
        test_util::{self, SENSOR_TABLE, sensor_backends, unavailable_backends},
    };

    async fn do_get(
        service: &GatewayService,
        ticket: Vec<u8>,
    ) -> Result<Vec<FlightData>, tonic::Status> {
        let response = service
            .do_get(Request::new(Ticket::new(ticket)))
            .await?;
        response.into_inner().try_collect().await
    }

    #[test]
    fn state_machine_transitions() {
        use RequestState::*;
        let path = [AwaitTicket, Route, Fetch, EncodeStream, Done];
        for pair in path.windows(2) {
            assert!(pair[0].can_advance_to(pair[1]), "{pair:?}");
        }
        for from in [Route, Fetch, EncodeStream] {
            assert!(from.can_advance_to(Error));
        }
        assert!(!AwaitTicket.can_advance_to(Fetch));
        assert!(!AwaitTicket.can_advance_to(Error));
        assert!(!Done.can_advance_to(Error));
        assert!(!Error.can_advance_to(Done));
        assert!(Done.is_terminal() && Error.is_terminal());
        assert!(!EncodeStream.is_terminal());
    }

    #[test_log::test(tokio::test)]
    async fn do_get_streams_canonical_table() {
        let service = GatewayService::new(sensor_backends());
        let messages = do_get(&service, b"duckdb".to_vec()).await.unwrap();

        let table = decode_table(futures::stream::iter(
            messages.into_iter().map(Ok::<_, tonic::Status>),
        ))
        .await
        .unwrap();
        table.ensure_schema(&canonical_schema()).unwrap();
        assert_eq!(table.num_rows(), 3);
        assert_eq!(table.mean(VALUE_COLUMN).unwrap(), Some(40.0));
    }

    #[test_log::test(tokio::test)]
    async fn do_get_chunks_by_rows() {
        let service = GatewayService::new(sensor_backends())
            .with_encoder(ChunkEncoderBuilder::new().with_max_chunk_rows(NonZeroUsize::new(1)));
        let messages = do_get(&service, b"mongo".to_vec()).await.unwrap();
        // schema + one chunk per row
        assert_eq!(messages.len(), 4);
    }

    #[test_log::test(tokio::test)]
    async fn unknown_ticket_is_not_found() {
        let service = GatewayService::new(sensor_backends());
        for ticket in [b"postgres2".to_vec(), vec![0xff, 0x00]] {
            let status = do_get(&service, ticket).await.unwrap_err();
            assert_eq!(status.code(), tonic::Code::NotFound, "{status}");
        }
    }

    #[test_log::test(tokio::test)]
    async fn unavailable_backend_fails_before_stream() {
        let service = GatewayService::new(unavailable_backends());
        let err = service
            .do_get(Request::new(Ticket::new(b"postgres".to_vec())))
            .await
            .unwrap_err();
        assert_eq!(err.code(), tonic::Code::Unavailable, "{err}");
    }

    #[test_log::test(tokio::test)]
    async fn schema_mismatch_is_failed_precondition() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, true),
            Field::new("name", DataType::Utf8, true),
            Field::new("value", DataType::Utf8, true),
            Field::new("timestamp", DataType::Int64, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![1])),
                Arc::new(StringArray::from(vec!["Sensor_1"])),
                Arc::new(StringArray::from(vec!["twenty"])),
                Arc::new(Int64Array::from(vec![0])),
            ],
        )
        .unwrap();
        let backends = Backends::new(
            RelationalAdapter::new(
                Arc::new(MemorySqlSource::new(Table::from_batch(batch))),
                SENSOR_TABLE,
            ),
            DocumentAdapter::new(Arc::new(MemoryDocumentSource::new(test_util::documents()))),
            EmbeddedAdapter::new(
                Arc::new(MemorySqlSource::new(test_util::embedded_table())),
                SENSOR_TABLE,
            ),
        );
        let service = GatewayService::new(backends);

        let status = do_get(&service, b"postgres".to_vec()).await.unwrap_err();
        assert_eq!(status.code(), tonic::Code::FailedPrecondition, "{status}");

        // the other backends are unaffected
        let messages = do_get(&service, b"mongo".to_vec()).await.unwrap();
        assert_eq!(messages.len(), 2);
    }

    #[test_log::test(tokio::test)]
    async fn encode_failure_ends_stream_with_error() {
        // the table declares `value` non-nullable, but its second batch
        // holds a null, which only surfaces once that batch is encoded
        let strict = Arc::new(Schema::new(vec![Field::new(
            VALUE_COLUMN,
            DataType::Float32,
            false,
        )]));
        let loose = Arc::new(Schema::new(vec![Field::new(
            VALUE_COLUMN,
            DataType::Float32,
            true,
        )]));
        let good = RecordBatch::try_new(
            Arc::clone(&strict),
            vec![Arc::new(Float32Array::from(vec![20.0, 40.0]))],
        )
        .unwrap();
        let bad = RecordBatch::try_new(
            loose,
            vec![Arc::new(Float32Array::from(vec![None, Some(60.0)]))],
        )
        .unwrap();
        let table = Table::try_new(strict, vec![good, bad]).unwrap();

        let backends = Backends::new(
            RelationalAdapter::new(Arc::new(MemorySqlSource::new(table)), SENSOR_TABLE),
            DocumentAdapter::new(Arc::new(MemoryDocumentSource::new(test_util::documents()))),
            EmbeddedAdapter::new(
                Arc::new(MemorySqlSource::new(test_util::embedded_table())),
                SENSOR_TABLE,
            ),
        );
        let service = GatewayService::new(backends);

        let stream = service
            .do_get(Request::new(Ticket::new(b"postgres_values".to_vec())))
            .await
            .unwrap()
            .into_inner();
        let items: Vec<_> = stream.collect().await;

        // schema, the first batch, then the error and nothing after it
        assert_eq!(items.len(), 3);
        assert!(items[0].is_ok() && items[1].is_ok());
        let status = items[2].as_ref().unwrap_err();
        assert_eq!(status.code(), tonic::Code::Internal, "{status}");
    }

    #[tokio::test]
    async fn list_flights_covers_every_ticket() {
        let service = GatewayService::new(sensor_backends());
        let infos: Vec<FlightInfo> = service
            .list_flights(Request::new(Criteria::default()))
            .await
            .unwrap()
            .into_inner()
            .try_collect()
            .await
            .unwrap();

        assert_eq!(infos.len(), ROUTES.len());
        for (info, (ticket, route)) in infos.iter().zip(ROUTES) {
            let endpoint_ticket = &info.endpoint[0].ticket.as_ref().unwrap().ticket;
            assert_eq!(endpoint_ticket.as_ref(), ticket.as_bytes());
            assert_eq!(info.flight_descriptor.as_ref().unwrap().path, vec![ticket]);

            if route.is_canonical() {
                let schema = info.clone().try_decode_schema().unwrap();
                assert_eq!(&schema, canonical_schema().as_ref(), "{ticket}");
            }
        }
    }

    #[tokio::test]
    async fn flight_info_by_path() {
        let service = GatewayService::new(sensor_backends());
        let info = service
            .get_flight_info(Request::new(FlightDescriptor::new_path(vec![
                "postgres_values".to_string(),
            ])))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(info.endpoint.len(), 1);

        let status = service
            .get_flight_info(Request::new(FlightDescriptor::new_path(vec![
                "nope".to_string(),
            ])))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::NotFound);

        let status = service
            .get_flight_info(Request::new(FlightDescriptor::new_cmd(b"SELECT 1".to_vec())))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
    }
}
