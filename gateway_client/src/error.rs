use gateway_flight::FlightError;
use tonic::{Code, Status};

/// The errors returned by this client
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The server does not know the requested ticket.
    #[error("unknown ticket: {0}")]
    UnknownTicket(String),

    /// The backend behind the ticket could not be reached or queried.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// A table did not conform to the schema it was required to have.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    /// The response stream broke the chunk protocol.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Any other error status returned by the server.
    #[error("server error ({code:?}): {message}")]
    Server { code: Code, message: String },

    /// The endpoint could not be reached.
    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),
}

impl Error {
    pub fn is_unknown_ticket(&self) -> bool {
        matches!(self, Self::UnknownTicket(_))
    }

    pub fn is_backend_unavailable(&self) -> bool {
        matches!(self, Self::BackendUnavailable(_))
    }

    pub fn is_schema_mismatch(&self) -> bool {
        matches!(self, Self::SchemaMismatch(_))
    }

    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, Self::ProtocolViolation(_))
    }
}

impl From<Status> for Error {
    fn from(status: Status) -> Self {
        let message = status.message().to_string();
        match status.code() {
            Code::NotFound => Self::UnknownTicket(message),
            Code::Unavailable => Self::BackendUnavailable(message),
            Code::FailedPrecondition => Self::SchemaMismatch(message),
            code => Self::Server { code, message },
        }
    }
}

impl From<FlightError> for Error {
    fn from(err: FlightError) -> Self {
        match err {
            FlightError::Tonic(status) => status.into(),
            FlightError::ProtocolViolation(message) => Self::ProtocolViolation(message),
            FlightError::Arrow(e) => Self::ProtocolViolation(e.to_string()),
            FlightError::Table(e) if e.is_schema_mismatch() => Self::SchemaMismatch(e.to_string()),
            FlightError::Table(e) => Self::ProtocolViolation(e.to_string()),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
