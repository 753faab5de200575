use arrow::error::ArrowError;

/// Errors raised while encoding or decoding a chunked table stream.
#[derive(Debug, thiserror::Error)]
pub enum FlightError {
    /// The peer sent chunks out of order or a chunk that cannot be parsed.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Error status from the underlying tonic library, usually reported by
    /// the server in place of (or in the middle of) a stream.
    #[error("{0}")]
    Tonic(#[from] tonic::Status),

    #[error("arrow error: {0}")]
    Arrow(#[from] ArrowError),

    #[error("table error: {0}")]
    Table(#[from] gateway_table::Error),
}

impl FlightError {
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::ProtocolViolation(message.into())
    }

    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, Self::ProtocolViolation(_))
    }
}

impl From<FlightError> for tonic::Status {
    fn from(err: FlightError) -> Self {
        match err {
            FlightError::Tonic(status) => status,
            other => Self::internal(format!("Error encoding table for flight: {other}")),
        }
    }
}

pub type Result<T, E = FlightError> = std::result::Result<T, E>;
