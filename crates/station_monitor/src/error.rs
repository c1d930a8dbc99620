use station_query::QueryError;
use station_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("status reply has errors: {}", .0.join(", "))]
    ReplyErrors(Vec<String>),

    /// The reply came from a different station than the one addressed.
    #[error("status reply device id mismatch: {expected} != {actual}")]
    ProtocolMismatch { expected: String, actual: String },

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("unknown station {0}")]
    UnknownStation(String),
}

pub type Result<T> = std::result::Result<T, MonitorError>;
