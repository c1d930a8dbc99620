use station_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueryError {
    /// The station filter rejected the URL. A deliberate no-op.
    #[error("ignored")]
    Ignored,

    /// A request is already outstanding for this URL.
    #[error("throttled")]
    Throttled,

    #[error("transport: {0:#}")]
    Transport(anyhow::Error),

    #[error("decode: {0}")]
    Decode(#[from] prost::DecodeError),

    /// BUSY reply whose delays sum to zero.
    #[error("busy")]
    Busy,

    #[error("still busy after {0} retries")]
    BusyRetriesExhausted(u32),

    #[error("history: {0}")]
    History(#[from] StoreError),

    #[error("unexpected HTTP status {0}")]
    HttpStatus(u16),
}

pub type Result<T> = std::result::Result<T, QueryError>;
