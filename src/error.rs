//! Error types
//!
//! Every fallible operation in the crate returns [`Result`]. Hub-level
//! failures (`Closed`, `ShutdownTimeout`) are returned to the caller of the
//! hub operation; session-level failures (`Encode`, `Write`,
//! `UnsupportedSink`) end only the connection that produced them.

use std::time::Duration;

/// Boxed error source carried by [`EncodeError`]
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error type for hub and session operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The hub is closing or closed and no longer accepts the operation
    #[error("sse-hub: hub is closed")]
    Closed,

    /// The sink cannot be flushed incrementally, so events cannot be streamed
    #[error("sse-hub: sink does not support streaming")]
    UnsupportedSink,

    /// The encoder failed to turn a batch into bytes
    #[error(transparent)]
    Encode(#[from] EncodeError),

    /// Writing or flushing a frame to the sink failed
    #[error("sse-hub: unable to write events: {0}")]
    Write(#[source] std::io::Error),

    /// Subscribers did not disconnect before the close timeout
    #[error("sse-hub: timeout after {0:?} waiting for clients to close")]
    ShutdownTimeout(Duration),
}

impl Error {
    /// Check if the error means the hub refused the operation because it is shutting down
    pub fn is_closed(&self) -> bool {
        matches!(self, Error::Closed)
    }
}

/// Encoder failure
#[derive(Debug, thiserror::Error)]
#[error("sse-hub: unable to encode events: {source}")]
pub struct EncodeError {
    #[source]
    source: BoxError,
}

impl EncodeError {
    /// Wrap any error raised while encoding a batch
    pub fn new(source: impl Into<BoxError>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

impl From<serde_json::Error> for EncodeError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(err)
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;
