use std::time::Duration;

use daisy_protocol::{EncodeError, RequestSubject};
use daisy_transport::TransportError;

/// Errors returned to callers of [`crate::Board`].
#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    /// The request could not be encoded; nothing was sent.
    #[error("invalid request: {0}")]
    Encode(#[from] EncodeError),

    /// The board answered with a failure response.
    #[error("{subject} failed: {message}")]
    Failure {
        subject: RequestSubject,
        code: u32,
        message: String,
    },

    /// No response arrived in time; the next queued request was released.
    #[error("no response from board within {0:?}")]
    Timeout(Duration),

    /// The bytes could not be handed to the transport.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The board task has stopped.
    #[error("board connection closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, BoardError>;
