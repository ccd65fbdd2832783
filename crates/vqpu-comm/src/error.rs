//! Error types for the communication crate.

use thiserror::Error;

use crate::endpoint::Endpoint;

/// Errors raised by classical channels and discovery stores.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CommError {
    /// Endpoint string cannot be used by this transport.
    #[error("Invalid endpoint '{0}'")]
    InvalidEndpoint(String),

    /// Dialing a peer failed after all retries.
    #[error("Failed to connect to {peer} after {attempts} attempts: {source}")]
    Connect {
        /// The peer being dialed.
        peer: Endpoint,
        /// Number of attempts made.
        attempts: u32,
        /// Last I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Peer is not reachable through this channel.
    #[error("Unknown peer {0}")]
    UnknownPeer(Endpoint),

    /// The underlying transport has shut down.
    #[error("Channel closed")]
    Closed,

    /// Frame length exceeds the configured limit.
    #[error("Frame of {len} bytes exceeds limit of {max}")]
    FrameTooLarge {
        /// Announced frame length.
        len: usize,
        /// Configured limit.
        max: usize,
    },

    /// Payload does not decode to the expected shape.
    #[error("Malformed payload from {peer}: {reason}")]
    Decode {
        /// Sender of the payload.
        peer: Endpoint,
        /// What was wrong.
        reason: String,
    },

    /// Discovery record absent.
    #[error("No discovery record for '{0}'")]
    NotFound(String),

    /// Discovery store failure.
    #[error("Discovery error: {0}")]
    Discovery(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for communication operations.
pub type CommResult<T> = Result<T, CommError>;
