//! Error types for duplex-rpc.

use thiserror::Error;

/// Main error type for all duplex-rpc operations.
#[derive(Debug, Error)]
pub enum DuplexError {
    /// I/O error on the underlying stream or a channel.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// Protocol error (invalid frame, truncated value, etc.).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// No handler registered for the selector.
    #[error("handler does not exist for selector: {0}")]
    HandlerNotFound(String),

    /// The remote handler replied with an error.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// `return_*` or `continue_*` was called on a responder that already responded.
    #[error("Already responded")]
    AlreadyResponded,

    /// Channel operation on a response that was not continued.
    #[error("Response was not continued")]
    NotContinued,

    /// The channel ended where a value was expected.
    #[error("Channel closed")]
    ChannelClosed,

    /// The session is gone.
    #[error("Connection closed")]
    ConnectionClosed,
}

/// Error reconstructed on the calling side from the message in a response header.
///
/// Only the message crosses the wire; the remote error's type is not preserved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RemoteError {
    message: String,
}

impl RemoteError {
    /// Create a remote error from its message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The message sent by the remote handler.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Result type alias using DuplexError.
pub type Result<T> = std::result::Result<T, DuplexError>;
