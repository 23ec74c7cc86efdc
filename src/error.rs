//! Errors raised by the framer, the dispatcher, the sessions and the client.

use thiserror::Error;

/// Broad failure classes, used to decide whether an error is fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Listening, connecting or registering failed. Never recovered.
    Setup,
    /// A frame or a parameter payload could not be decoded.
    Decode,
    /// The remote method was unknown or the handler failed.
    Dispatch,
    /// The connection broke. Ends the affected session only.
    Io,
}

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("failed to listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to connect to {addr}: {message}")]
    Connect { addr: String, message: String },

    #[error("method already registered: {0}")]
    DuplicateMethod(String),

    #[error("malformed frame: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("frame too large: {0} bytes")]
    FrameTooLarge(usize),

    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("remote error {code}: {message}")]
    Remote { code: i64, message: String },

    #[error("response id mismatch: expected {expected}, got {got}")]
    IdMismatch { expected: u64, got: serde_json::Value },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection closed by peer")]
    ConnectionClosed,

    #[error("http transport error: {0}")]
    Http(String),
}

impl RpcError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RpcError::Bind { .. } | RpcError::Connect { .. } | RpcError::DuplicateMethod(_) => {
                ErrorKind::Setup
            }
            RpcError::Decode(_) | RpcError::FrameTooLarge(_) | RpcError::InvalidParams(_) => {
                ErrorKind::Decode
            }
            RpcError::Remote { .. } | RpcError::IdMismatch { .. } => ErrorKind::Dispatch,
            RpcError::Io(_) | RpcError::ConnectionClosed | RpcError::Http(_) => ErrorKind::Io,
        }
    }
}
