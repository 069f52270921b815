//! Error types for obex-engine.

use thiserror::Error;

/// Main error type for all OBEX engine operations.
#[derive(Debug, Error)]
pub enum ObexError {
    /// I/O error from a completion adapter's transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed packet or header on the wire.
    #[error("decode error: {0}")]
    Decode(String),

    /// Peer behavior the protocol does not allow (unexpected opcode,
    /// missing final bit, continue on a single-packet operation).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The caller misused the API (request while busy, invalid header
    /// name, headers too long for a single-packet operation). State
    /// remains valid for recovery.
    #[error("invalid request: {0}")]
    Usage(String),

    /// A single encoded header exceeds the negotiated packet size.
    #[error("capacity exceeded: {0}")]
    Capacity(String),

    /// Operation the engine refuses by design (OBEX `session`).
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    /// The server-side connection-id counter would wrap past 0xFFFFFFFF.
    #[error("connection id space exhausted")]
    IdExhausted,
}

/// Result type alias using ObexError.
pub type Result<T> = std::result::Result<T, ObexError>;
