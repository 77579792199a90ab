//! Error types for the chat relay
//!
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Application-level errors
///
/// Session-level variants (handshake, peer closed, write timeout) only ever
/// end one connection; the server loop keeps running.
#[derive(Debug, Error)]
pub enum AppError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Settings file could not be parsed
    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// First payload was not a valid `viewer` / `name:<N>` handshake
    #[error("Handshake rejected: {0}")]
    HandshakeRejected(String),

    /// No complete handshake line arrived in time
    #[error("Handshake timed out")]
    HandshakeTimeout,

    /// Peer closed the connection
    #[error("Peer closed the connection")]
    PeerClosed,

    /// Buffered partial line exceeded the maximum line length
    #[error("Inbound line exceeds {0} bytes")]
    LineTooLong(usize),

    /// Outbound write did not complete in time
    #[error("Write timed out")]
    WriteTimeout,

    /// Registry or routing invariant broken
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}
