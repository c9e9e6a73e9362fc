//! Error types for the socket router
//!
//! Defines application-level errors and outbound send errors.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Application-level errors
///
/// Raised by the transport adapter and server startup. None of these are
/// ever reported to a client; they end a connection or, for a failed bind,
/// the process.
#[derive(Debug, Error)]
pub enum AppError {
    /// WebSocket protocol or handshake error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error (listener bind/accept)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The dispatcher consumer has stopped and no longer accepts envelopes
    #[error("Dispatcher closed")]
    DispatcherClosed,

    /// Invalid configuration value
    #[error("Config error: {0}")]
    Config(String),
}

/// Outbound send errors
///
/// Occurs when a frame cannot be queued for a connection's writer task.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    /// The writer task has ended (connection closed)
    #[error("Connection closed")]
    Closed,

    /// The connection's outbound buffer is full; the frame was dropped
    #[error("Outbound buffer full")]
    Full,
}
