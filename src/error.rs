//! Error types for the Quick Draw client.

use thiserror::Error;

/// Everything that can go wrong between the client and the duel server.
#[derive(Debug, Error)]
pub enum QuickDrawError {
    /// The transport rejected an outgoing frame.
    #[error("transport send failed: {0}")]
    TransportSend(String),

    /// The transport failed while polling for an incoming frame.
    #[error("transport receive failed: {0}")]
    TransportReceive(String),

    /// The connection was closed and the operation cannot proceed.
    #[error("transport closed")]
    TransportClosed,

    /// A protocol message could not be serialized or deserialized.
    #[error("bad protocol message: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The operation needs a live connection and there is none.
    #[error("not connected to duel server")]
    NotConnected,

    /// The bounded reconnect budget was exhausted without re-establishing a
    /// connection. This is fatal; the client must be restarted.
    #[error("gave up reconnecting after {attempts} failed attempts")]
    ReconnectExhausted {
        /// Number of consecutive connection attempts that failed.
        attempts: u32,
    },

    /// An operation ran past its deadline.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error from the underlying socket.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] for Quick Draw client operations.
pub type Result<T> = std::result::Result<T, QuickDrawError>;
