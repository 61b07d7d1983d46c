//! Transport abstraction for the Quick Draw duel protocol.
//!
//! The [`Transport`] trait defines a bidirectional text message channel
//! between the client and the game server. The duel protocol uses JSON text
//! messages, so every transport implementation must handle message framing
//! internally (e.g., WebSocket frames, length-prefixed TCP, QUIC streams).
//!
//! [`Connector`] is the factory half: the connection loop owns one and asks
//! it for a fresh transport on every connect and reconnect attempt. This is
//! what makes bounded reconnect-with-backoff possible — a single
//! pre-connected transport could not be re-established after a drop.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use quickdraw_client::error::QuickDrawError;
//! use quickdraw_client::transport::{Connector, Transport};
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, message: String) -> Result<(), QuickDrawError> {
//!         // Write one serialized frame to the wire
//!         todo!()
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, QuickDrawError>> {
//!         // Yield the next frame, or None once the peer hangs up
//!         todo!()
//!     }
//!
//!     async fn close(&mut self) -> Result<(), QuickDrawError> {
//!         // Run the close handshake
//!         todo!()
//!     }
//! }
//!
//! struct MyConnector { /* endpoint parameters */ }
//!
//! #[async_trait]
//! impl Connector for MyConnector {
//!     type Transport = MyTransport;
//!
//!     async fn connect(&mut self) -> Result<MyTransport, QuickDrawError> {
//!         // Establish a fresh connection
//!         todo!()
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::QuickDrawError;

/// A bidirectional text message transport for the Quick Draw duel protocol.
///
/// Implementors shuttle serialized JSON strings between the client and
/// server. Each call to [`send`](Transport::send) transmits one complete
/// JSON message. Each call to [`recv`](Transport::recv) returns one complete
/// JSON message.
///
/// # Cancel Safety
///
/// The [`recv`](Transport::recv) method **MUST** be cancel-safe because it is
/// used inside `tokio::select!`. If `recv` is cancelled before completion,
/// calling it again must not lose data. Channel-based implementations (e.g.,
/// wrapping `mpsc::Receiver`) are naturally cancel-safe.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Transmit one serialized message to the server.
    ///
    /// # Errors
    ///
    /// Returns [`QuickDrawError::TransportSend`] if the message could not be
    /// sent (e.g., connection broken, write buffer full).
    async fn send(&mut self, message: String) -> Result<(), QuickDrawError>;

    /// Wait for the next message from the server.
    ///
    /// `Some(Ok(text))` is a complete message, `Some(Err(e))` a transport
    /// fault, and `None` means the server closed the connection cleanly.
    ///
    /// # Cancel Safety
    ///
    /// Must be cancel-safe (see the [trait documentation](Transport)).
    async fn recv(&mut self) -> Option<Result<String, QuickDrawError>>;

    /// Shut the connection down gracefully.
    ///
    /// # Errors
    ///
    /// Returns an error if the graceful shutdown fails. Implementations
    /// should still release resources even if the close handshake fails.
    async fn close(&mut self) -> Result<(), QuickDrawError>;
}

/// Factory that establishes a fresh [`Transport`] on demand.
///
/// The connection loop calls [`connect`](Connector::connect) once at startup
/// and again for every reconnect attempt after an ordinary disconnect. The
/// connector owns whatever endpoint parameters the concrete transport needs
/// (URL, host:port, TLS config).
#[async_trait]
pub trait Connector: Send + 'static {
    /// The transport type this connector produces.
    type Transport: Transport;

    /// Establish a new connection.
    ///
    /// # Errors
    ///
    /// Returns a transport-specific [`QuickDrawError`] when the connection
    /// cannot be established. The connection loop treats any error here as a
    /// failed attempt counting toward the bounded reconnect budget.
    async fn connect(&mut self) -> Result<Self::Transport, QuickDrawError>;
}
