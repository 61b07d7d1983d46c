//! Transport implementations for the Quick Draw duel protocol.
//!
//! This module provides concrete [`Transport`](crate::Transport)
//! implementations behind feature gates. Enable the corresponding Cargo
//! feature to pull in a transport:
//!
//! | Feature                | Transport              |
//! |------------------------|------------------------|
//! | `transport-websocket`  | [`WebSocketTransport`] |
//!
//! # Example
//!
//! ```rust,ignore
//! # async fn example() -> Result<(), quickdraw_client::QuickDrawError> {
//! use quickdraw_client::transports::WebSocketTransport;
//! use quickdraw_client::Transport;
//!
//! let mut ws = WebSocketTransport::connect("ws://localhost:8765/duel").await?;
//! ws.send(r#"{"type":"join-queue","arena_index":0,"seq":1}"#.to_string()).await?;
//!
//! if let Some(Ok(msg)) = ws.recv().await {
//!     println!("server said: {msg}");
//! }
//!
//! ws.close().await?;
//! # Ok(())
//! # }
//! ```

#[cfg(feature = "transport-websocket")]
pub mod websocket;

#[cfg(feature = "transport-websocket")]
pub use websocket::{WebSocketConnector, WebSocketTransport};
