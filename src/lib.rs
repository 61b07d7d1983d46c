//! # Quick Draw Client
//!
//! Transport-agnostic Rust client for the Quick Draw duel session protocol:
//! queue-based matchmaking, a server-authoritative countdown/draw sequence,
//! client-side hit prediction, and an early-draw penalty lock.
//!
//! The crate splits into two halves:
//!
//! - An **async connection layer** ([`connection`], [`transport`],
//!   [`transports`]) that owns the socket: it re-dials with bounded
//!   exponential backoff, stamps every outgoing frame with a sequence number
//!   (plus a single-use nonce on shoot claims), and surfaces inbound traffic
//!   as typed [`QuickDrawEvent`]s on a bounded channel.
//! - A **synchronous game core** ([`duel`], [`session`], [`penalty`],
//!   [`timers`], [`dispatch`]) driven by an explicit per-frame tick with a
//!   caller-supplied `Instant`. Nothing in the core spawns tasks or reads
//!   the clock, which keeps every duel scenario testable with fake time.
//!
//! ## Features
//!
//! - **Transport-agnostic** — implement the [`Transport`] and
//!   [`Connector`](transport::Connector) traits for any backend
//! - **WebSocket built-in** — default `transport-websocket` feature provides
//!   `WebSocketConnector`
//! - **Event-driven** — receive typed [`QuickDrawEvent`]s via a channel and
//!   fan them out with [`Dispatcher`](dispatch::Dispatcher)
//! - **Deterministic core** — the duel state machine takes side-effect and
//!   command sinks by construction, so tests observe every effect
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use quickdraw_client::connection::{ConnectionConfig, Identity, QuickDrawConnection};
//! use quickdraw_client::transports::WebSocketConnector;
//!
//! let connector = WebSocketConnector::new("wss://duel.example.com/ws");
//! let config = ConnectionConfig::new(Identity::new("Tex"));
//! let (conn, mut events) = QuickDrawConnection::start(connector, config);
//!
//! conn.join_queue(0)?;
//! while let Some(event) = events.recv().await {
//!     // feed the duel machine / dispatcher
//! }
//! ```

pub mod connection;
pub mod dispatch;
pub mod duel;
pub mod error;
pub mod event;
pub mod penalty;
pub mod protocol;
pub mod session;
pub mod timers;
pub mod transport;

#[cfg(feature = "transport-websocket")]
pub mod transports;

// Re-export primary types for ergonomic imports.
pub use connection::{ConnectionConfig, Identity, QuickDrawConnection};
pub use dispatch::Dispatcher;
pub use duel::{DuelEffects, DuelMachine, DuelPhase};
pub use error::QuickDrawError;
pub use event::{EventKind, QuickDrawEvent};
pub use protocol::{ClientMessage, ServerMessage};
pub use session::SessionRoster;
pub use transport::{Connector, Transport};
