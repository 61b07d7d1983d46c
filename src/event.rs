//! Typed events emitted by the connection loop.
//!
//! [`QuickDrawEvent`] covers every inbound message kind plus a handful of
//! synthetic connection-lifecycle events that have no wire counterpart
//! (`Connected`, `Reconnecting`, `ConnectionLost`, `Disconnected`).
//!
//! Each event maps to an [`EventKind`] tag used by the
//! [`Dispatcher`](crate::dispatch::Dispatcher) to route an event to every
//! subscriber registered for that kind.

use std::time::Duration;

use crate::protocol::{ParticipantState, PlayerId, ServerMessage, Vec3};

/// An event observed by the client.
#[derive(Debug, Clone)]
pub enum QuickDrawEvent {
    /// The transport is established (emitted after every connect and
    /// successful reconnect).
    Connected,
    /// The transport dropped; a reconnect attempt is scheduled.
    Reconnecting {
        /// 1-based count of consecutive failed attempts so far.
        attempt: u32,
        /// Backoff delay before the next attempt.
        delay: Duration,
    },
    /// The bounded reconnect budget is exhausted. Fatal; emitted exactly
    /// once, and always delivered even under event-channel backpressure.
    ConnectionLost { reason: String },
    /// The client shut down or the server closed the connection cleanly
    /// while no reconnect was warranted.
    Disconnected { reason: Option<String> },

    /// Identity accepted by the server.
    Welcome {
        player_id: PlayerId,
        token: Option<String>,
    },
    /// An opponent was found; the duel handshake begins.
    MatchFound {
        opponent_id: PlayerId,
        start_position: Vec3,
        start_rotation: f32,
        arena_index: u8,
    },
    /// Both duelists are in position.
    ReadySignal,
    /// Countdown running.
    Countdown,
    /// Draw signal.
    Draw,
    /// Authoritative duel outcome.
    DuelResult { winner_id: PlayerId },
    /// Authoritative force-reset.
    ForcedReset {
        position: Option<Vec3>,
        health: Option<u16>,
        ammo: Option<u8>,
    },
    /// Credential rejected; the client must be restarted. Fatal, always
    /// delivered.
    AuthFailure { reason: String },
    /// Roster: a remote participant appeared.
    PlayerJoined { player: ParticipantState },
    /// Roster: a remote participant's snapshot changed.
    PlayerUpdate { player: ParticipantState },
    /// Roster: a remote participant left.
    PlayerLeft { id: PlayerId },
    /// Non-fatal server error report.
    ServerError { message: String },
}

impl QuickDrawEvent {
    /// The routing tag for this event.
    pub fn kind(&self) -> EventKind {
        match self {
            QuickDrawEvent::Connected => EventKind::Connected,
            QuickDrawEvent::Reconnecting { .. } => EventKind::Reconnecting,
            QuickDrawEvent::ConnectionLost { .. } => EventKind::ConnectionLost,
            QuickDrawEvent::Disconnected { .. } => EventKind::Disconnected,
            QuickDrawEvent::Welcome { .. } => EventKind::Welcome,
            QuickDrawEvent::MatchFound { .. } => EventKind::MatchFound,
            QuickDrawEvent::ReadySignal => EventKind::ReadySignal,
            QuickDrawEvent::Countdown => EventKind::Countdown,
            QuickDrawEvent::Draw => EventKind::Draw,
            QuickDrawEvent::DuelResult { .. } => EventKind::DuelResult,
            QuickDrawEvent::ForcedReset { .. } => EventKind::ForcedReset,
            QuickDrawEvent::AuthFailure { .. } => EventKind::AuthFailure,
            QuickDrawEvent::PlayerJoined { .. } => EventKind::PlayerJoined,
            QuickDrawEvent::PlayerUpdate { .. } => EventKind::PlayerUpdate,
            QuickDrawEvent::PlayerLeft { .. } => EventKind::PlayerLeft,
            QuickDrawEvent::ServerError { .. } => EventKind::ServerError,
        }
    }

    /// Whether this event terminates the session (no further events follow
    /// except a possible `Disconnected`).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            QuickDrawEvent::ConnectionLost { .. } | QuickDrawEvent::AuthFailure { .. }
        )
    }
}

impl From<ServerMessage> for QuickDrawEvent {
    fn from(msg: ServerMessage) -> Self {
        match msg {
            ServerMessage::Welcome { player_id, token } => {
                QuickDrawEvent::Welcome { player_id, token }
            }
            ServerMessage::MatchFound {
                opponent_id,
                start_position,
                start_rotation,
                arena_index,
            } => QuickDrawEvent::MatchFound {
                opponent_id,
                start_position,
                start_rotation,
                arena_index,
            },
            ServerMessage::ReadySignal => QuickDrawEvent::ReadySignal,
            ServerMessage::Countdown => QuickDrawEvent::Countdown,
            ServerMessage::Draw => QuickDrawEvent::Draw,
            ServerMessage::DuelResult { winner_id } => QuickDrawEvent::DuelResult { winner_id },
            ServerMessage::ForcedReset {
                position,
                health,
                ammo,
            } => QuickDrawEvent::ForcedReset {
                position,
                health,
                ammo,
            },
            ServerMessage::AuthFailure { reason } => QuickDrawEvent::AuthFailure { reason },
            ServerMessage::PlayerJoined { player } => QuickDrawEvent::PlayerJoined { player },
            ServerMessage::PlayerUpdate { player } => QuickDrawEvent::PlayerUpdate { player },
            ServerMessage::PlayerLeft { id } => QuickDrawEvent::PlayerLeft { id },
            ServerMessage::Error { message } => QuickDrawEvent::ServerError { message },
        }
    }
}

/// Discriminant tag for [`QuickDrawEvent`], used as the dispatch key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connected,
    Reconnecting,
    ConnectionLost,
    Disconnected,
    Welcome,
    MatchFound,
    ReadySignal,
    Countdown,
    Draw,
    DuelResult,
    ForcedReset,
    AuthFailure,
    PlayerJoined,
    PlayerUpdate,
    PlayerLeft,
    ServerError,
}
