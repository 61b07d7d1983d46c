//! Wire types for the Quick Draw duel protocol.
//!
//! Every message is a flat JSON object with a `type` discriminator in
//! kebab-case (`"match-found"`, `"forced-reset"`, …). Outgoing commands are
//! wrapped in an [`OutboundFrame`] by the connection loop, which stamps a
//! monotonically increasing sequence number and, for replayable claims, a
//! single-use nonce. Sequence numbers and nonces exist for the server's
//! benefit (replay rejection); the client never reorders or deduplicates
//! inbound messages.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Type aliases ────────────────────────────────────────────────────

/// Unique identifier for participants, assigned by the server.
pub type PlayerId = Uuid;

// ── Constants ───────────────────────────────────────────────────────

/// Health restored on reset when the server omits an explicit value.
pub const DEFAULT_HEALTH: u16 = 100;

/// Ammo restored on reset when the server omits an explicit value.
pub const DEFAULT_AMMO: u8 = 6;

// ── Spatial types ───────────────────────────────────────────────────

/// A world-space position.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    /// Construct a position from its components.
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

// ── Hit zones ───────────────────────────────────────────────────────

/// Categorical body zone struck by a shot.
///
/// Damage is assigned per category (vital > torso > extremity); there is no
/// numeric hit position on the wire. The server re-validates every claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HitZone {
    /// Head / heart — a finishing hit.
    Vital,
    /// Center of mass.
    Torso,
    /// Arms and legs.
    Extremity,
}

impl HitZone {
    /// Damage claimed for a hit in this zone.
    pub fn damage(self) -> u16 {
        match self {
            HitZone::Vital => 100,
            HitZone::Torso => 40,
            HitZone::Extremity => 20,
        }
    }
}

// ── Participant state ───────────────────────────────────────────────

/// A remote participant's state as carried by roster messages.
///
/// This is the wire shape; the client caches it as a last-known snapshot in
/// [`SessionRoster`](crate::session::SessionRoster) — it is not guaranteed
/// current.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantState {
    pub id: PlayerId,
    pub position: Vec3,
    pub rotation: f32,
    pub health: u16,
    #[serde(default)]
    pub is_aiming: bool,
    #[serde(default)]
    pub is_dying: bool,
}

// ── Messages ────────────────────────────────────────────────────────

/// Message types sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Identify with the server (MUST be the first message after every
    /// connect or reconnect).
    Identify {
        player_name: String,
        /// Cached session token, if any. Invalidated on `auth-failure`.
        #[serde(skip_serializing_if = "Option::is_none")]
        token: Option<String>,
    },
    /// Enter matchmaking for an arena slot.
    JoinQueue { arena_index: u8 },
    /// Signal local readiness after the teleport to the start pose.
    Ready { arena_index: u8 },
    /// Report a claimed hit for server validation. Carries a nonce on the
    /// wire — this is the one command worth replaying if captured.
    ShootClaim {
        opponent_id: PlayerId,
        hit_zone: HitZone,
        damage: u16,
    },
    /// Report a self-detected early-draw violation.
    Penalty,
    /// Broadcast the local participant's canonical state after a forced
    /// reset so remote caches are not left stale.
    StateSync {
        #[serde(skip_serializing_if = "Option::is_none")]
        position: Option<Vec3>,
        health: u16,
        ammo: u8,
    },
}

impl ClientMessage {
    /// Whether this command must carry a single-use nonce on the wire.
    ///
    /// Only claims that could be maliciously replayed if captured need one;
    /// the nonce lets the server reject duplicates.
    pub fn needs_nonce(&self) -> bool {
        matches!(self, ClientMessage::ShootClaim { .. })
    }
}

/// Message types sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Identity accepted; carries the local participant's assigned id.
    Welcome {
        player_id: PlayerId,
        #[serde(skip_serializing_if = "Option::is_none")]
        token: Option<String>,
    },
    /// Matchmaking produced an opponent; begin the duel handshake.
    MatchFound {
        opponent_id: PlayerId,
        start_position: Vec3,
        #[serde(default)]
        start_rotation: f32,
        arena_index: u8,
    },
    /// Both sides are in position; the countdown is imminent.
    ReadySignal,
    /// Countdown running — aiming is forbidden until the draw signal.
    Countdown,
    /// Draw! Aiming and shooting are live (unless a penalty is active).
    Draw,
    /// Authoritative duel outcome.
    #[serde(rename = "result")]
    DuelResult { winner_id: PlayerId },
    /// Authoritative force-reset to a canonical out-of-duel state. Absent
    /// fields fall back to client defaults.
    ForcedReset {
        #[serde(default)]
        position: Option<Vec3>,
        #[serde(default)]
        health: Option<u16>,
        #[serde(default)]
        ammo: Option<u8>,
    },
    /// The cached credential is no longer valid; a full client restart is
    /// required. The connection loop does not reconnect after this.
    AuthFailure { reason: String },
    /// A remote participant entered the world.
    PlayerJoined { player: ParticipantState },
    /// A remote participant's last-known state changed.
    PlayerUpdate { player: ParticipantState },
    /// A remote participant left the world.
    PlayerLeft { id: PlayerId },
    /// Generic server-side error report. Logged and surfaced as an event;
    /// never fatal on its own.
    Error { message: String },
}

// ── Outbound framing ────────────────────────────────────────────────

/// Serialization wrapper that stamps replay-protection metadata onto an
/// outgoing [`ClientMessage`].
///
/// Produced only by the connection loop; the flat layout keeps `seq` and
/// `nonce` siblings of the message's own fields as the server expects.
#[derive(Debug, Serialize)]
pub struct OutboundFrame<'a> {
    #[serde(flatten)]
    pub message: &'a ClientMessage,
    /// Monotonically increasing per-connection sequence number.
    pub seq: u64,
    /// Single-use replay-protection nonce, present only for messages where
    /// [`ClientMessage::needs_nonce`] is true.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<Uuid>,
}
