#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Shared test utilities for Quick Draw Client integration tests.
//!
//! Provides recording collaborators for the duel state machine (a
//! [`RecordingEffects`] side-effect log and a [`SharedSink`] command
//! recorder) plus helper functions for constructing common server message
//! JSON strings and typed messages.

use std::sync::{Arc, Mutex as StdMutex};

use quickdraw_client::duel::{CommandSink, DuelEffects, SoundCue};
use quickdraw_client::protocol::{
    ClientMessage, HitZone, ParticipantState, PlayerId, ServerMessage, Vec3,
};
use quickdraw_client::session::SessionRoster;

// ── Recording effects ───────────────────────────────────────────────

/// One recorded side-effect request from the duel machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    TeleportLocal(Vec3, f32),
    RestoreDefaultSpawn,
    SetDuelCamera(bool),
    SetHealth(u16),
    SetAmmo(u8),
    ShowMessage(String),
    ClearMessage,
    PlaySound(SoundCue),
    HolsterWeapon,
    ShowHitMarker(HitZone),
    ShowResult(bool),
}

/// A [`DuelEffects`] implementation that records every request into a shared
/// log so tests can assert on exactly which effects ran, in order.
#[derive(Debug, Clone, Default)]
pub struct RecordingEffects {
    log: Arc<StdMutex<Vec<Effect>>>,
}

impl RecordingEffects {
    /// Create a recorder plus a shared handle to its log.
    pub fn new() -> (Self, Arc<StdMutex<Vec<Effect>>>) {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let fx = Self {
            log: Arc::clone(&log),
        };
        (fx, log)
    }
}

impl DuelEffects for RecordingEffects {
    fn teleport_local(&mut self, position: Vec3, rotation: f32) {
        self.log
            .lock()
            .unwrap()
            .push(Effect::TeleportLocal(position, rotation));
    }

    fn restore_default_spawn(&mut self) {
        self.log.lock().unwrap().push(Effect::RestoreDefaultSpawn);
    }

    fn set_duel_camera(&mut self, active: bool) {
        self.log.lock().unwrap().push(Effect::SetDuelCamera(active));
    }

    fn set_health(&mut self, health: u16) {
        self.log.lock().unwrap().push(Effect::SetHealth(health));
    }

    fn set_ammo(&mut self, ammo: u8) {
        self.log.lock().unwrap().push(Effect::SetAmmo(ammo));
    }

    fn show_message(&mut self, text: &str) {
        self.log
            .lock()
            .unwrap()
            .push(Effect::ShowMessage(text.to_owned()));
    }

    fn clear_message(&mut self) {
        self.log.lock().unwrap().push(Effect::ClearMessage);
    }

    fn play_sound(&mut self, cue: SoundCue) {
        self.log.lock().unwrap().push(Effect::PlaySound(cue));
    }

    fn holster_weapon(&mut self) {
        self.log.lock().unwrap().push(Effect::HolsterWeapon);
    }

    fn show_hit_marker(&mut self, zone: HitZone) {
        self.log.lock().unwrap().push(Effect::ShowHitMarker(zone));
    }

    fn show_result(&mut self, won: bool) {
        self.log.lock().unwrap().push(Effect::ShowResult(won));
    }
}

// ── Recording command sink ──────────────────────────────────────────

/// A [`CommandSink`] backed by a shared buffer, so tests keep a handle to
/// the commands after the sink moves into the machine.
#[derive(Debug, Clone, Default)]
pub struct SharedSink {
    sent: Arc<StdMutex<Vec<ClientMessage>>>,
}

impl SharedSink {
    /// Create a sink plus a shared handle to its buffer.
    pub fn new() -> (Self, Arc<StdMutex<Vec<ClientMessage>>>) {
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let sink = Self {
            sent: Arc::clone(&sent),
        };
        (sink, sent)
    }
}

impl CommandSink for SharedSink {
    fn send(&mut self, msg: ClientMessage) {
        self.sent.lock().unwrap().push(msg);
    }
}

// ── Typed message helpers ───────────────────────────────────────────

/// Deterministic player id from a small integer.
pub fn pid(n: u128) -> PlayerId {
    uuid::Uuid::from_u128(n)
}

/// A participant snapshot standing at `base` with full health.
pub fn participant_at(id: PlayerId, base: Vec3) -> ParticipantState {
    ParticipantState {
        id,
        position: base,
        rotation: 0.0,
        health: 100,
        is_aiming: false,
        is_dying: false,
    }
}

/// A roster where the local participant is `pid(1)` and `opponent` stands at
/// `base`.
pub fn roster_with_opponent(opponent: PlayerId, base: Vec3) -> SessionRoster {
    let mut roster = SessionRoster::new();
    roster.apply(&ServerMessage::Welcome {
        player_id: pid(1),
        token: None,
    });
    roster.apply(&ServerMessage::PlayerJoined {
        player: participant_at(opponent, base),
    });
    roster
}

/// A `match-found` pairing the local participant with `opponent` in arena 2.
pub fn match_found(opponent: PlayerId) -> ServerMessage {
    ServerMessage::MatchFound {
        opponent_id: opponent,
        start_position: Vec3::new(10.0, 0.0, -4.0),
        start_rotation: 90.0,
        arena_index: 2,
    }
}

/// A `forced-reset` with every field omitted (client defaults apply).
pub fn bare_forced_reset() -> ServerMessage {
    ServerMessage::ForcedReset {
        position: None,
        health: None,
        ammo: None,
    }
}

// ── JSON helper functions ───────────────────────────────────────────

/// Returns the JSON string for a `welcome` server message.
pub fn welcome_json(player_id: PlayerId, token: Option<&str>) -> String {
    serde_json::to_string(&ServerMessage::Welcome {
        player_id,
        token: token.map(Into::into),
    })
    .expect("welcome_json serialization")
}

/// Returns the JSON string for a `match-found` server message.
pub fn match_found_json(opponent_id: PlayerId) -> String {
    serde_json::to_string(&match_found(opponent_id)).expect("match_found_json serialization")
}

/// Returns the JSON string for a `result` server message.
pub fn duel_result_json(winner_id: PlayerId) -> String {
    serde_json::to_string(&ServerMessage::DuelResult { winner_id })
        .expect("duel_result_json serialization")
}

/// Returns the JSON string for an `auth-failure` server message.
pub fn auth_failure_json(reason: &str) -> String {
    serde_json::to_string(&ServerMessage::AuthFailure {
        reason: reason.into(),
    })
    .expect("auth_failure_json serialization")
}

/// Returns the JSON string for a bare `forced-reset` server message.
pub fn forced_reset_json() -> String {
    serde_json::to_string(&bare_forced_reset()).expect("forced_reset_json serialization")
}
