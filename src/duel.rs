//! The duel state machine — the single source of truth for the local
//! participant's duel lifecycle and for "can the local participant currently
//! aim/shoot".
//!
//! [`DuelMachine`] consumes inbound [`ServerMessage`]s, emits commands
//! through a [`CommandSink`], and requests side effects (camera, messages,
//! sounds, health bar) through the [`DuelEffects`] collaborator trait.
//! Collaborators are injected at construction; the machine never reaches
//! into ambient global state. Time is passed explicitly (`now: Instant`)
//! into every call, so all timing behavior is testable with fake clocks.
//!
//! Phase lifecycle:
//!
//! ```text
//! Idle --(join_queue)--> Queued
//! Queued --(server: match-found)--> MatchFound
//! MatchFound --(local: ready sent after fixed delay)--> ReadyWait
//! ReadyWait --(server: countdown)--> Countdown   [aiming disabled]
//! Countdown --(server: draw)--> Draw             [aiming enabled unless penalty]
//! Draw --(server: result)--> Resolved
//! Resolved --(display duration elapses)--> Idle
//! any state --(server: forced-reset)--> Idle     [overrides everything]
//! ```
//!
//! Duplicate phase messages are no-ops: re-entering the current phase never
//! re-runs entry side effects or re-arms timers. The server is authoritative
//! for outcomes — the local hit claim is prediction for immediate feedback
//! only.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::penalty::PenaltyGuard;
use crate::protocol::{
    ClientMessage, HitZone, PlayerId, ServerMessage, Vec3, DEFAULT_AMMO, DEFAULT_HEALTH,
};
use crate::session::SessionRoster;
use crate::timers::{TimerHandle, TimerRegistry};

// ── Constants ───────────────────────────────────────────────────────

/// Delay between entering `MatchFound` and broadcasting local readiness,
/// giving the teleport and camera cut time to settle.
pub const READY_BROADCAST_DELAY: Duration = Duration::from_millis(1500);

/// How long the result screen stays up before the machine returns to `Idle`.
pub const RESULT_DISPLAY_DURATION: Duration = Duration::from_secs(4);

/// How long a transient on-screen message stays up.
pub const MESSAGE_DISPLAY_DURATION: Duration = Duration::from_secs(2);

/// Lateral distance from the target's center beyond which a shot misses.
const HIT_LATERAL_RADIUS: f32 = 0.9;

/// Aim height above the target's base that counts as a vital hit.
const VITAL_MIN_HEIGHT: f32 = 1.4;

/// Aim height above the target's base that counts as a torso hit.
const TORSO_MIN_HEIGHT: f32 = 0.6;

// ── Phase ───────────────────────────────────────────────────────────

/// Discrete state of the duel lifecycle.
///
/// Exactly one phase holds at a time; any code that needs "am I in a duel"
/// is a single match on this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuelPhase {
    /// Not dueling; free roam.
    #[default]
    Idle,
    /// Waiting for the matchmaker to pair us.
    Queued,
    /// Paired; teleported to the start pose, readiness broadcast pending.
    MatchFound,
    /// Readiness sent; waiting for the server to start the countdown.
    ReadyWait,
    /// Countdown running — aiming is a violation.
    Countdown,
    /// Draw signal received; shooting is live.
    Draw,
    /// Outcome displayed; returning to `Idle` shortly.
    Resolved,
}

// ── Collaborator interfaces ─────────────────────────────────────────

/// Sound cues the machine asks the audio collaborator to play.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundCue {
    /// The local revolver firing.
    Gunshot,
    /// The draw signal bell.
    DrawBell,
    /// Early-draw penalty feedback.
    PenaltyBuzzer,
    /// Duel won.
    Victory,
    /// Duel lost.
    Defeat,
}

/// Side effects the machine requests from the rendering/UI/audio layer.
///
/// All methods default to no-ops: a frontend implements the ones it renders,
/// and tests record calls. Collaborators only receive these explicit "do this
/// effect" invocations — they never mutate machine state directly.
pub trait DuelEffects {
    /// Move the local participant to a server-assigned pose.
    fn teleport_local(&mut self, _position: Vec3, _rotation: f32) {}
    /// Hand the local participant back to the default non-duel placement.
    fn restore_default_spawn(&mut self) {}
    /// Switch the duel camera on or off.
    fn set_duel_camera(&mut self, _active: bool) {}
    /// Update the local health display.
    fn set_health(&mut self, _health: u16) {}
    /// Update the local ammo display.
    fn set_ammo(&mut self, _ammo: u8) {}
    /// Show a transient on-screen message.
    fn show_message(&mut self, _text: &str) {}
    /// Clear the on-screen message.
    fn clear_message(&mut self) {}
    /// Play a sound cue.
    fn play_sound(&mut self, _cue: SoundCue) {}
    /// Force any in-progress draw animation back to holstered.
    fn holster_weapon(&mut self) {}
    /// Flash a predicted hit marker. The server's broadcast remains
    /// authoritative and may disagree.
    fn show_hit_marker(&mut self, _zone: HitZone) {}
    /// Show the win/loss screen.
    fn show_result(&mut self, _won: bool) {}
}

/// A [`DuelEffects`] implementation that does nothing. Useful for headless
/// runs and as a placeholder in tests that only observe commands.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEffects;

impl DuelEffects for NoopEffects {}

/// Outbound command sink the machine writes to.
///
/// The connection handle implements this by queueing to its background loop
/// (which stamps sequence numbers and nonces); tests implement it with a
/// recording buffer.
pub trait CommandSink {
    /// Queue one command for delivery. Delivery failures are the
    /// connection's concern, not the state machine's.
    fn send(&mut self, msg: ClientMessage);
}

impl CommandSink for Vec<ClientMessage> {
    fn send(&mut self, msg: ClientMessage) {
        self.push(msg);
    }
}

// ── Timer actions ───────────────────────────────────────────────────

/// Deferred actions the machine schedules on its timer registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DuelTimer {
    /// Broadcast local readiness after the match-found settle delay.
    SendReady,
    /// Expire the current on-screen message.
    ClearMessage,
    /// Tear down the result screen and return to `Idle`.
    ResultExpired,
}

// ── Hit resolution ──────────────────────────────────────────────────

/// Classify which zone of a target standing at `target_base` an aim point
/// strikes, or `None` for a miss.
///
/// The target's snapshot position is its base (feet); vertical bands above
/// it select the zone. This reads a single last-known snapshot — there is no
/// fallback scavenging across other caches.
pub fn resolve_hit_zone(aim: Vec3, target_base: Vec3) -> Option<HitZone> {
    let dx = aim.x - target_base.x;
    let dz = aim.z - target_base.z;
    if (dx * dx + dz * dz).sqrt() > HIT_LATERAL_RADIUS {
        return None;
    }
    let height = aim.y - target_base.y;
    if height >= VITAL_MIN_HEIGHT {
        Some(HitZone::Vital)
    } else if height >= TORSO_MIN_HEIGHT {
        Some(HitZone::Torso)
    } else if height >= 0.0 {
        Some(HitZone::Extremity)
    } else {
        None
    }
}

// ── State machine ───────────────────────────────────────────────────

/// Client-side duel lifecycle owner.
///
/// Owns the [`DuelPhase`], the [`PenaltyGuard`], and the timer registry.
/// The [`SessionRoster`] is owned by the caller and passed in by reference
/// where needed — the roster is mutated by transport callbacks and only read
/// here (single-threaded, same tick discipline).
pub struct DuelMachine<F: DuelEffects, S: CommandSink> {
    fx: F,
    out: S,
    phase: DuelPhase,
    opponent_id: Option<PlayerId>,
    arena_index: Option<u8>,
    /// Diagnostics only; never used for correctness.
    started_at: Option<Instant>,
    can_aim: bool,
    local_aiming: bool,
    health: u16,
    ammo: u8,
    penalty: PenaltyGuard,
    timers: TimerRegistry<DuelTimer>,
    message_timer: Option<TimerHandle>,
}

impl<F: DuelEffects, S: CommandSink> DuelMachine<F, S> {
    /// Create an idle machine wired to its collaborators.
    pub fn new(fx: F, out: S) -> Self {
        Self {
            fx,
            out,
            phase: DuelPhase::Idle,
            opponent_id: None,
            arena_index: None,
            started_at: None,
            can_aim: true,
            local_aiming: false,
            health: DEFAULT_HEALTH,
            ammo: DEFAULT_AMMO,
            penalty: PenaltyGuard::new(),
            timers: TimerRegistry::new(),
            message_timer: None,
        }
    }

    // ── Accessors ───────────────────────────────────────────────────

    /// Current phase.
    pub fn phase(&self) -> DuelPhase {
        self.phase
    }

    /// Paired opponent, if any. `Idle` implies `None`.
    pub fn opponent_id(&self) -> Option<PlayerId> {
        self.opponent_id
    }

    /// Whether the local participant may aim/shoot right now.
    pub fn can_aim(&self) -> bool {
        self.can_aim
    }

    /// Local health as tracked client-side.
    pub fn health(&self) -> u16 {
        self.health
    }

    /// Rounds left in the local revolver.
    pub fn ammo(&self) -> u8 {
        self.ammo
    }

    /// Whether the early-draw penalty lock is active at `now`.
    pub fn penalty_active(&self, now: Instant) -> bool {
        self.penalty.is_active(now)
    }

    /// Number of timers still pending in the registry.
    pub fn pending_timers(&self) -> usize {
        self.timers.pending_count()
    }

    // ── Local actions ───────────────────────────────────────────────

    /// Enter matchmaking for an arena slot. Only meaningful from `Idle`;
    /// returns whether the queue command was sent.
    pub fn join_queue(&mut self, arena_index: u8) -> bool {
        if self.phase != DuelPhase::Idle {
            debug!(phase = ?self.phase, "join_queue ignored outside Idle");
            return false;
        }
        info!(arena_index, "joining duel queue");
        self.phase = DuelPhase::Queued;
        self.out.send(ClientMessage::JoinQueue { arena_index });
        true
    }

    /// Report the local aim input. Raising the weapon during `Countdown` is
    /// an early-draw violation and triggers the penalty lock.
    pub fn set_local_aiming(&mut self, aiming: bool, now: Instant) {
        let was_aiming = self.local_aiming;
        self.local_aiming = aiming;
        if aiming && !was_aiming && self.phase == DuelPhase::Countdown {
            self.punish_early_draw(now);
        }
    }

    /// Attempt to fire at `aim`. Returns whether a shot actually went off.
    ///
    /// Rejection here is a UX guard only, not a security boundary: the
    /// server independently re-validates every claim. A shot during
    /// `Countdown` counts as an early-draw violation.
    pub fn try_shoot(&mut self, aim: Vec3, now: Instant, roster: &SessionRoster) -> bool {
        if self.phase == DuelPhase::Countdown {
            self.punish_early_draw(now);
            return false;
        }
        if self.phase != DuelPhase::Draw || !self.can_aim {
            debug!(phase = ?self.phase, can_aim = self.can_aim, "shot rejected locally");
            return false;
        }
        if self.ammo == 0 {
            debug!("shot rejected: empty");
            return false;
        }

        self.ammo -= 1;
        self.fx.set_ammo(self.ammo);
        self.fx.play_sound(SoundCue::Gunshot);

        let Some(opponent) = self.opponent_id else {
            return true;
        };
        let Some(snapshot) = roster.get(opponent) else {
            // No last-known snapshot for the opponent: the shot happened but
            // there is nothing to claim against.
            warn!(%opponent, "no snapshot for opponent, shot unclaimed");
            return true;
        };

        if let Some(zone) = resolve_hit_zone(aim, snapshot.position) {
            debug!(?zone, %opponent, "predicted hit, sending claim");
            self.fx.show_hit_marker(zone);
            self.out.send(ClientMessage::ShootClaim {
                opponent_id: opponent,
                hit_zone: zone,
                damage: zone.damage(),
            });
        }
        true
    }

    // ── Inbound messages ────────────────────────────────────────────

    /// Process one inbound server message. Roster messages are handled by
    /// [`SessionRoster::apply`] and ignored here.
    pub fn handle_message(&mut self, msg: &ServerMessage, now: Instant, roster: &SessionRoster) {
        match msg {
            ServerMessage::MatchFound {
                opponent_id,
                start_position,
                start_rotation,
                arena_index,
            } => self.on_match_found(*opponent_id, *start_position, *start_rotation, *arena_index, now),
            ServerMessage::ReadySignal => self.on_ready_signal(now),
            ServerMessage::Countdown => self.on_countdown(now),
            ServerMessage::Draw => self.on_draw(now),
            ServerMessage::DuelResult { winner_id } => self.on_result(*winner_id, now, roster),
            ServerMessage::ForcedReset {
                position,
                health,
                ammo,
            } => self.apply_forced_reset(*position, *health, *ammo),
            ServerMessage::Welcome { .. }
            | ServerMessage::PlayerJoined { .. }
            | ServerMessage::PlayerUpdate { .. }
            | ServerMessage::PlayerLeft { .. } => {}
            ServerMessage::Error { message } => {
                warn!(%message, "server error report");
            }
            ServerMessage::AuthFailure { reason } => {
                // Connection-level fatality; the loop already stopped. Nothing
                // for the duel lifecycle to do.
                warn!(%reason, "authentication failure reported");
            }
        }
    }

    /// Per-frame update: fire due timers, then apply the penalty override.
    ///
    /// The penalty check runs after all transition logic for the tick and
    /// unconditionally wins, so a `draw` processed earlier in the same tick
    /// cannot unlock aiming while the lock runs.
    pub fn tick(&mut self, now: Instant) {
        for timer in self.timers.fire_due(now) {
            match timer {
                DuelTimer::SendReady => self.broadcast_ready(),
                DuelTimer::ClearMessage => {
                    self.message_timer = None;
                    self.fx.clear_message();
                }
                DuelTimer::ResultExpired => {
                    if self.phase == DuelPhase::Resolved {
                        self.finish_duel();
                    }
                }
            }
        }

        // Holding aim anywhere inside the countdown is a violation, not just
        // raising it there. The inactive-penalty guard keeps a held weapon
        // from re-extending the lock every tick.
        if self.phase == DuelPhase::Countdown && self.local_aiming && !self.penalty.is_active(now) {
            self.punish_early_draw(now);
        }

        if self.penalty.is_active(now) {
            self.can_aim = false;
        } else {
            if self.penalty.expire_if_due(now) {
                debug!("penalty elapsed");
            }
            self.can_aim = matches!(self.phase, DuelPhase::Idle | DuelPhase::Draw);
        }
    }

    // ── Transition handlers ─────────────────────────────────────────

    fn on_match_found(
        &mut self,
        opponent_id: PlayerId,
        start_position: Vec3,
        start_rotation: f32,
        arena_index: u8,
        now: Instant,
    ) {
        if self.phase == DuelPhase::MatchFound && self.opponent_id == Some(opponent_id) {
            debug!(%opponent_id, "duplicate match-found ignored");
            return;
        }

        info!(%opponent_id, arena_index, "match found");

        // Guard against leftovers from an aborted previous duel.
        self.timers.cancel_all();
        self.message_timer = None;

        self.phase = DuelPhase::MatchFound;
        self.opponent_id = Some(opponent_id);
        self.arena_index = Some(arena_index);
        self.started_at = Some(now);
        self.health = DEFAULT_HEALTH;
        self.ammo = DEFAULT_AMMO;
        // A penalty already running is independent of the new duel and
        // survives into it; only its own expiry or a forced reset ends it.
        self.can_aim = false;

        self.fx.set_health(self.health);
        self.fx.set_ammo(self.ammo);
        self.fx.teleport_local(start_position, start_rotation);
        self.fx.set_duel_camera(true);
        self.show_message("Opponent found. Take your position.", now);

        self.timers
            .schedule(DuelTimer::SendReady, READY_BROADCAST_DELAY, now);
    }

    fn on_ready_signal(&mut self, now: Instant) {
        match self.phase {
            DuelPhase::MatchFound => {
                self.phase = DuelPhase::ReadyWait;
                self.show_message("Get ready...", now);
            }
            DuelPhase::ReadyWait => {
                debug!("duplicate ready-signal ignored");
            }
            _ => warn!(phase = ?self.phase, "ready-signal out of phase, ignored"),
        }
    }

    fn on_countdown(&mut self, now: Instant) {
        match self.phase {
            DuelPhase::MatchFound | DuelPhase::ReadyWait => {
                self.phase = DuelPhase::Countdown;
                self.can_aim = false;
                self.show_message("Steady...", now);
                // A weapon raised before the countdown and still up when it
                // starts is an early draw too.
                if self.local_aiming && !self.penalty.is_active(now) {
                    self.punish_early_draw(now);
                }
            }
            DuelPhase::Countdown => {
                debug!("duplicate countdown ignored");
            }
            _ => warn!(phase = ?self.phase, "countdown out of phase, ignored"),
        }
    }

    fn on_draw(&mut self, now: Instant) {
        match self.phase {
            DuelPhase::Countdown => {
                self.phase = DuelPhase::Draw;
                self.fx.play_sound(SoundCue::DrawBell);
                self.show_message("DRAW!", now);
                // The penalty lock survives the draw signal; expiry during a
                // later tick flips aiming back on.
                self.can_aim = !self.penalty.is_active(now);
                if !self.can_aim {
                    debug!("draw entered during penalty, aim stays locked");
                }
            }
            DuelPhase::Draw => {
                debug!("duplicate draw ignored");
            }
            _ => warn!(phase = ?self.phase, "draw out of phase, ignored"),
        }
    }

    fn on_result(&mut self, winner_id: PlayerId, now: Instant, roster: &SessionRoster) {
        if self.phase == DuelPhase::Idle {
            warn!("result received while idle, ignored");
            return;
        }
        if self.phase == DuelPhase::Resolved {
            debug!("duplicate result ignored");
            return;
        }

        // The server-declared winner is the sole source of truth; local hit
        // prediction never decides the outcome.
        let won = roster.is_local(winner_id);
        if let Some(started) = self.started_at {
            debug!(elapsed = ?now.duration_since(started), won, "duel resolved");
        }

        self.phase = DuelPhase::Resolved;
        self.can_aim = false;
        self.fx
            .play_sound(if won { SoundCue::Victory } else { SoundCue::Defeat });
        self.fx.show_result(won);

        self.timers
            .schedule(DuelTimer::ResultExpired, RESULT_DISPLAY_DURATION, now);
    }

    /// The single authoritative path back to a clean `Idle`, usable from any
    /// phase. Idempotent: applying it twice in a row is harmless.
    fn apply_forced_reset(&mut self, position: Option<Vec3>, health: Option<u16>, ammo: Option<u8>) {
        info!(phase = ?self.phase, "forced reset");

        self.timers.cancel_all();
        self.message_timer = None;

        self.phase = DuelPhase::Idle;
        self.opponent_id = None;
        self.arena_index = None;
        self.started_at = None;
        self.penalty.clear();
        self.can_aim = true;
        self.local_aiming = false;
        self.health = health.unwrap_or(DEFAULT_HEALTH);
        self.ammo = ammo.unwrap_or(DEFAULT_AMMO);

        self.fx.set_health(self.health);
        self.fx.set_ammo(self.ammo);
        match position {
            Some(pos) => self.fx.teleport_local(pos, 0.0),
            None => self.fx.restore_default_spawn(),
        }
        self.fx.set_duel_camera(false);
        self.fx.clear_message();

        // Broadcast our canonical state so remote caches are not left stale.
        self.out.send(ClientMessage::StateSync {
            position,
            health: self.health,
            ammo: self.ammo,
        });
    }

    // ── Internal helpers ────────────────────────────────────────────

    fn punish_early_draw(&mut self, now: Instant) {
        let until = self.penalty.trigger(now);
        debug!(?until, "early draw, penalty lock set");
        self.can_aim = false;
        self.fx.holster_weapon();
        self.fx.play_sound(SoundCue::PenaltyBuzzer);
        self.show_message("Too eager! Wait for the draw.", now);
        self.out.send(ClientMessage::Penalty);
    }

    fn broadcast_ready(&mut self) {
        if !matches!(self.phase, DuelPhase::MatchFound | DuelPhase::ReadyWait) {
            return;
        }
        if let Some(arena_index) = self.arena_index {
            debug!(arena_index, "broadcasting readiness");
            self.out.send(ClientMessage::Ready { arena_index });
        }
        if self.phase == DuelPhase::MatchFound {
            self.phase = DuelPhase::ReadyWait;
        }
    }

    fn finish_duel(&mut self) {
        debug!("result screen done, returning to idle");
        self.phase = DuelPhase::Idle;
        self.opponent_id = None;
        self.arena_index = None;
        self.started_at = None;
        self.fx.set_duel_camera(false);
        self.fx.restore_default_spawn();
    }

    /// Show a transient message, replacing any previous one and re-arming
    /// its single expiry timer.
    fn show_message(&mut self, text: &str, now: Instant) {
        if let Some(handle) = self.message_timer.take() {
            self.timers.cancel(handle);
        }
        self.fx.show_message(text);
        self.message_timer =
            Some(self.timers.schedule(DuelTimer::ClearMessage, MESSAGE_DISPLAY_DURATION, now));
    }
}

impl<F: DuelEffects, S: CommandSink> std::fmt::Debug for DuelMachine<F, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuelMachine")
            .field("phase", &self.phase)
            .field("opponent_id", &self.opponent_id)
            .field("can_aim", &self.can_aim)
            .field("pending_timers", &self.timers.pending_count())
            .finish()
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::protocol::ParticipantState;

    fn pid(n: u128) -> PlayerId {
        uuid::Uuid::from_u128(n)
    }

    fn machine() -> DuelMachine<NoopEffects, Vec<ClientMessage>> {
        DuelMachine::new(NoopEffects, Vec::new())
    }

    fn roster_with_opponent(opponent: PlayerId, base: Vec3) -> SessionRoster {
        let mut roster = SessionRoster::new();
        roster.apply(&ServerMessage::Welcome {
            player_id: pid(1),
            token: None,
        });
        roster.apply(&ServerMessage::PlayerJoined {
            player: ParticipantState {
                id: opponent,
                position: base,
                rotation: 0.0,
                health: 100,
                is_aiming: false,
                is_dying: false,
            },
        });
        roster
    }

    fn match_found(opponent: PlayerId) -> ServerMessage {
        ServerMessage::MatchFound {
            opponent_id: opponent,
            start_position: Vec3::new(1.0, 0.0, 2.0),
            start_rotation: 0.0,
            arena_index: 2,
        }
    }

    // ── Hit resolution ──────────────────────────────────────────────

    #[test]
    fn hit_zone_vertical_bands() {
        let base = Vec3::new(0.0, 0.0, 0.0);
        assert_eq!(
            resolve_hit_zone(Vec3::new(0.0, 1.7, 0.0), base),
            Some(HitZone::Vital)
        );
        assert_eq!(
            resolve_hit_zone(Vec3::new(0.0, 1.0, 0.0), base),
            Some(HitZone::Torso)
        );
        assert_eq!(
            resolve_hit_zone(Vec3::new(0.0, 0.3, 0.0), base),
            Some(HitZone::Extremity)
        );
    }

    #[test]
    fn hit_zone_lateral_miss() {
        let base = Vec3::new(0.0, 0.0, 0.0);
        assert_eq!(resolve_hit_zone(Vec3::new(2.0, 1.0, 0.0), base), None);
        assert_eq!(resolve_hit_zone(Vec3::new(0.0, 1.0, -3.0), base), None);
    }

    #[test]
    fn hit_zone_below_feet_misses() {
        let base = Vec3::new(0.0, 5.0, 0.0);
        assert_eq!(resolve_hit_zone(Vec3::new(0.0, 4.5, 0.0), base), None);
    }

    #[test]
    fn damage_ordering_vital_torso_extremity() {
        assert!(HitZone::Vital.damage() > HitZone::Torso.damage());
        assert!(HitZone::Torso.damage() > HitZone::Extremity.damage());
    }

    // ── Local action gating ─────────────────────────────────────────

    #[test]
    fn join_queue_only_from_idle() {
        let mut m = machine();
        assert!(m.join_queue(2));
        assert_eq!(m.phase(), DuelPhase::Queued);
        assert!(matches!(
            m.out.last(),
            Some(ClientMessage::JoinQueue { arena_index: 2 })
        ));

        // Second attempt while queued is rejected and sends nothing.
        let sent_before = m.out.len();
        assert!(!m.join_queue(2));
        assert_eq!(m.out.len(), sent_before);
    }

    #[test]
    fn shot_during_countdown_is_a_violation() {
        let now = Instant::now();
        let opponent = pid(77);
        let roster = roster_with_opponent(opponent, Vec3::default());

        let mut m = machine();
        m.join_queue(2);
        m.handle_message(&match_found(opponent), now, &roster);
        m.handle_message(&ServerMessage::Countdown, now, &roster);

        assert!(!m.try_shoot(Vec3::new(0.0, 1.0, 0.0), now, &roster));
        assert!(m.penalty_active(now));
        assert!(m
            .out
            .iter()
            .any(|c| matches!(c, ClientMessage::Penalty)));
    }

    #[test]
    fn empty_revolver_rejects_shot() {
        let now = Instant::now();
        let opponent = pid(77);
        let roster = roster_with_opponent(opponent, Vec3::default());

        let mut m = machine();
        m.join_queue(2);
        m.handle_message(&match_found(opponent), now, &roster);
        m.handle_message(&ServerMessage::Countdown, now, &roster);
        m.handle_message(&ServerMessage::Draw, now, &roster);

        for _ in 0..DEFAULT_AMMO {
            assert!(m.try_shoot(Vec3::new(5.0, 1.0, 5.0), now, &roster));
        }
        assert_eq!(m.ammo(), 0);
        assert!(!m.try_shoot(Vec3::new(5.0, 1.0, 5.0), now, &roster));
    }

    #[test]
    fn miss_fires_but_sends_no_claim() {
        let now = Instant::now();
        let opponent = pid(77);
        let roster = roster_with_opponent(opponent, Vec3::default());

        let mut m = machine();
        m.join_queue(2);
        m.handle_message(&match_found(opponent), now, &roster);
        m.handle_message(&ServerMessage::Countdown, now, &roster);
        m.handle_message(&ServerMessage::Draw, now, &roster);

        // Way off target: the shot goes off, ammo drops, no claim is sent.
        assert!(m.try_shoot(Vec3::new(50.0, 1.0, 50.0), now, &roster));
        assert_eq!(m.ammo(), DEFAULT_AMMO - 1);
        assert!(!m
            .out
            .iter()
            .any(|c| matches!(c, ClientMessage::ShootClaim { .. })));
    }

    #[test]
    fn missing_snapshot_leaves_shot_unclaimed() {
        let now = Instant::now();
        let opponent = pid(77);
        // Roster without the opponent.
        let mut roster = SessionRoster::new();
        roster.apply(&ServerMessage::Welcome {
            player_id: pid(1),
            token: None,
        });

        let mut m = machine();
        m.join_queue(2);
        m.handle_message(&match_found(opponent), now, &roster);
        m.handle_message(&ServerMessage::Countdown, now, &roster);
        m.handle_message(&ServerMessage::Draw, now, &roster);

        assert!(m.try_shoot(Vec3::new(0.0, 1.0, 0.0), now, &roster));
        assert!(!m
            .out
            .iter()
            .any(|c| matches!(c, ClientMessage::ShootClaim { .. })));
    }

    #[test]
    fn match_found_resets_health_but_not_penalty() {
        let t0 = Instant::now();
        let opponent = pid(77);
        let roster = roster_with_opponent(opponent, Vec3::default());

        let mut m = machine();
        m.join_queue(2);
        m.handle_message(&match_found(opponent), t0, &roster);
        m.handle_message(&ServerMessage::Countdown, t0, &roster);
        m.set_local_aiming(true, t0);
        assert!(m.penalty_active(t0));

        // A fresh duel starts while the penalty still runs.
        let t1 = t0 + Duration::from_millis(500);
        m.handle_message(
            &ServerMessage::ForcedReset {
                position: None,
                health: None,
                ammo: None,
            },
            t1,
            &roster,
        );
        // Forced reset clears the penalty; now rebuild it mid-duel.
        m.join_queue(2);
        m.handle_message(&match_found(opponent), t1, &roster);
        m.handle_message(&ServerMessage::Countdown, t1, &roster);
        m.set_local_aiming(true, t1);
        let t2 = t1 + Duration::from_millis(200);
        m.handle_message(&match_found(pid(78)), t2, &roster);

        // The in-flight penalty survives the new match-found.
        assert!(m.penalty_active(t2));
        assert_eq!(m.health(), DEFAULT_HEALTH);
    }
}
