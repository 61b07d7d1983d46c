#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! End-to-end duel lifecycle tests driving [`DuelMachine`] with fake time.
//!
//! Every scenario passes explicit `Instant`s, records side effects through
//! [`common::RecordingEffects`], and captures outgoing commands through
//! [`common::SharedSink`] — no sleeping, no real sockets.

mod common;

use std::time::{Duration, Instant};

use common::{
    bare_forced_reset, match_found, pid, roster_with_opponent, Effect, RecordingEffects,
    SharedSink,
};
use quickdraw_client::duel::{
    DuelMachine, DuelPhase, SoundCue, MESSAGE_DISPLAY_DURATION, READY_BROADCAST_DELAY,
    RESULT_DISPLAY_DURATION,
};
use quickdraw_client::penalty::PENALTY_DURATION;
use quickdraw_client::protocol::{
    ClientMessage, HitZone, ServerMessage, Vec3, DEFAULT_AMMO, DEFAULT_HEALTH,
};
use quickdraw_client::session::SessionRoster;

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

type TestMachine = DuelMachine<RecordingEffects, SharedSink>;

fn test_machine() -> (
    TestMachine,
    std::sync::Arc<std::sync::Mutex<Vec<Effect>>>,
    std::sync::Arc<std::sync::Mutex<Vec<ClientMessage>>>,
) {
    let (fx, effects) = RecordingEffects::new();
    let (sink, sent) = SharedSink::new();
    (DuelMachine::new(fx, sink), effects, sent)
}

/// Drive a fresh machine up to the `Draw` phase against `opponent`.
fn machine_at_draw(
    opponent: quickdraw_client::protocol::PlayerId,
    roster: &SessionRoster,
    now: Instant,
) -> (
    TestMachine,
    std::sync::Arc<std::sync::Mutex<Vec<Effect>>>,
    std::sync::Arc<std::sync::Mutex<Vec<ClientMessage>>>,
) {
    let (mut m, effects, sent) = test_machine();
    m.join_queue(2);
    m.handle_message(&match_found(opponent), now, roster);
    m.handle_message(&ServerMessage::Countdown, now, roster);
    m.handle_message(&ServerMessage::Draw, now, roster);
    m.tick(now);
    (m, effects, sent)
}

// ════════════════════════════════════════════════════════════════════
// Happy path
// ════════════════════════════════════════════════════════════════════

#[test]
fn full_duel_happy_path() {
    let t0 = Instant::now();
    let opponent = pid(77);
    let roster = roster_with_opponent(opponent, Vec3::new(0.0, 0.0, 0.0));
    let (mut m, effects, sent) = test_machine();

    // Idle → Queued.
    assert!(m.join_queue(2));
    assert_eq!(m.phase(), DuelPhase::Queued);

    // Queued → MatchFound: teleport, camera, stats reset, aiming locked.
    m.handle_message(&match_found(opponent), t0, &roster);
    assert_eq!(m.phase(), DuelPhase::MatchFound);
    assert_eq!(m.opponent_id(), Some(opponent));
    assert!(!m.can_aim());
    {
        let log = effects.lock().unwrap();
        assert!(log.contains(&Effect::TeleportLocal(Vec3::new(10.0, 0.0, -4.0), 90.0)));
        assert!(log.contains(&Effect::SetDuelCamera(true)));
        assert!(log.contains(&Effect::SetHealth(DEFAULT_HEALTH)));
        assert!(log.contains(&Effect::SetAmmo(DEFAULT_AMMO)));
    }

    // Readiness broadcasts after the settle delay, not before.
    m.tick(t0 + READY_BROADCAST_DELAY - ms(1));
    assert!(!sent
        .lock()
        .unwrap()
        .iter()
        .any(|c| matches!(c, ClientMessage::Ready { .. })));
    m.tick(t0 + READY_BROADCAST_DELAY);
    assert!(sent
        .lock()
        .unwrap()
        .iter()
        .any(|c| matches!(c, ClientMessage::Ready { arena_index: 2 })));
    assert_eq!(m.phase(), DuelPhase::ReadyWait);

    // ReadyWait → Countdown → Draw.
    let t1 = t0 + READY_BROADCAST_DELAY + ms(500);
    m.handle_message(&ServerMessage::Countdown, t1, &roster);
    assert_eq!(m.phase(), DuelPhase::Countdown);
    assert!(!m.can_aim());

    let t2 = t1 + ms(1200);
    m.handle_message(&ServerMessage::Draw, t2, &roster);
    m.tick(t2);
    assert_eq!(m.phase(), DuelPhase::Draw);
    assert!(m.can_aim());
    assert!(effects
        .lock()
        .unwrap()
        .contains(&Effect::PlaySound(SoundCue::DrawBell)));

    // A shot at the opponent's chest claims a torso hit.
    assert!(m.try_shoot(Vec3::new(0.1, 1.0, 0.0), t2 + ms(80), &roster));
    assert_eq!(m.ammo(), DEFAULT_AMMO - 1);
    {
        let commands = sent.lock().unwrap();
        let claim = commands
            .iter()
            .find(|c| matches!(c, ClientMessage::ShootClaim { .. }))
            .expect("shoot claim sent");
        if let ClientMessage::ShootClaim {
            opponent_id,
            hit_zone,
            damage,
        } = claim
        {
            assert_eq!(*opponent_id, opponent);
            assert_eq!(*hit_zone, HitZone::Torso);
            assert_eq!(*damage, 40);
        }
    }
    assert!(effects
        .lock()
        .unwrap()
        .contains(&Effect::ShowHitMarker(HitZone::Torso)));

    // Server declares the local participant the winner.
    let t3 = t2 + ms(200);
    m.handle_message(&ServerMessage::DuelResult { winner_id: pid(1) }, t3, &roster);
    assert_eq!(m.phase(), DuelPhase::Resolved);
    {
        let log = effects.lock().unwrap();
        assert!(log.contains(&Effect::PlaySound(SoundCue::Victory)));
        assert!(log.contains(&Effect::ShowResult(true)));
    }

    // The result screen expires and everything returns to Idle.
    m.tick(t3 + RESULT_DISPLAY_DURATION);
    assert_eq!(m.phase(), DuelPhase::Idle);
    assert!(m.opponent_id().is_none());
    assert!(m.can_aim());
    {
        let log = effects.lock().unwrap();
        assert!(log.contains(&Effect::SetDuelCamera(false)));
        assert!(log.contains(&Effect::RestoreDefaultSpawn));
    }
}

#[test]
fn losing_result_shows_defeat() {
    let t0 = Instant::now();
    let opponent = pid(77);
    let roster = roster_with_opponent(opponent, Vec3::default());
    let (mut m, effects, _sent) = machine_at_draw(opponent, &roster, t0);

    m.handle_message(
        &ServerMessage::DuelResult {
            winner_id: opponent,
        },
        t0 + ms(300),
        &roster,
    );

    assert_eq!(m.phase(), DuelPhase::Resolved);
    let log = effects.lock().unwrap();
    assert!(log.contains(&Effect::PlaySound(SoundCue::Defeat)));
    assert!(log.contains(&Effect::ShowResult(false)));
}

// ════════════════════════════════════════════════════════════════════
// Early-draw penalty
// ════════════════════════════════════════════════════════════════════

#[test]
fn early_draw_during_countdown_locks_aiming_through_the_draw_signal() {
    let t0 = Instant::now();
    let opponent = pid(77);
    let roster = roster_with_opponent(opponent, Vec3::default());
    let (mut m, effects, sent) = test_machine();
    m.join_queue(2);
    m.handle_message(&match_found(opponent), t0, &roster);
    m.handle_message(&ServerMessage::Countdown, t0, &roster);

    // Raising the weapon during the countdown is a violation.
    m.set_local_aiming(true, t0);
    assert!(m.penalty_active(t0));
    {
        let log = effects.lock().unwrap();
        assert!(log.contains(&Effect::HolsterWeapon));
        assert!(log.contains(&Effect::PlaySound(SoundCue::PenaltyBuzzer)));
    }
    assert!(sent
        .lock()
        .unwrap()
        .iter()
        .any(|c| matches!(c, ClientMessage::Penalty)));

    // The draw signal arrives mid-penalty: the phase advances but aiming
    // stays locked for the full penalty duration.
    let t1 = t0 + ms(1000);
    m.handle_message(&ServerMessage::Draw, t1, &roster);
    m.tick(t1);
    assert_eq!(m.phase(), DuelPhase::Draw);
    assert!(!m.can_aim());
    assert!(!m.try_shoot(Vec3::new(0.0, 1.0, 0.0), t1, &roster));

    // Still locked one tick before expiry; unlocked once the lock elapses.
    m.tick(t0 + PENALTY_DURATION - ms(1));
    assert!(!m.can_aim());
    m.tick(t0 + PENALTY_DURATION);
    assert!(m.can_aim());
    assert!(m.try_shoot(Vec3::new(0.0, 1.0, 0.0), t0 + PENALTY_DURATION, &roster));
}

#[test]
fn repeated_violations_extend_the_lock() {
    let t0 = Instant::now();
    let opponent = pid(77);
    let roster = roster_with_opponent(opponent, Vec3::default());
    let (mut m, _effects, _sent) = test_machine();
    m.join_queue(2);
    m.handle_message(&match_found(opponent), t0, &roster);
    m.handle_message(&ServerMessage::Countdown, t0, &roster);

    m.set_local_aiming(true, t0);
    // Lower and raise again one second later: a second violation.
    m.set_local_aiming(false, t0 + ms(1000));
    m.set_local_aiming(true, t0 + ms(1000));

    // Where the first lock alone would have expired, the extended one holds.
    m.tick(t0 + PENALTY_DURATION + ms(500));
    assert!(!m.can_aim());
    assert!(m.penalty_active(t0 + PENALTY_DURATION + ms(500)));

    // The extended lock expires three seconds after the second violation.
    m.handle_message(&ServerMessage::Draw, t0 + ms(1000) + PENALTY_DURATION, &roster);
    m.tick(t0 + ms(1000) + PENALTY_DURATION);
    assert!(m.can_aim());
}

#[test]
fn shot_attempt_during_countdown_counts_as_violation() {
    let t0 = Instant::now();
    let opponent = pid(77);
    let roster = roster_with_opponent(opponent, Vec3::default());
    let (mut m, _effects, sent) = test_machine();
    m.join_queue(2);
    m.handle_message(&match_found(opponent), t0, &roster);
    m.handle_message(&ServerMessage::Countdown, t0, &roster);

    assert!(!m.try_shoot(Vec3::new(0.0, 1.0, 0.0), t0, &roster));
    assert!(m.penalty_active(t0));
    assert!(sent
        .lock()
        .unwrap()
        .iter()
        .any(|c| matches!(c, ClientMessage::Penalty)));
    // The rejected shot consumed no ammo and sent no claim.
    assert_eq!(m.ammo(), DEFAULT_AMMO);
    assert!(!sent
        .lock()
        .unwrap()
        .iter()
        .any(|c| matches!(c, ClientMessage::ShootClaim { .. })));
}

#[test]
fn aim_held_from_match_found_into_countdown_is_punished() {
    let t0 = Instant::now();
    let opponent = pid(77);
    let roster = roster_with_opponent(opponent, Vec3::default());
    let (mut m, effects, sent) = test_machine();
    m.join_queue(2);
    m.handle_message(&match_found(opponent), t0, &roster);

    // Raising the weapon before the countdown is not itself a violation.
    m.set_local_aiming(true, t0);
    assert!(!m.penalty_active(t0));

    // Holding it into the countdown is.
    let t1 = t0 + ms(800);
    m.handle_message(&ServerMessage::Countdown, t1, &roster);
    assert!(m.penalty_active(t1));
    {
        let log = effects.lock().unwrap();
        assert!(log.contains(&Effect::HolsterWeapon));
        assert!(log.contains(&Effect::PlaySound(SoundCue::PenaltyBuzzer)));
    }

    // Ticks while the lock runs do not stack further penalties.
    for n in 1..10 {
        m.tick(t1 + ms(100 * n));
        assert!(!m.can_aim());
    }
    let penalties = sent
        .lock()
        .unwrap()
        .iter()
        .filter(|c| matches!(c, ClientMessage::Penalty))
        .count();
    assert_eq!(penalties, 1);
}

#[test]
fn held_aim_retriggers_once_the_lock_expires_in_countdown() {
    let t0 = Instant::now();
    let opponent = pid(77);
    let roster = roster_with_opponent(opponent, Vec3::default());
    let (mut m, _effects, sent) = test_machine();
    m.join_queue(2);
    m.handle_message(&match_found(opponent), t0, &roster);
    m.handle_message(&ServerMessage::Countdown, t0, &roster);

    m.set_local_aiming(true, t0);
    assert!(m.penalty_active(t0));

    // The weapon never comes down. When the first lock elapses with the
    // countdown still running, the next tick opens a fresh one.
    m.tick(t0 + PENALTY_DURATION);
    assert!(m.penalty_active(t0 + PENALTY_DURATION));
    assert!(!m.can_aim());
    let penalties = sent
        .lock()
        .unwrap()
        .iter()
        .filter(|c| matches!(c, ClientMessage::Penalty))
        .count();
    assert_eq!(penalties, 2);
}

// ════════════════════════════════════════════════════════════════════
// Forced reset
// ════════════════════════════════════════════════════════════════════

#[test]
fn forced_reset_recovers_from_every_phase() {
    let t0 = Instant::now();
    let opponent = pid(77);
    let roster = roster_with_opponent(opponent, Vec3::default());

    // Build the machine up to each phase in turn, then reset it.
    let setups: Vec<Box<dyn Fn(&mut TestMachine)>> = vec![
        // Idle
        Box::new(|_m| {}),
        // Queued
        Box::new(|m| {
            m.join_queue(2);
        }),
        // MatchFound
        Box::new(move |m| {
            m.join_queue(2);
            m.handle_message(&match_found(opponent), t0, &roster_with_opponent(opponent, Vec3::default()));
        }),
        // Countdown
        Box::new(move |m| {
            let r = roster_with_opponent(opponent, Vec3::default());
            m.join_queue(2);
            m.handle_message(&match_found(opponent), t0, &r);
            m.handle_message(&ServerMessage::Countdown, t0, &r);
        }),
        // Draw
        Box::new(move |m| {
            let r = roster_with_opponent(opponent, Vec3::default());
            m.join_queue(2);
            m.handle_message(&match_found(opponent), t0, &r);
            m.handle_message(&ServerMessage::Countdown, t0, &r);
            m.handle_message(&ServerMessage::Draw, t0, &r);
        }),
        // Resolved
        Box::new(move |m| {
            let r = roster_with_opponent(opponent, Vec3::default());
            m.join_queue(2);
            m.handle_message(&match_found(opponent), t0, &r);
            m.handle_message(&ServerMessage::Countdown, t0, &r);
            m.handle_message(&ServerMessage::Draw, t0, &r);
            m.handle_message(&ServerMessage::DuelResult { winner_id: opponent }, t0, &r);
        }),
    ];

    for (i, setup) in setups.iter().enumerate() {
        let (mut m, _effects, sent) = test_machine();
        setup(&mut m);

        m.handle_message(&bare_forced_reset(), t0 + ms(100), &roster);

        assert_eq!(m.phase(), DuelPhase::Idle, "setup {i}");
        assert!(m.opponent_id().is_none(), "setup {i}");
        assert!(m.can_aim(), "setup {i}");
        assert_eq!(m.health(), DEFAULT_HEALTH, "setup {i}");
        assert_eq!(m.ammo(), DEFAULT_AMMO, "setup {i}");
        assert_eq!(m.pending_timers(), 0, "setup {i}");
        // The canonical state is broadcast so remote caches catch up.
        assert!(
            sent.lock()
                .unwrap()
                .iter()
                .any(|c| matches!(c, ClientMessage::StateSync { .. })),
            "setup {i}"
        );
    }
}

#[test]
fn forced_reset_clears_penalty_and_cancels_timers() {
    let t0 = Instant::now();
    let opponent = pid(77);
    let roster = roster_with_opponent(opponent, Vec3::default());
    let (mut m, _effects, sent) = test_machine();
    m.join_queue(2);
    m.handle_message(&match_found(opponent), t0, &roster);
    m.handle_message(&ServerMessage::Countdown, t0, &roster);
    m.set_local_aiming(true, t0);
    assert!(m.penalty_active(t0));

    m.handle_message(&bare_forced_reset(), t0 + ms(500), &roster);

    // The penalty lock is gone immediately, not at its natural expiry.
    assert!(!m.penalty_active(t0 + ms(500)));
    m.tick(t0 + ms(500));
    assert!(m.can_aim());

    // Far past every deadline of the aborted duel, no stale timer fires: no
    // readiness broadcast appears after the reset.
    let before = sent.lock().unwrap().len();
    m.tick(t0 + Duration::from_secs(30));
    assert_eq!(sent.lock().unwrap().len(), before);
    assert!(!sent
        .lock()
        .unwrap()
        .iter()
        .any(|c| matches!(c, ClientMessage::Ready { .. })));
}

#[test]
fn forced_reset_applies_server_overrides() {
    let t0 = Instant::now();
    let opponent = pid(77);
    let roster = roster_with_opponent(opponent, Vec3::default());
    let (mut m, effects, sent) = machine_at_draw(opponent, &roster, t0);

    let spawn = Vec3::new(3.0, 0.0, 8.0);
    m.handle_message(
        &ServerMessage::ForcedReset {
            position: Some(spawn),
            health: Some(55),
            ammo: Some(2),
        },
        t0 + ms(100),
        &roster,
    );

    assert_eq!(m.health(), 55);
    assert_eq!(m.ammo(), 2);
    assert!(effects
        .lock()
        .unwrap()
        .contains(&Effect::TeleportLocal(spawn, 0.0)));

    // The broadcast echoes the canonical values.
    let commands = sent.lock().unwrap();
    let sync = commands
        .iter()
        .find(|c| matches!(c, ClientMessage::StateSync { .. }))
        .expect("state sync sent");
    if let ClientMessage::StateSync {
        position,
        health,
        ammo,
    } = sync
    {
        assert_eq!(*position, Some(spawn));
        assert_eq!(*health, 55);
        assert_eq!(*ammo, 2);
    }
}

#[test]
fn forced_reset_is_idempotent() {
    let t0 = Instant::now();
    let opponent = pid(77);
    let roster = roster_with_opponent(opponent, Vec3::default());
    let (mut m, _effects, _sent) = machine_at_draw(opponent, &roster, t0);

    m.handle_message(&bare_forced_reset(), t0, &roster);
    m.handle_message(&bare_forced_reset(), t0 + ms(10), &roster);

    assert_eq!(m.phase(), DuelPhase::Idle);
    assert!(m.can_aim());
    assert_eq!(m.pending_timers(), 0);
}

// ════════════════════════════════════════════════════════════════════
// Idempotent phase re-entry
// ════════════════════════════════════════════════════════════════════

#[test]
fn duplicate_match_found_does_not_rerun_entry_effects() {
    let t0 = Instant::now();
    let opponent = pid(77);
    let roster = roster_with_opponent(opponent, Vec3::default());
    let (mut m, effects, _sent) = test_machine();
    m.join_queue(2);
    m.handle_message(&match_found(opponent), t0, &roster);

    let effects_before = effects.lock().unwrap().len();
    let timers_before = m.pending_timers();
    m.handle_message(&match_found(opponent), t0 + ms(50), &roster);

    assert_eq!(effects.lock().unwrap().len(), effects_before);
    assert_eq!(m.pending_timers(), timers_before);
}

#[test]
fn duplicate_phase_signals_are_noops() {
    let t0 = Instant::now();
    let opponent = pid(77);
    let roster = roster_with_opponent(opponent, Vec3::default());
    let (mut m, effects, _sent) = test_machine();
    m.join_queue(2);
    m.handle_message(&match_found(opponent), t0, &roster);
    m.handle_message(&ServerMessage::Countdown, t0, &roster);
    m.handle_message(&ServerMessage::Countdown, t0 + ms(10), &roster);
    assert_eq!(m.phase(), DuelPhase::Countdown);

    m.handle_message(&ServerMessage::Draw, t0 + ms(100), &roster);
    let bell_count = |log: &[Effect]| {
        log.iter()
            .filter(|e| **e == Effect::PlaySound(SoundCue::DrawBell))
            .count()
    };
    assert_eq!(bell_count(&effects.lock().unwrap()), 1);

    // A replayed draw signal does not ring the bell twice.
    m.handle_message(&ServerMessage::Draw, t0 + ms(110), &roster);
    assert_eq!(bell_count(&effects.lock().unwrap()), 1);
    assert_eq!(m.phase(), DuelPhase::Draw);
}

#[test]
fn duplicate_result_schedules_one_teardown() {
    let t0 = Instant::now();
    let opponent = pid(77);
    let roster = roster_with_opponent(opponent, Vec3::default());
    let (mut m, effects, _sent) = machine_at_draw(opponent, &roster, t0);

    m.handle_message(&ServerMessage::DuelResult { winner_id: pid(1) }, t0, &roster);
    let timers_after_first = m.pending_timers();
    m.handle_message(&ServerMessage::DuelResult { winner_id: pid(1) }, t0 + ms(5), &roster);

    assert_eq!(m.pending_timers(), timers_after_first);
    let result_count = effects
        .lock()
        .unwrap()
        .iter()
        .filter(|e| matches!(e, Effect::ShowResult(_)))
        .count();
    assert_eq!(result_count, 1);
}

#[test]
fn result_while_idle_is_ignored() {
    let t0 = Instant::now();
    let roster = roster_with_opponent(pid(77), Vec3::default());
    let (mut m, effects, _sent) = test_machine();

    m.handle_message(&ServerMessage::DuelResult { winner_id: pid(1) }, t0, &roster);

    assert_eq!(m.phase(), DuelPhase::Idle);
    assert!(effects.lock().unwrap().is_empty());
}

// ════════════════════════════════════════════════════════════════════
// Transient messages
// ════════════════════════════════════════════════════════════════════

#[test]
fn on_screen_message_expires_after_display_duration() {
    let t0 = Instant::now();
    let opponent = pid(77);
    let roster = roster_with_opponent(opponent, Vec3::default());
    let (mut m, effects, _sent) = test_machine();
    m.join_queue(2);
    m.handle_message(&match_found(opponent), t0, &roster);
    assert!(effects
        .lock()
        .unwrap()
        .iter()
        .any(|e| matches!(e, Effect::ShowMessage(_))));

    m.tick(t0 + MESSAGE_DISPLAY_DURATION);
    assert!(effects.lock().unwrap().contains(&Effect::ClearMessage));
}
