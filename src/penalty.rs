//! Time-locked penalty for drawing before the signal.
//!
//! [`PenaltyGuard`] enforces that aiming before the draw signal carries a
//! consequence that cannot be shortened by a subsequent legitimate signal.
//! The lock end (`active_until`) only ever moves forward: re-triggering
//! while a penalty is running extends or keeps it, never shortens it.
//!
//! The guard is checked every tick *after* the state machine's own
//! transition logic, so a `draw` signal that arrives mid-penalty does not
//! unlock aiming — the lock runs its full course and the regular tick flips
//! aiming back on once expiry is observed. Only a server forced-reset clears
//! the lock early.

use std::time::{Duration, Instant};

/// Duration of the early-draw penalty lock.
pub const PENALTY_DURATION: Duration = Duration::from_secs(3);

/// Monotonic time lock on the aim/draw action.
#[derive(Debug, Default)]
pub struct PenaltyGuard {
    active_until: Option<Instant>,
}

impl PenaltyGuard {
    /// Create an inactive guard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or extend) the penalty lock from `now`.
    ///
    /// Returns the instant the lock will expire. A trigger that would end
    /// earlier than the lock already in place is ignored, keeping
    /// `active_until` monotonic.
    pub fn trigger(&mut self, now: Instant) -> Instant {
        let proposed = now + PENALTY_DURATION;
        match self.active_until {
            Some(current) if current >= proposed => current,
            _ => {
                self.active_until = Some(proposed);
                proposed
            }
        }
    }

    /// Whether the lock is active at `now`.
    pub fn is_active(&self, now: Instant) -> bool {
        matches!(self.active_until, Some(until) if now < until)
    }

    /// Observe expiry during a tick: drops the lock once `now` has reached
    /// `active_until`. Returns `true` exactly when the lock was dropped this
    /// call.
    pub fn expire_if_due(&mut self, now: Instant) -> bool {
        match self.active_until {
            Some(until) if now >= until => {
                self.active_until = None;
                true
            }
            _ => false,
        }
    }

    /// Unconditionally clear the lock. Reserved for the forced-reset path;
    /// no phase transition calls this.
    pub fn clear(&mut self) {
        self.active_until = None;
    }

    /// The lock's expiry instant, if one is set.
    pub fn active_until(&self) -> Option<Instant> {
        self.active_until
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

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn inactive_by_default() {
        let guard = PenaltyGuard::new();
        assert!(!guard.is_active(Instant::now()));
        assert!(guard.active_until().is_none());
    }

    #[test]
    fn trigger_locks_for_full_duration() {
        let t0 = Instant::now();
        let mut guard = PenaltyGuard::new();
        guard.trigger(t0);

        assert!(guard.is_active(t0));
        assert!(guard.is_active(t0 + PENALTY_DURATION - ms(1)));
        assert!(!guard.is_active(t0 + PENALTY_DURATION));
    }

    #[test]
    fn retrigger_extends_never_shortens() {
        let t0 = Instant::now();
        let mut guard = PenaltyGuard::new();
        let first_until = guard.trigger(t0);

        // A second violation 1s in pushes the lock out to t0+4s.
        let second_until = guard.trigger(t0 + ms(1000));
        assert!(second_until >= t0 + ms(1000) + PENALTY_DURATION);
        assert!(second_until >= first_until);

        // Still locked where the first trigger alone would have expired.
        assert!(guard.is_active(t0 + PENALTY_DURATION + ms(1)));
        assert!(!guard.is_active(t0 + ms(1000) + PENALTY_DURATION));
    }

    #[test]
    fn stale_trigger_cannot_rewind_the_lock() {
        let t0 = Instant::now();
        let mut guard = PenaltyGuard::new();
        let until = guard.trigger(t0 + ms(500));

        // A trigger stamped with an earlier `now` must not pull the lock in.
        let after = guard.trigger(t0);
        assert_eq!(after, until);
        assert_eq!(guard.active_until(), Some(until));
    }

    #[test]
    fn expiry_is_observed_not_event_driven() {
        let t0 = Instant::now();
        let mut guard = PenaltyGuard::new();
        guard.trigger(t0);

        // Before the deadline nothing expires.
        assert!(!guard.expire_if_due(t0 + ms(2999)));
        assert!(guard.active_until().is_some());

        // First tick at/after the deadline drops the lock, exactly once.
        assert!(guard.expire_if_due(t0 + PENALTY_DURATION));
        assert!(!guard.expire_if_due(t0 + PENALTY_DURATION));
        assert!(guard.active_until().is_none());
    }

    #[test]
    fn clear_drops_an_active_lock() {
        let t0 = Instant::now();
        let mut guard = PenaltyGuard::new();
        guard.trigger(t0);

        guard.clear();
        assert!(!guard.is_active(t0 + ms(1)));
    }
}
