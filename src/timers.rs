//! Owned registry for every delayed action spawned during a duel.
//!
//! All deferred execution in the client goes through [`TimerRegistry`] — no
//! component schedules a delayed callback anywhere else. That single surface
//! is what makes the bulk-cancel invariant hold: after
//! [`cancel_all`](TimerRegistry::cancel_all) returns, no previously scheduled
//! action from this registry will ever fire, so a stale timer from one duel
//! cannot leak effects into the next one.
//!
//! The registry is driven by the per-frame tick: callers pass `now`
//! explicitly and drain due actions with [`fire_due`](TimerRegistry::fire_due).
//! Nothing here runs asynchronously; actions resume on the caller's thread at
//! the tick where their deadline is first observed to have passed.

use std::time::{Duration, Instant};

/// Opaque handle to a pending timer, usable for targeted cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

#[derive(Debug)]
struct Pending<T> {
    handle: TimerHandle,
    deadline: Instant,
    action: T,
}

/// One-shot timer registry generic over the scheduled action type.
#[derive(Debug)]
pub struct TimerRegistry<T> {
    next_id: u64,
    pending: Vec<Pending<T>>,
}

impl<T> Default for TimerRegistry<T> {
    fn default() -> Self {
        Self {
            next_id: 0,
            pending: Vec::new(),
        }
    }
}

impl<T> TimerRegistry<T> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `action` to fire once `delay` has elapsed past `now`.
    ///
    /// The returned handle deregisters itself when the action fires; it only
    /// needs to be kept if targeted cancellation is wanted.
    pub fn schedule(&mut self, action: T, delay: Duration, now: Instant) -> TimerHandle {
        let handle = TimerHandle(self.next_id);
        self.next_id += 1;
        self.pending.push(Pending {
            handle,
            deadline: now + delay,
            action,
        });
        handle
    }

    /// Cancel a single pending timer. Returns `true` if it was still pending.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        let before = self.pending.len();
        self.pending.retain(|p| p.handle != handle);
        self.pending.len() != before
    }

    /// Synchronously cancel every outstanding timer.
    pub fn cancel_all(&mut self) {
        self.pending.clear();
    }

    /// Remove and return every action whose deadline is at or before `now`,
    /// in deadline order.
    pub fn fire_due(&mut self, now: Instant) -> Vec<T> {
        let mut due: Vec<Pending<T>> = Vec::new();
        let mut remaining: Vec<Pending<T>> = Vec::with_capacity(self.pending.len());
        for p in self.pending.drain(..) {
            if p.deadline <= now {
                due.push(p);
            } else {
                remaining.push(p);
            }
        }
        self.pending = remaining;
        due.sort_by_key(|p| p.deadline);
        due.into_iter().map(|p| p.action).collect()
    }

    /// Number of timers still pending.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// `true` when nothing is scheduled.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
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
    fn fires_only_after_deadline() {
        let now = Instant::now();
        let mut reg = TimerRegistry::new();
        reg.schedule("late", ms(100), now);

        assert!(reg.fire_due(now + ms(50)).is_empty());
        assert_eq!(reg.fire_due(now + ms(100)), vec!["late"]);
        assert!(reg.is_empty());
    }

    #[test]
    fn fired_action_deregisters_itself() {
        let now = Instant::now();
        let mut reg = TimerRegistry::new();
        reg.schedule('a', ms(10), now);

        assert_eq!(reg.fire_due(now + ms(20)), vec!['a']);
        // Firing again must not re-deliver.
        assert!(reg.fire_due(now + ms(40)).is_empty());
    }

    #[test]
    fn fire_due_returns_in_deadline_order() {
        let now = Instant::now();
        let mut reg = TimerRegistry::new();
        reg.schedule("second", ms(20), now);
        reg.schedule("first", ms(10), now);
        reg.schedule("third", ms(30), now);

        assert_eq!(
            reg.fire_due(now + ms(30)),
            vec!["first", "second", "third"]
        );
    }

    #[test]
    fn cancel_all_prevents_every_pending_action() {
        let now = Instant::now();
        let mut reg = TimerRegistry::new();
        reg.schedule(1, ms(10), now);
        reg.schedule(2, ms(20), now);
        reg.schedule(3, ms(30), now);

        reg.cancel_all();

        assert_eq!(reg.pending_count(), 0);
        // Even far past every original deadline, nothing fires.
        assert!(reg.fire_due(now + ms(1000)).is_empty());
    }

    #[test]
    fn targeted_cancel_leaves_others_pending() {
        let now = Instant::now();
        let mut reg = TimerRegistry::new();
        let keep = reg.schedule("keep", ms(10), now);
        let drop = reg.schedule("drop", ms(10), now);

        assert!(reg.cancel(drop));
        assert!(!reg.cancel(drop));
        let _ = keep;

        assert_eq!(reg.fire_due(now + ms(10)), vec!["keep"]);
    }

    #[test]
    fn schedule_after_cancel_all_is_independent() {
        let now = Instant::now();
        let mut reg = TimerRegistry::new();
        reg.schedule("old", ms(10), now);
        reg.cancel_all();

        reg.schedule("new", ms(10), now);
        assert_eq!(reg.fire_due(now + ms(10)), vec!["new"]);
    }
}
