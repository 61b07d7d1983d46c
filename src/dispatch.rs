//! Multi-subscriber event dispatch.
//!
//! The original single-subscriber callback model (one handler slot per
//! message kind, later registrations silently overwriting earlier ones)
//! forced consumers to capture and chain the previous handler by hand.
//! [`Dispatcher`] replaces it with an observer list: any number of handlers
//! may subscribe to a kind, and all of them see every matching event in
//! registration order.
//!
//! The dispatcher is synchronous and runs on the caller's thread — typically
//! the game tick that drains the connection's event receiver:
//!
//! ```rust,ignore
//! let mut dispatcher = Dispatcher::new();
//! dispatcher.subscribe(EventKind::Draw, |_| println!("draw!"));
//! dispatcher.subscribe_all(|ev| tracing::debug!(?ev, "event"));
//!
//! while let Ok(event) = events.try_recv() {
//!     dispatcher.dispatch(&event);
//! }
//! ```

use std::collections::HashMap;

use crate::event::{EventKind, QuickDrawEvent};

type Handler = Box<dyn FnMut(&QuickDrawEvent) + Send>;

/// Routes [`QuickDrawEvent`]s to every handler subscribed to their kind.
#[derive(Default)]
pub struct Dispatcher {
    by_kind: HashMap<EventKind, Vec<Handler>>,
    catch_all: Vec<Handler>,
}

impl Dispatcher {
    /// Create an empty dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a handler to one event kind.
    ///
    /// Handlers for the same kind run in registration order. Subscribing
    /// never replaces a previously registered handler.
    pub fn subscribe<F>(&mut self, kind: EventKind, handler: F)
    where
        F: FnMut(&QuickDrawEvent) + Send + 'static,
    {
        self.by_kind
            .entry(kind)
            .or_default()
            .push(Box::new(handler));
    }

    /// Subscribe a handler to every event, regardless of kind.
    ///
    /// Catch-all handlers run after the kind-specific handlers.
    pub fn subscribe_all<F>(&mut self, handler: F)
    where
        F: FnMut(&QuickDrawEvent) + Send + 'static,
    {
        self.catch_all.push(Box::new(handler));
    }

    /// Deliver an event to every matching handler.
    pub fn dispatch(&mut self, event: &QuickDrawEvent) {
        if let Some(handlers) = self.by_kind.get_mut(&event.kind()) {
            for handler in handlers.iter_mut() {
                handler(event);
            }
        }
        for handler in self.catch_all.iter_mut() {
            handler(event);
        }
    }

    /// Number of handlers subscribed to a kind (excluding catch-all).
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.by_kind.get(&kind).map_or(0, Vec::len)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("kinds", &self.by_kind.len())
            .field("catch_all", &self.catch_all.len())
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
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn two_subscribers_both_receive() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let mut dispatcher = Dispatcher::new();
        let a = Arc::clone(&first);
        dispatcher.subscribe(EventKind::Draw, move |_| {
            a.fetch_add(1, Ordering::Relaxed);
        });
        let b = Arc::clone(&second);
        dispatcher.subscribe(EventKind::Draw, move |_| {
            b.fetch_add(1, Ordering::Relaxed);
        });

        dispatcher.dispatch(&QuickDrawEvent::Draw);

        assert_eq!(first.load(Ordering::Relaxed), 1);
        assert_eq!(second.load(Ordering::Relaxed), 1);
        assert_eq!(dispatcher.subscriber_count(EventKind::Draw), 2);
    }

    #[test]
    fn handlers_only_see_their_kind() {
        let draws = Arc::new(AtomicUsize::new(0));

        let mut dispatcher = Dispatcher::new();
        let d = Arc::clone(&draws);
        dispatcher.subscribe(EventKind::Draw, move |_| {
            d.fetch_add(1, Ordering::Relaxed);
        });

        dispatcher.dispatch(&QuickDrawEvent::Countdown);
        dispatcher.dispatch(&QuickDrawEvent::Draw);
        dispatcher.dispatch(&QuickDrawEvent::ReadySignal);

        assert_eq!(draws.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn catch_all_sees_everything() {
        let total = Arc::new(AtomicUsize::new(0));

        let mut dispatcher = Dispatcher::new();
        let t = Arc::clone(&total);
        dispatcher.subscribe_all(move |_| {
            t.fetch_add(1, Ordering::Relaxed);
        });

        dispatcher.dispatch(&QuickDrawEvent::Connected);
        dispatcher.dispatch(&QuickDrawEvent::Draw);

        assert_eq!(total.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn registration_order_is_preserved() {
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));

        let mut dispatcher = Dispatcher::new();
        for tag in ["first", "second", "third"] {
            let log = Arc::clone(&log);
            dispatcher.subscribe(EventKind::Countdown, move |_| {
                log.lock().unwrap().push(tag);
            });
        }

        dispatcher.dispatch(&QuickDrawEvent::Countdown);

        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn dispatch_with_no_subscribers_is_a_noop() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.dispatch(&QuickDrawEvent::Draw);
        assert_eq!(dispatcher.subscriber_count(EventKind::Draw), 0);
    }
}
