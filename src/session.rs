//! Session identity: the local participant's assigned id and the cache of
//! remote participants' last-known state.
//!
//! [`SessionRoster`] is a pure data cache. It is mutated only by inbound
//! roster messages (`welcome`, `player-joined`, `player-update`,
//! `player-left`) and read by the duel state machine — for example to locate
//! the opponent's snapshot for hit resolution. Everything runs on one
//! thread, so the only discipline required is that the roster is never
//! mutated mid-read within the same tick.
//!
//! Snapshots are last-known, not current: a remote peer discovered through an
//! update message gets an entry on first sighting even if no join
//! notification was ever seen.

use std::collections::HashMap;

use tracing::debug;

use crate::protocol::{ParticipantState, PlayerId, ServerMessage};

/// Cached last-known state of one remote participant.
pub type RemoteSnapshot = ParticipantState;

/// Local identity plus the roster of remote participant snapshots.
#[derive(Debug, Default)]
pub struct SessionRoster {
    local_id: Option<PlayerId>,
    remotes: HashMap<PlayerId, RemoteSnapshot>,
}

impl SessionRoster {
    /// Create an empty roster with no assigned identity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an inbound message to the cache. Non-roster messages are
    /// ignored.
    pub fn apply(&mut self, msg: &ServerMessage) {
        match msg {
            ServerMessage::Welcome { player_id, .. } => {
                debug!(%player_id, "roster: local identity assigned");
                self.local_id = Some(*player_id);
            }
            ServerMessage::PlayerJoined { player } => {
                debug!(id = %player.id, "roster: participant joined");
                self.remotes.insert(player.id, player.clone());
            }
            ServerMessage::PlayerUpdate { player } => {
                // First sighting via update creates the entry.
                self.remotes.insert(player.id, player.clone());
            }
            ServerMessage::PlayerLeft { id } => {
                debug!(%id, "roster: participant left");
                self.remotes.remove(id);
            }
            _ => {}
        }
    }

    /// The local participant's assigned id, once the server has sent it.
    pub fn local_id(&self) -> Option<PlayerId> {
        self.local_id
    }

    /// Whether `id` is the local participant.
    pub fn is_local(&self, id: PlayerId) -> bool {
        self.local_id == Some(id)
    }

    /// Last-known snapshot of a remote participant.
    pub fn get(&self, id: PlayerId) -> Option<&RemoteSnapshot> {
        self.remotes.get(&id)
    }

    /// Number of cached remote participants.
    pub fn remote_count(&self) -> usize {
        self.remotes.len()
    }

    /// Iterate over all cached snapshots.
    pub fn iter(&self) -> impl Iterator<Item = &RemoteSnapshot> {
        self.remotes.values()
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
    use crate::protocol::Vec3;

    fn pid(n: u128) -> PlayerId {
        uuid::Uuid::from_u128(n)
    }

    fn participant(id: PlayerId, health: u16) -> ParticipantState {
        ParticipantState {
            id,
            position: Vec3::new(1.0, 0.0, 2.0),
            rotation: 0.0,
            health,
            is_aiming: false,
            is_dying: false,
        }
    }

    #[test]
    fn welcome_assigns_local_identity() {
        let mut roster = SessionRoster::new();
        assert!(roster.local_id().is_none());

        roster.apply(&ServerMessage::Welcome {
            player_id: pid(7),
            token: None,
        });

        assert_eq!(roster.local_id(), Some(pid(7)));
        assert!(roster.is_local(pid(7)));
        assert!(!roster.is_local(pid(8)));
    }

    #[test]
    fn join_creates_snapshot() {
        let mut roster = SessionRoster::new();
        roster.apply(&ServerMessage::PlayerJoined {
            player: participant(pid(1), 100),
        });

        assert_eq!(roster.remote_count(), 1);
        assert_eq!(roster.get(pid(1)).unwrap().health, 100);
    }

    #[test]
    fn update_creates_on_first_sighting_and_mutates_after() {
        let mut roster = SessionRoster::new();

        // No join was ever seen — the update itself creates the entry.
        roster.apply(&ServerMessage::PlayerUpdate {
            player: participant(pid(2), 100),
        });
        assert_eq!(roster.remote_count(), 1);

        roster.apply(&ServerMessage::PlayerUpdate {
            player: participant(pid(2), 60),
        });
        assert_eq!(roster.remote_count(), 1);
        assert_eq!(roster.get(pid(2)).unwrap().health, 60);
    }

    #[test]
    fn leave_removes_snapshot() {
        let mut roster = SessionRoster::new();
        roster.apply(&ServerMessage::PlayerJoined {
            player: participant(pid(3), 100),
        });
        roster.apply(&ServerMessage::PlayerLeft { id: pid(3) });

        assert!(roster.get(pid(3)).is_none());
        assert_eq!(roster.remote_count(), 0);
    }

    #[test]
    fn non_roster_messages_are_ignored() {
        let mut roster = SessionRoster::new();
        roster.apply(&ServerMessage::Countdown);
        roster.apply(&ServerMessage::Draw);

        assert!(roster.local_id().is_none());
        assert_eq!(roster.remote_count(), 0);
    }
}
