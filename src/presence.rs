//! Presence classification over session heartbeats.
//!
//! Nothing here is persisted: every flag is recomputed from `last_seen_at`
//! timestamps and the game status whenever someone asks.

use crate::types::{GameStatus, Player, PlayerSession};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Roughly three missed heartbeats at the clients' 5s interval
pub const DEFAULT_TIMEOUT_SECS: i64 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceFlags {
    pub is_gm_created: bool,
    pub is_connected: bool,
    pub is_active: bool,
    pub is_gm_controlled: bool,
    pub is_available_to_claim: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct PresenceTracker {
    timeout: Duration,
}

impl Default for PresenceTracker {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_TIMEOUT_SECS))
    }
}

impl PresenceTracker {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// A timestamp guaranteed to read as stale; used to retire sessions
    pub fn expired_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.timeout - Duration::seconds(1)
    }

    fn own<'a>(
        player: &'a Player,
        sessions: &'a [PlayerSession],
    ) -> impl Iterator<Item = &'a PlayerSession> {
        sessions.iter().filter(move |s| s.player_id == player.id)
    }

    /// Retired sessions never count, however recent their last heartbeat
    pub fn is_live(&self, session: &PlayerSession, now: DateTime<Utc>) -> bool {
        session.retired_at.is_none() && session.last_seen_at > now - self.timeout
    }

    fn has_live_session(
        &self,
        player: &Player,
        sessions: &[PlayerSession],
        now: DateTime<Utc>,
    ) -> bool {
        Self::own(player, sessions).any(|s| self.is_live(s, now))
    }

    /// Seeded by the GM and never claimed from a device
    pub fn is_gm_created(&self, player: &Player, sessions: &[PlayerSession]) -> bool {
        Self::own(player, sessions).next().is_none()
    }

    pub fn is_connected(
        &self,
        player: &Player,
        sessions: &[PlayerSession],
        now: DateTime<Utc>,
    ) -> bool {
        self.is_gm_created(player, sessions) || self.has_live_session(player, sessions, now)
    }

    /// Once play starts, a dropped device keeps its seat (the GM takes over)
    pub fn is_active(
        &self,
        player: &Player,
        sessions: &[PlayerSession],
        status: GameStatus,
        now: DateTime<Utc>,
    ) -> bool {
        if player.removed {
            return false;
        }
        if self.is_gm_created(player, sessions) || status.is_started() {
            return true;
        }
        self.is_connected(player, sessions, now)
    }

    pub fn is_gm_controlled(
        &self,
        player: &Player,
        sessions: &[PlayerSession],
        status: GameStatus,
        now: DateTime<Utc>,
    ) -> bool {
        self.is_gm_created(player, sessions)
            || (status.is_started() && !self.is_connected(player, sessions, now))
    }

    pub fn is_available_to_claim(
        &self,
        player: &Player,
        sessions: &[PlayerSession],
        now: DateTime<Utc>,
    ) -> bool {
        !player.removed
            && self.is_gm_created(player, sessions)
            && !self.has_live_session(player, sessions, now)
    }

    pub fn classify(
        &self,
        player: &Player,
        sessions: &[PlayerSession],
        status: GameStatus,
        now: DateTime<Utc>,
    ) -> PresenceFlags {
        PresenceFlags {
            is_gm_created: self.is_gm_created(player, sessions),
            is_connected: self.is_connected(player, sessions, now),
            is_active: self.is_active(player, sessions, status, now),
            is_gm_controlled: self.is_gm_controlled(player, sessions, status, now),
            is_available_to_claim: self.is_available_to_claim(player, sessions, now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player() -> Player {
        Player {
            id: "p1".to_string(),
            game_id: "g".to_string(),
            name: "Ada".to_string(),
            color: "#ff0000".to_string(),
            total_score: 0,
            doubles_used: 0,
            position: 1,
            removed: false,
            created_at: Utc::now(),
        }
    }

    fn session(last_seen_at: DateTime<Utc>) -> PlayerSession {
        PlayerSession {
            id: "s1".to_string(),
            player_id: "p1".to_string(),
            token: "t".repeat(64),
            device: "phone".to_string(),
            last_seen_at,
            retired_at: None,
            created_at: last_seen_at,
        }
    }

    #[test]
    fn test_gm_created_player_is_always_connected() {
        let tracker = PresenceTracker::default();
        let p = player();
        let now = Utc::now();
        assert!(tracker.is_gm_created(&p, &[]));
        assert!(tracker.is_connected(&p, &[], now));
        assert!(tracker.is_gm_controlled(&p, &[], GameStatus::Draft, now));
        assert!(tracker.is_active(&p, &[], GameStatus::Draft, now));
        assert!(tracker.is_available_to_claim(&p, &[], now));
    }

    #[test]
    fn test_stale_self_registered_player() {
        let tracker = PresenceTracker::default();
        let p = player();
        let now = Utc::now();
        let sessions = [session(now - Duration::seconds(20))];

        assert!(!tracker.is_gm_created(&p, &sessions));
        assert!(!tracker.is_connected(&p, &sessions, now));
        assert!(tracker.is_active(&p, &sessions, GameStatus::Playing, now));
        assert!(tracker.is_gm_controlled(&p, &sessions, GameStatus::Playing, now));
        assert!(!tracker.is_active(&p, &sessions, GameStatus::Draft, now));
        assert!(!tracker.is_gm_controlled(&p, &sessions, GameStatus::Draft, now));
        assert!(!tracker.is_available_to_claim(&p, &sessions, now));
    }

    #[test]
    fn test_fresh_session_is_connected() {
        let tracker = PresenceTracker::default();
        let p = player();
        let now = Utc::now();
        let sessions = [session(now - Duration::seconds(3))];
        let flags = tracker.classify(&p, &sessions, GameStatus::Ready, now);
        assert!(flags.is_connected);
        assert!(flags.is_active);
        assert!(!flags.is_gm_controlled);
    }

    #[test]
    fn test_removed_player_is_never_active() {
        let tracker = PresenceTracker::default();
        let mut p = player();
        p.removed = true;
        let now = Utc::now();
        assert!(!tracker.is_active(&p, &[], GameStatus::Playing, now));
        assert!(!tracker.is_available_to_claim(&p, &[], now));
    }

    #[test]
    fn test_sessions_of_other_players_are_ignored() {
        let tracker = PresenceTracker::default();
        let p = player();
        let now = Utc::now();
        let mut other = session(now);
        other.player_id = "p2".to_string();
        assert!(tracker.is_gm_created(&p, &[other]));
    }

    #[test]
    fn test_expired_at_reads_as_stale() {
        let tracker = PresenceTracker::default();
        let now = Utc::now();
        assert!(!tracker.is_live(&session(tracker.expired_at(now)), now));
    }

    #[test]
    fn test_retired_session_is_not_live() {
        let tracker = PresenceTracker::default();
        let p = player();
        let now = Utc::now();
        let mut retired = session(now);
        retired.retired_at = Some(now);
        assert!(!tracker.is_live(&retired, now));
        assert!(!tracker.is_connected(&p, &[retired], now));
    }
}
