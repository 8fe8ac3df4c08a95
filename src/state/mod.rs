mod game;
mod player;
mod round;
mod score;
mod setup;
pub mod snapshot;
mod submission;

pub use player::{HeartbeatOutcome, JoinedPlayer};
pub use snapshot::Snapshot;

use crate::broadcast::{SnapshotHub, SnapshotSink};
use crate::clock::{Clock, SystemClock};
use crate::error::{GameError, GameResult};
use crate::presence::PresenceTracker;
use crate::store::{GameStore, MemoryStore};
use crate::types::*;
use chrono::{DateTime, Utc};
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Safe character set for join codes (excludes 0/O, 1/I/L to avoid confusion)
const CODE_CHARS: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";
const CODE_LENGTH: usize = 5;

const TOKEN_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
const TOKEN_LENGTH: usize = 64;

fn generate_code(alphabet: &[u8], len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| alphabet[rng.random_range(0..alphabet.len())] as char)
        .collect()
}

/// Short code players type to join a game
fn generate_join_code() -> String {
    generate_code(CODE_CHARS, CODE_LENGTH)
}

/// Opaque session token handed to a player device
fn generate_session_token() -> String {
    generate_code(TOKEN_CHARS, TOKEN_LENGTH)
}

/// Shared engine state: storage, time, presence rules and snapshot delivery.
///
/// Every operation takes the game id explicitly, so any number of games can
/// run side by side. Mutations for one game are serialized through that
/// game's writer lock; snapshot reads never take it.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn GameStore>,
    pub clock: Arc<dyn Clock>,
    pub presence: PresenceTracker,
    /// Push channels for WebSocket observers
    pub hub: Arc<SnapshotHub>,
    sinks: Vec<Arc<dyn SnapshotSink>>,
    writers: Arc<Mutex<HashMap<GameId, Arc<Mutex<()>>>>>,
}

impl AppState {
    pub fn new() -> Self {
        Self::with_parts(
            Arc::new(MemoryStore::new()),
            Arc::new(SystemClock),
            PresenceTracker::default(),
        )
    }

    pub fn with_parts(
        store: Arc<dyn GameStore>,
        clock: Arc<dyn Clock>,
        presence: PresenceTracker,
    ) -> Self {
        let hub = Arc::new(SnapshotHub::new());
        Self {
            store,
            clock,
            presence,
            hub: hub.clone(),
            sinks: vec![hub],
            writers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Add another delivery strategy next to the push hub
    pub fn with_sink(mut self, sink: Arc<dyn SnapshotSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Single-writer discipline: hold this for the whole read-modify-write cycle
    pub(crate) async fn lock_game(&self, game_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut writers = self.writers.lock().await;
            writers.entry(game_id.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Drop writer locks nobody holds or waits for; returns how many went
    pub async fn prune_idle_writers(&self) -> usize {
        let mut writers = self.writers.lock().await;
        let before = writers.len();
        // a holder or waiter owns a clone, so a count of one means idle
        writers.retain(|_, lock| Arc::strong_count(lock) > 1);
        before - writers.len()
    }

    pub(crate) async fn require_game(&self, game_id: &str) -> GameResult<Game> {
        self.store
            .load_game(game_id)
            .await?
            .ok_or_else(|| GameError::not_found("game", game_id))
    }

    pub(crate) async fn require_round(&self, game: &Game, number: u32) -> GameResult<Round> {
        self.store
            .rounds_of_game(&game.id)
            .await?
            .into_iter()
            .find(|r| r.round_number == number)
            .ok_or_else(|| GameError::not_found("round", format!("{}#{}", game.id, number)))
    }

    pub(crate) async fn current_round(&self, game: &Game) -> GameResult<Round> {
        self.require_round(game, game.current_round).await
    }

    pub(crate) async fn require_player(&self, game: &Game, player_id: &str) -> GameResult<Player> {
        self.store
            .load_player(player_id)
            .await?
            .filter(|p| p.game_id == game.id && !p.removed)
            .ok_or_else(|| GameError::not_found("player", player_id))
    }

    /// Answers of the round's category in ledger order (empty without a category)
    pub(crate) async fn round_answers(&self, round: &Round) -> GameResult<Vec<Answer>> {
        match &round.category_id {
            Some(id) => Ok(self.store.answers_of_category(id).await?),
            None => Ok(Vec::new()),
        }
    }

    /// All sessions belonging to the given players
    pub(crate) async fn sessions_for(&self, players: &[Player]) -> GameResult<Vec<PlayerSession>> {
        let mut sessions = Vec::new();
        for p in players {
            sessions.extend(self.store.sessions_of_player(&p.id).await?);
        }
        Ok(sessions)
    }

    /// Players counted for turns and round totals under the current status
    pub(crate) async fn active_players(&self, game: &Game) -> GameResult<Vec<Player>> {
        let players = self.store.players_of_game(&game.id).await?;
        let sessions = self.sessions_for(&players).await?;
        let now = self.now();
        Ok(players
            .into_iter()
            .filter(|p| self.presence.is_active(p, &sessions, game.status, now))
            .collect())
    }

    /// Persist a game mutation; every commit bumps the snapshot version
    pub(crate) async fn commit_game(&self, game: &mut Game) -> GameResult<()> {
        game.version += 1;
        self.store.save_game(game).await?;
        Ok(())
    }

    /// Build the snapshot and hand it to every delivery strategy
    pub(crate) async fn publish(&self, game_id: &str) -> GameResult<Arc<Snapshot>> {
        let snapshot = Arc::new(self.build_snapshot(game_id).await?);
        tracing::debug!(
            "Broadcasting snapshot v{} for game {}",
            snapshot.version,
            game_id
        );
        for sink in &self.sinks {
            sink.deliver(snapshot.clone());
        }
        Ok(snapshot)
    }

    /// On-demand refresh for pollers and newly connected observers
    pub async fn current_snapshot(&self, game_id: &str) -> GameResult<Arc<Snapshot>> {
        Ok(Arc::new(self.build_snapshot(game_id).await?))
    }

    /// Connection state per player, used to detect silent timeouts
    pub async fn presence_fingerprint(&self, game_id: &str) -> GameResult<Vec<(PlayerId, bool)>> {
        let game = self.require_game(game_id).await?;
        let players = self.store.players_of_game(&game.id).await?;
        let sessions = self.sessions_for(&players).await?;
        let now = self.now();
        Ok(players
            .iter()
            .filter(|p| !p.removed)
            .map(|p| (p.id.clone(), self.presence.is_connected(p, &sessions, now)))
            .collect())
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
