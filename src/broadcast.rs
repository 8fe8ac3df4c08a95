//! Snapshot delivery to observers, plus the background presence sweeper.

use crate::state::snapshot::Snapshot;
use crate::state::AppState;
use crate::types::GameId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 64;

/// One way of getting a snapshot to observers (push channel, poll cache, test recorder)
pub trait SnapshotSink: Send + Sync {
    fn deliver(&self, snapshot: Arc<Snapshot>);
}

/// Per-game broadcast channels for push-capable observers
#[derive(Default)]
pub struct SnapshotHub {
    channels: Mutex<HashMap<GameId, broadcast::Sender<Arc<Snapshot>>>>,
}

impl SnapshotHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender(&self, game_id: &str) -> broadcast::Sender<Arc<Snapshot>> {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels
            .entry(game_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    pub fn subscribe(&self, game_id: &str) -> broadcast::Receiver<Arc<Snapshot>> {
        self.sender(game_id).subscribe()
    }

    pub fn subscriber_count(&self, game_id: &str) -> usize {
        self.sender(game_id).receiver_count()
    }

    /// Forget channels nobody listens to; returns how many were dropped
    pub fn prune_idle(&self) -> usize {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        let before = channels.len();
        channels.retain(|_, tx| tx.receiver_count() > 0);
        before - channels.len()
    }
}

impl SnapshotSink for SnapshotHub {
    fn deliver(&self, snapshot: Arc<Snapshot>) {
        let game_id = snapshot.game_id.clone();
        // No receivers connected is fine; pollers pick the state up on their next fetch
        if self.sender(&game_id).send(snapshot).is_err() {
            tracing::trace!("No live subscribers for game {}", game_id);
        }
    }
}

/// Records every delivered snapshot; handy for asserting one broadcast per mutation
#[derive(Default)]
pub struct RecordingSink {
    delivered: Mutex<Vec<Arc<Snapshot>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.delivered.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl SnapshotSink for RecordingSink {
    fn deliver(&self, snapshot: Arc<Snapshot>) {
        self.delivered
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(snapshot);
    }
}

/// Spawn a background task that notices heartbeat timeouts.
///
/// Devices can vanish without a clean close, so nothing else would ever
/// trigger a refresh. Every `interval` the presence picture of each game is
/// recomputed and, if it changed, the game is refreshed and rebroadcast.
/// Idle per-game bookkeeping is pruned on the same tick.
pub fn spawn_presence_sweeper(state: Arc<AppState>, interval: Duration) {
    tokio::spawn(async move {
        let mut last_seen: HashMap<GameId, Vec<(String, bool)>> = HashMap::new();

        loop {
            tokio::time::sleep(interval).await;

            let games = match state.store.list_games().await {
                Ok(games) => games,
                Err(e) => {
                    tracing::error!("Presence sweep failed to list games: {}", e);
                    continue;
                }
            };

            last_seen.retain(|id, _| games.iter().any(|g| &g.id == id));
            let channels = state.hub.prune_idle();
            let writers = state.prune_idle_writers().await;
            if channels + writers > 0 {
                tracing::debug!(
                    "Pruned {} idle channels and {} idle writer locks",
                    channels,
                    writers
                );
            }

            for game in games {
                let fingerprint = match state.presence_fingerprint(&game.id).await {
                    Ok(f) => f,
                    Err(e) => {
                        tracing::warn!("Presence sweep skipped game {}: {}", game.id, e);
                        continue;
                    }
                };

                let changed = last_seen
                    .get(&game.id)
                    .is_some_and(|previous| *previous != fingerprint);
                last_seen.insert(game.id.clone(), fingerprint);

                if changed {
                    tracing::info!("Presence changed for game {}, refreshing", game.id);
                    if let Err(e) = state.refresh_presence(&game.id).await {
                        tracing::warn!("Presence refresh failed for game {}: {}", game.id, e);
                    }
                }
            }
        }
    });
}
