//! Roster management and device sessions.

use super::{generate_session_token, AppState, Snapshot};
use crate::error::{GameError, GameResult};
use crate::types::*;
use std::sync::Arc;

/// A player bound to a device session, with the snapshot that followed
#[derive(Debug, Clone)]
pub struct JoinedPlayer {
    pub player: Player,
    pub session: PlayerSession,
    pub snapshot: Arc<Snapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatOutcome {
    pub player_id: PlayerId,
    pub game_id: GameId,
    /// The player had timed out and is back; the game needs a rebroadcast
    pub reconnected: bool,
}

fn clean_name(name: &str) -> GameResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(GameError::validation("Player name must not be empty"));
    }
    if name.chars().count() > 32 {
        return Err(GameError::validation("Player name is too long"));
    }
    Ok(name.to_string())
}

impl AppState {
    fn ensure_lobby(game: &Game) -> GameResult<()> {
        if game.status.is_started() {
            return Err(GameError::validation(
                "Players can only join before the game starts",
            ));
        }
        Ok(())
    }

    /// Insert a new player at the end of the turn order
    async fn insert_player(&self, game: &Game, name: &str, color: String) -> GameResult<Player> {
        let name = clean_name(name)?;
        let players = self.store.players_of_game(&game.id).await?;
        if players
            .iter()
            .any(|p| !p.removed && p.name.eq_ignore_ascii_case(&name))
        {
            return Err(GameError::validation(format!(
                "A player named '{}' already exists",
                name
            )));
        }

        let position = players.iter().map(|p| p.position).max().unwrap_or(0) + 1;
        let player = Player {
            id: ulid::Ulid::new().to_string(),
            game_id: game.id.clone(),
            name,
            color,
            total_score: 0,
            doubles_used: 0,
            position,
            removed: false,
            created_at: self.now(),
        };
        self.store.save_player(&player).await?;
        Ok(player)
    }

    async fn issue_session(&self, player: &Player, device: String) -> GameResult<PlayerSession> {
        let now = self.now();
        let session = PlayerSession {
            id: ulid::Ulid::new().to_string(),
            player_id: player.id.clone(),
            token: generate_session_token(),
            device,
            last_seen_at: now,
            retired_at: None,
            created_at: now,
        };
        self.store.save_session(&session).await?;
        Ok(session)
    }

    /// GM seeds a player that no device controls yet
    pub async fn add_player(
        &self,
        game_id: &str,
        name: String,
        color: String,
    ) -> GameResult<(Player, Arc<Snapshot>)> {
        let _writer = self.lock_game(game_id).await;
        let mut game = self.require_game(game_id).await?;
        Self::ensure_lobby(&game)?;

        let player = self.insert_player(&game, &name, color).await?;
        tracing::info!("Game {}: GM added player {}", game_id, player.name);

        self.sync_round_count(&mut game).await?;
        self.commit_game(&mut game).await?;
        let snapshot = self.publish(game_id).await?;
        Ok((player, snapshot))
    }

    /// Soft delete; answer rows stay so totals remain auditable
    pub async fn remove_player(
        &self,
        game_id: &str,
        player_id: &str,
    ) -> GameResult<Arc<Snapshot>> {
        let _writer = self.lock_game(game_id).await;
        let mut game = self.require_game(game_id).await?;
        let mut player = self.require_player(&game, player_id).await?;

        player.removed = true;
        self.store.save_player(&player).await?;
        tracing::info!("Game {}: removed player {}", game_id, player.name);

        self.sync_round_count(&mut game).await?;
        self.commit_game(&mut game).await?;
        self.publish(game_id).await
    }

    /// Set the turn order; `order` must list every remaining player exactly once
    pub async fn reorder_players(
        &self,
        game_id: &str,
        order: Vec<PlayerId>,
    ) -> GameResult<Arc<Snapshot>> {
        let _writer = self.lock_game(game_id).await;
        let mut game = self.require_game(game_id).await?;

        let players: Vec<Player> = self
            .store
            .players_of_game(&game.id)
            .await?
            .into_iter()
            .filter(|p| !p.removed)
            .collect();

        let mut expected: Vec<&str> = players.iter().map(|p| p.id.as_str()).collect();
        let mut given: Vec<&str> = order.iter().map(String::as_str).collect();
        expected.sort_unstable();
        given.sort_unstable();
        if expected != given {
            return Err(GameError::validation(
                "Turn order must list every player exactly once",
            ));
        }

        for (index, id) in order.iter().enumerate() {
            if let Some(player) = players.iter().find(|p| &p.id == id) {
                let mut player = player.clone();
                player.position = index as u32 + 1;
                self.store.save_player(&player).await?;
            }
        }
        tracing::info!("Game {}: turn order updated", game_id);

        self.commit_game(&mut game).await?;
        self.publish(game_id).await
    }

    /// Self-registration from a device with the game's join code
    pub async fn join_game(
        &self,
        join_code: &str,
        name: String,
        color: String,
        device: String,
    ) -> GameResult<JoinedPlayer> {
        let game = self.find_game_by_join_code(join_code).await?;
        let _writer = self.lock_game(&game.id).await;
        let mut game = self.require_game(&game.id).await?;
        Self::ensure_lobby(&game)?;

        let player = self.insert_player(&game, &name, color).await?;
        let session = self.issue_session(&player, device).await?;
        tracing::info!("Game {}: {} joined from a device", game.id, player.name);

        self.sync_round_count(&mut game).await?;
        self.commit_game(&mut game).await?;
        let snapshot = self.publish(&game.id).await?;
        Ok(JoinedPlayer {
            player,
            session,
            snapshot,
        })
    }

    /// A device takes over a GM-created player
    pub async fn claim_player(
        &self,
        game_id: &str,
        player_id: &str,
        device: String,
    ) -> GameResult<JoinedPlayer> {
        let _writer = self.lock_game(game_id).await;
        let game = self.require_game(game_id).await?;
        let player = self.require_player(&game, player_id).await?;
        let sessions = self.store.sessions_of_player(&player.id).await?;
        if !self
            .presence
            .is_available_to_claim(&player, &sessions, self.now())
        {
            return Err(GameError::validation(format!(
                "{} is already controlled by a device",
                player.name
            )));
        }
        self.open_session_locked(game, player, device).await
    }

    /// First session for a player whose previous device is gone
    pub async fn create_session(
        &self,
        player_id: &str,
        device: String,
    ) -> GameResult<JoinedPlayer> {
        let game_id = self.game_of_player(player_id).await?;
        let _writer = self.lock_game(&game_id).await;
        let game = self.require_game(&game_id).await?;
        let player = self.require_player(&game, player_id).await?;

        let sessions = self.store.sessions_of_player(&player.id).await?;
        self.ensure_takeover_allowed(&player, &sessions)?;
        self.open_session_locked(game, player, device).await
    }

    /// A device without a token of the player may only pick it up when nobody
    /// holds it and it is not waiting to be claimed
    fn ensure_takeover_allowed(
        &self,
        player: &Player,
        sessions: &[PlayerSession],
    ) -> GameResult<()> {
        let now = self.now();
        if self.presence.is_available_to_claim(player, sessions, now) {
            return Err(GameError::validation(format!(
                "{} is waiting to be claimed",
                player.name
            )));
        }
        if sessions.iter().any(|s| self.presence.is_live(s, now)) {
            return Err(GameError::validation(format!(
                "{} is connected on another device",
                player.name
            )));
        }
        Ok(())
    }

    /// Retire every earlier session of the player and issue a fresh one.
    ///
    /// `token` is what the reconnecting device still holds; with a current
    /// token of this player the old device is replaced unconditionally.
    pub async fn reconnect(
        &self,
        player_id: &str,
        device: String,
        token: Option<&str>,
    ) -> GameResult<JoinedPlayer> {
        let game_id = self.game_of_player(player_id).await?;
        let _writer = self.lock_game(&game_id).await;
        let game = self.require_game(&game_id).await?;
        let player = self.require_player(&game, player_id).await?;

        let sessions = self.store.sessions_of_player(&player.id).await?;
        let holds_token = token.is_some_and(|t| {
            sessions
                .iter()
                .any(|s| s.token == t && s.retired_at.is_none())
        });
        if !holds_token {
            self.ensure_takeover_allowed(&player, &sessions)?;
        }

        let now = self.now();
        for mut old in sessions.into_iter().filter(|s| s.retired_at.is_none()) {
            old.retired_at = Some(now);
            self.store.save_session(&old).await?;
        }
        tracing::info!("Game {}: {} reconnected", game.id, player.name);
        self.open_session_locked(game, player, device).await
    }

    async fn open_session_locked(
        &self,
        mut game: Game,
        player: Player,
        device: String,
    ) -> GameResult<JoinedPlayer> {
        let session = self.issue_session(&player, device).await?;
        tracing::info!("Game {}: session opened for {}", game.id, player.name);

        self.sync_round_count(&mut game).await?;
        self.commit_game(&mut game).await?;
        let snapshot = self.publish(&game.id).await?;
        Ok(JoinedPlayer {
            player,
            session,
            snapshot,
        })
    }

    async fn game_of_player(&self, player_id: &str) -> GameResult<GameId> {
        self.store
            .load_player(player_id)
            .await?
            .filter(|p| !p.removed)
            .map(|p| p.game_id)
            .ok_or_else(|| GameError::not_found("player", player_id))
    }

    /// The live player behind a device token
    pub async fn player_for_token(&self, token: &str) -> GameResult<Player> {
        let session = self
            .store
            .session_by_token(token)
            .await?
            .filter(|s| s.retired_at.is_none())
            .ok_or_else(|| GameError::not_found("session", "token"))?;
        self.store
            .load_player(&session.player_id)
            .await?
            .filter(|p| !p.removed)
            .ok_or_else(|| GameError::not_found("player", session.player_id))
    }

    /// Keep a session alive. Does not take the writer lock; unknown and
    /// retired tokens yield `None`.
    pub async fn heartbeat(&self, token: &str) -> GameResult<Option<HeartbeatOutcome>> {
        let Some(session) = self
            .store
            .session_by_token(token)
            .await?
            .filter(|s| s.retired_at.is_none())
        else {
            tracing::debug!("Ignoring heartbeat for unknown or retired token");
            return Ok(None);
        };
        let Some(player) = self.store.load_player(&session.player_id).await? else {
            return Ok(None);
        };

        let now = self.now();
        let sessions = self.store.sessions_of_player(&player.id).await?;
        let was_connected = self.presence.is_connected(&player, &sessions, now);

        // a reconnect may have retired the token since it was read
        if self.store.touch_session(token, now).await?.is_none() {
            tracing::debug!("Session of {} was retired mid-heartbeat", player.name);
            return Ok(None);
        }

        let reconnected = !was_connected && !player.removed;
        if reconnected {
            tracing::info!("Game {}: {} is back online", player.game_id, player.name);
        } else {
            tracing::debug!("Heartbeat from {}", player.name);
        }

        Ok(Some(HeartbeatOutcome {
            player_id: player.id,
            game_id: player.game_id,
            reconnected,
        }))
    }

    /// Best-effort goodbye from a closing page
    pub async fn disconnect(&self, token: &str) -> GameResult<Option<Arc<Snapshot>>> {
        let Some(session) = self.store.session_by_token(token).await? else {
            return Ok(None);
        };
        let game_id = match self.game_of_player(&session.player_id).await {
            Ok(id) => id,
            Err(GameError::NotFound { .. }) => {
                tracing::debug!("Ignoring disconnect for a removed player");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        // re-read under the lock so a concurrent reconnect's retirement is not overwritten
        let _writer = self.lock_game(&game_id).await;
        let Some(mut session) = self
            .store
            .session_by_token(token)
            .await?
            .filter(|s| s.retired_at.is_none())
        else {
            return Ok(None);
        };
        session.last_seen_at = self.presence.expired_at(self.now());
        self.store.save_session(&session).await?;
        tracing::info!("Game {}: session {} disconnected", game_id, session.id);

        let mut game = self.require_game(&game_id).await?;
        self.sync_round_count(&mut game).await?;
        self.commit_game(&mut game).await?;
        Ok(Some(self.publish(&game_id).await?))
    }
}
