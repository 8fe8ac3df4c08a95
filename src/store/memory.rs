use super::{GameStore, StoreResult};
use crate::types::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-process store backed by one locked map per entity
#[derive(Clone, Default)]
pub struct MemoryStore {
    games: Arc<RwLock<HashMap<GameId, Game>>>,
    rounds: Arc<RwLock<HashMap<RoundId, Round>>>,
    categories: Arc<RwLock<HashMap<CategoryId, Category>>>,
    answers: Arc<RwLock<HashMap<AnswerId, Answer>>>,
    players: Arc<RwLock<HashMap<PlayerId, Player>>>,
    player_answers: Arc<RwLock<HashMap<PlayerAnswerId, PlayerAnswer>>>,
    sessions: Arc<RwLock<HashMap<SessionId, PlayerSession>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GameStore for MemoryStore {
    async fn load_game(&self, id: &str) -> StoreResult<Option<Game>> {
        Ok(self.games.read().await.get(id).cloned())
    }

    async fn save_game(&self, game: &Game) -> StoreResult<()> {
        self.games
            .write()
            .await
            .insert(game.id.clone(), game.clone());
        Ok(())
    }

    async fn find_game_by_join_code(&self, code: &str) -> StoreResult<Option<Game>> {
        Ok(self
            .games
            .read()
            .await
            .values()
            .find(|g| g.join_code.eq_ignore_ascii_case(code))
            .cloned())
    }

    async fn list_games(&self) -> StoreResult<Vec<Game>> {
        let mut games: Vec<_> = self.games.read().await.values().cloned().collect();
        games.sort_by_key(|g| g.created_at);
        Ok(games)
    }

    async fn save_round(&self, round: &Round) -> StoreResult<()> {
        self.rounds
            .write()
            .await
            .insert(round.id.clone(), round.clone());
        Ok(())
    }

    async fn delete_round(&self, id: &str) -> StoreResult<()> {
        self.rounds.write().await.remove(id);
        Ok(())
    }

    async fn rounds_of_game(&self, game_id: &str) -> StoreResult<Vec<Round>> {
        let mut rounds: Vec<_> = self
            .rounds
            .read()
            .await
            .values()
            .filter(|r| r.game_id == game_id)
            .cloned()
            .collect();
        rounds.sort_by_key(|r| r.round_number);
        Ok(rounds)
    }

    async fn load_category(&self, id: &str) -> StoreResult<Option<Category>> {
        Ok(self.categories.read().await.get(id).cloned())
    }

    async fn save_category(&self, category: &Category) -> StoreResult<()> {
        self.categories
            .write()
            .await
            .insert(category.id.clone(), category.clone());
        Ok(())
    }

    async fn list_categories(&self) -> StoreResult<Vec<Category>> {
        let mut categories: Vec<_> = self.categories.read().await.values().cloned().collect();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    async fn save_answer(&self, answer: &Answer) -> StoreResult<()> {
        self.answers
            .write()
            .await
            .insert(answer.id.clone(), answer.clone());
        Ok(())
    }

    async fn answers_of_category(&self, category_id: &str) -> StoreResult<Vec<Answer>> {
        let mut answers: Vec<_> = self
            .answers
            .read()
            .await
            .values()
            .filter(|a| a.category_id == category_id)
            .cloned()
            .collect();
        answers.sort_by_key(|a| a.position);
        Ok(answers)
    }

    async fn load_player(&self, id: &str) -> StoreResult<Option<Player>> {
        Ok(self.players.read().await.get(id).cloned())
    }

    async fn save_player(&self, player: &Player) -> StoreResult<()> {
        self.players
            .write()
            .await
            .insert(player.id.clone(), player.clone());
        Ok(())
    }

    async fn players_of_game(&self, game_id: &str) -> StoreResult<Vec<Player>> {
        let mut players: Vec<_> = self
            .players
            .read()
            .await
            .values()
            .filter(|p| p.game_id == game_id)
            .cloned()
            .collect();
        players.sort_by(|a, b| a.position.cmp(&b.position).then(a.id.cmp(&b.id)));
        Ok(players)
    }

    async fn save_player_answer(&self, answer: &PlayerAnswer) -> StoreResult<()> {
        self.player_answers
            .write()
            .await
            .insert(answer.id.clone(), answer.clone());
        Ok(())
    }

    async fn delete_player_answer(&self, id: &str) -> StoreResult<()> {
        self.player_answers.write().await.remove(id);
        Ok(())
    }

    async fn player_answers_of_round(&self, round_id: &str) -> StoreResult<Vec<PlayerAnswer>> {
        let mut answers: Vec<_> = self
            .player_answers
            .read()
            .await
            .values()
            .filter(|pa| pa.round_id == round_id)
            .cloned()
            .collect();
        answers.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(answers)
    }

    async fn save_session(&self, session: &PlayerSession) -> StoreResult<()> {
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn session_by_token(&self, token: &str) -> StoreResult<Option<PlayerSession>> {
        Ok(self
            .sessions
            .read()
            .await
            .values()
            .find(|s| s.token == token)
            .cloned())
    }

    async fn touch_session(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<PlayerSession>> {
        let mut sessions = self.sessions.write().await;
        Ok(sessions
            .values_mut()
            .find(|s| s.token == token && s.retired_at.is_none())
            .map(|s| {
                s.last_seen_at = now;
                s.clone()
            }))
    }

    async fn sessions_of_player(&self, player_id: &str) -> StoreResult<Vec<PlayerSession>> {
        let mut sessions: Vec<_> = self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| s.player_id == player_id)
            .cloned()
            .collect();
        sessions.sort_by_key(|s| s.created_at);
        Ok(sessions)
    }
}
