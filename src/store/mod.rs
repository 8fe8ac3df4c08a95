//! Storage collaborator the engine reads from and writes through.
//!
//! All writes are last-write-wins: a game only ever has one logical writer,
//! so no compare-and-set primitive is required of implementations.

mod memory;

pub use memory::MemoryStore;

use crate::error::StoreError;
use crate::types::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait GameStore: Send + Sync {
    async fn load_game(&self, id: &str) -> StoreResult<Option<Game>>;
    async fn save_game(&self, game: &Game) -> StoreResult<()>;
    async fn find_game_by_join_code(&self, code: &str) -> StoreResult<Option<Game>>;
    async fn list_games(&self) -> StoreResult<Vec<Game>>;

    async fn save_round(&self, round: &Round) -> StoreResult<()>;
    async fn delete_round(&self, id: &str) -> StoreResult<()>;
    /// Rounds of a game, ordered by round number
    async fn rounds_of_game(&self, game_id: &str) -> StoreResult<Vec<Round>>;

    async fn load_category(&self, id: &str) -> StoreResult<Option<Category>>;
    async fn save_category(&self, category: &Category) -> StoreResult<()>;
    async fn list_categories(&self) -> StoreResult<Vec<Category>>;

    async fn save_answer(&self, answer: &Answer) -> StoreResult<()>;
    /// Answers of a category, ordered by position
    async fn answers_of_category(&self, category_id: &str) -> StoreResult<Vec<Answer>>;

    async fn load_player(&self, id: &str) -> StoreResult<Option<Player>>;
    async fn save_player(&self, player: &Player) -> StoreResult<()>;
    async fn players_of_game(&self, game_id: &str) -> StoreResult<Vec<Player>>;

    async fn save_player_answer(&self, answer: &PlayerAnswer) -> StoreResult<()>;
    async fn delete_player_answer(&self, id: &str) -> StoreResult<()>;
    async fn player_answers_of_round(&self, round_id: &str) -> StoreResult<Vec<PlayerAnswer>>;

    async fn save_session(&self, session: &PlayerSession) -> StoreResult<()>;
    async fn session_by_token(&self, token: &str) -> StoreResult<Option<PlayerSession>>;
    /// Atomically bump `last_seen_at` of a session that is not retired.
    /// Returns the updated session, or `None` for unknown or retired tokens.
    async fn touch_session(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<PlayerSession>>;
    async fn sessions_of_player(&self, player_id: &str) -> StoreResult<Vec<PlayerSession>>;
}
