use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque ID types for type safety
pub type GameId = String;
pub type RoundId = String;
pub type CategoryId = String;
pub type AnswerId = String;
pub type PlayerId = String;
pub type PlayerAnswerId = String;
pub type SessionId = String;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameStatus {
    Draft,
    Ready,
    Playing,
    Completed,
}

impl GameStatus {
    /// Whether gameplay has begun (presence rules differ from the lobby)
    pub fn is_started(self) -> bool {
        matches!(self, GameStatus::Playing | GameStatus::Completed)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoundStatus {
    Pending,
    Intro,
    Collecting,
    Revealing,
    Friction,
    Scoring,
    Complete,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TimerMode {
    Countdown,
    Countup,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameConfig {
    pub top_answers_count: u32,
    pub friction_penalty: i32,
    pub not_on_list_penalty: i32,
    pub double_multiplier: i32,
    pub doubles_per_player: u32,
    pub max_answers_per_category: u32,
    pub rounds_per_player: u32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            top_answers_count: 10,
            friction_penalty: -5,
            not_on_list_penalty: -3,
            double_multiplier: 2,
            doubles_per_player: 1,
            max_answers_per_category: 15,
            rounds_per_player: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Game {
    pub id: GameId,
    pub name: String,
    /// Bumped on every committed mutation; observers order snapshots by it
    pub version: u64,
    pub status: GameStatus,
    pub current_round: u32,
    pub total_rounds: u32,
    pub config: GameConfig,
    pub timer_running: bool,
    pub timer_started_at: Option<DateTime<Utc>>,
    pub show_rules: bool,
    pub join_code: String,
    /// Seconds the first player gets to think (countdown)
    pub thinking_time: u32,
    pub created_at: DateTime<Utc>,
}

impl Game {
    pub fn start_timer(&mut self, now: DateTime<Utc>) {
        self.timer_running = true;
        self.timer_started_at = Some(now);
    }

    pub fn stop_timer(&mut self) {
        self.timer_running = false;
        self.timer_started_at = None;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Round {
    pub id: RoundId,
    pub game_id: GameId,
    pub category_id: Option<CategoryId>,
    pub round_number: u32,
    pub status: RoundStatus,
    /// 0 = intro slide, N = Nth answer revealed
    pub current_slide: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    #[serde(default)]
    pub played: bool,
    #[serde(default)]
    pub played_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub id: AnswerId,
    pub category_id: CategoryId,
    pub position: u32,
    pub text: String,
    /// Alternate spelling or presentation text, matched as a second name
    #[serde(default)]
    pub display_text: Option<String>,
    #[serde(default)]
    pub stat: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub game_id: GameId,
    pub name: String,
    pub color: String,
    pub total_score: i32,
    pub doubles_used: u32,
    pub position: u32,
    pub removed: bool,
    pub created_at: DateTime<Utc>,
}

impl Player {
    pub fn doubles_remaining(&self, config: &GameConfig) -> u32 {
        config.doubles_per_player.saturating_sub(self.doubles_used)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerAnswer {
    pub id: PlayerAnswerId,
    pub round_id: RoundId,
    pub player_id: PlayerId,
    /// None = "not on list"
    pub answer_id: Option<AnswerId>,
    pub submitted_text: String,
    pub points_awarded: i32,
    pub was_doubled: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerSession {
    pub id: SessionId,
    pub player_id: PlayerId,
    pub token: String,
    pub device: String,
    pub last_seen_at: DateTime<Utc>,
    /// Set once a newer session replaced this one; a retired token stays dead
    #[serde(default)]
    pub retired_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Gm,
    Presentation,
    Player,
}
