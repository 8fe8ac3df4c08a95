//! The full game document every observer renders from.

use super::AppState;
use crate::error::GameResult;
use crate::presence::PresenceFlags;
use crate::turn::TurnState;
use crate::types::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryInfo {
    pub id: CategoryId,
    pub name: String,
    pub answer_count: usize,
}

/// One player's claim on an answer (or on nothing, for "not on list")
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnswerClaim {
    pub player_id: PlayerId,
    pub name: String,
    pub color: String,
    pub submitted_text: String,
    pub was_doubled: bool,
    pub points_awarded: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RevealedAnswer {
    pub position: u32,
    pub text: String,
    pub display_text: Option<String>,
    pub stat: Option<String>,
    pub points: i32,
    pub is_friction: bool,
    pub claimed_by: Vec<AnswerClaim>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CollectedAnswer {
    pub player_id: PlayerId,
    pub name: String,
    pub color: String,
    pub submitted_text: String,
    pub was_doubled: bool,
    pub points_awarded: i32,
    /// Position of the matched answer, None for "not on list"
    pub matched_position: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerSummary {
    pub id: PlayerId,
    pub name: String,
    pub color: String,
    pub position: u32,
    pub total_score: i32,
    pub doubles_remaining: u32,
    pub has_answered: bool,
    pub presence: PresenceFlags,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    pub game_id: GameId,
    pub version: u64,
    pub server_now: DateTime<Utc>,
    pub name: String,
    pub status: GameStatus,
    pub current_round: u32,
    pub total_rounds: u32,
    pub round_status: Option<RoundStatus>,
    pub current_slide: u32,
    pub category: Option<CategoryInfo>,
    pub timer_running: bool,
    pub timer_started_at: Option<DateTime<Utc>>,
    pub thinking_time: u32,
    pub show_rules: bool,
    pub join_code: String,
    pub setup_complete: bool,
    pub setup_problems: Vec<String>,
    pub revealed_answers: Vec<RevealedAnswer>,
    pub not_on_list: Vec<AnswerClaim>,
    pub collected_answers: Vec<CollectedAnswer>,
    pub turn_order: Vec<PlayerId>,
    pub current_turn_player: Option<PlayerId>,
    pub timer_mode: Option<TimerMode>,
    pub all_answered: bool,
    pub players: Vec<PlayerSummary>,
    pub config: GameConfig,
}

impl Snapshot {
    /// Observers keep `self` over `other` only when it is strictly newer
    pub fn supersedes(&self, other: &Snapshot) -> bool {
        self.game_id == other.game_id && self.version > other.version
    }
}

impl AppState {
    pub(crate) async fn build_snapshot(&self, game_id: &str) -> GameResult<Snapshot> {
        let game = self.require_game(game_id).await?;
        let now = self.now();

        let players: Vec<Player> = self
            .store
            .players_of_game(&game.id)
            .await?
            .into_iter()
            .filter(|p| !p.removed)
            .collect();
        let sessions = self.sessions_for(&players).await?;
        let by_id = |id: &str| players.iter().find(|p| p.id == id);

        let round = if game.current_round > 0 {
            self.store
                .rounds_of_game(&game.id)
                .await?
                .into_iter()
                .find(|r| r.round_number == game.current_round)
        } else {
            None
        };

        let mut category = None;
        let mut revealed_answers = Vec::new();
        let mut not_on_list = Vec::new();
        let mut collected_answers = Vec::new();
        let mut answered = HashSet::new();
        let mut turn = None;

        if let Some(round) = &round {
            let answers = self.round_answers(round).await?;
            let rows = self.store.player_answers_of_round(&round.id).await?;
            answered = rows.iter().map(|pa| pa.player_id.clone()).collect();

            if let Some(id) = &round.category_id {
                if let Some(c) = self.store.load_category(id).await? {
                    category = Some(CategoryInfo {
                        id: c.id,
                        name: c.name,
                        answer_count: answers.len(),
                    });
                }
            }

            let claim = |pa: &PlayerAnswer| {
                by_id(&pa.player_id).map(|p| AnswerClaim {
                    player_id: p.id.clone(),
                    name: p.name.clone(),
                    color: p.color.clone(),
                    submitted_text: pa.submitted_text.clone(),
                    was_doubled: pa.was_doubled,
                    points_awarded: pa.points_awarded,
                })
            };

            revealed_answers = answers
                .iter()
                .filter(|a| a.position <= round.current_slide)
                .map(|a| RevealedAnswer {
                    position: a.position,
                    text: a.text.clone(),
                    display_text: a.display_text.clone(),
                    stat: a.stat.clone(),
                    points: a.points(&game.config),
                    is_friction: a.is_friction(&game.config),
                    claimed_by: rows
                        .iter()
                        .filter(|pa| pa.answer_id.as_deref() == Some(a.id.as_str()))
                        .filter_map(claim)
                        .collect(),
                })
                .collect();

            if matches!(round.status, RoundStatus::Scoring | RoundStatus::Complete) {
                not_on_list = rows
                    .iter()
                    .filter(|pa| pa.answer_id.is_none())
                    .filter_map(claim)
                    .collect();
            }

            if round.status == RoundStatus::Collecting {
                collected_answers = rows
                    .iter()
                    .filter_map(|pa| {
                        let p = by_id(&pa.player_id)?;
                        Some(CollectedAnswer {
                            player_id: p.id.clone(),
                            name: p.name.clone(),
                            color: p.color.clone(),
                            submitted_text: pa.submitted_text.clone(),
                            was_doubled: pa.was_doubled,
                            points_awarded: pa.points_awarded,
                            matched_position: pa.answer_id.as_ref().and_then(|id| {
                                answers.iter().find(|a| &a.id == id).map(|a| a.position)
                            }),
                        })
                    })
                    .collect();
            }

            turn = Some(self.turn_state(&game, round).await?);
        }

        let turn = match turn {
            Some(t) => t,
            None => TurnState {
                order: crate::turn::turn_order(self.active_players(&game).await?.iter()),
                current: None,
                timer_mode: None,
                all_answered: false,
            },
        };

        let summaries = players
            .iter()
            .map(|p| PlayerSummary {
                id: p.id.clone(),
                name: p.name.clone(),
                color: p.color.clone(),
                position: p.position,
                total_score: p.total_score,
                doubles_remaining: p.doubles_remaining(&game.config),
                has_answered: answered.contains(&p.id),
                presence: self.presence.classify(p, &sessions, game.status, now),
            })
            .collect();

        let setup_problems = if game.status.is_started() {
            Vec::new()
        } else {
            self.setup_problems(&game).await?
        };

        Ok(Snapshot {
            game_id: game.id.clone(),
            version: game.version,
            server_now: now,
            name: game.name.clone(),
            status: game.status,
            current_round: game.current_round,
            total_rounds: game.total_rounds,
            round_status: round.as_ref().map(|r| r.status),
            current_slide: round.as_ref().map_or(0, |r| r.current_slide),
            category,
            timer_running: game.timer_running,
            timer_started_at: game.timer_started_at,
            thinking_time: game.thinking_time,
            show_rules: game.show_rules,
            join_code: game.join_code.clone(),
            setup_complete: setup_problems.is_empty(),
            setup_problems,
            revealed_answers,
            not_on_list,
            collected_answers,
            turn_order: turn.order,
            current_turn_player: turn.current,
            timer_mode: turn.timer_mode,
            all_answered: turn.all_answered,
            players: summaries,
            config: game.config,
        })
    }
}
