//! Pre-game setup: round rows, category assignment and configuration.

use super::{AppState, Snapshot};
use crate::error::{GameError, GameResult};
use crate::ledger;
use crate::types::*;
use std::sync::Arc;

fn validate_config(config: &GameConfig) -> GameResult<()> {
    if config.top_answers_count == 0 {
        return Err(GameError::validation("top_answers_count must be at least 1"));
    }
    if config.max_answers_per_category < config.top_answers_count {
        return Err(GameError::validation(
            "max_answers_per_category must not be below top_answers_count",
        ));
    }
    if config.double_multiplier < 1 {
        return Err(GameError::validation("double_multiplier must be at least 1"));
    }
    if config.rounds_per_player == 0 {
        return Err(GameError::validation("rounds_per_player must be at least 1"));
    }
    Ok(())
}

impl AppState {
    /// Everything blocking a start, in round order
    pub(crate) async fn setup_problems(&self, game: &Game) -> GameResult<Vec<String>> {
        let mut problems = Vec::new();
        if game.total_rounds == 0 {
            problems.push("No active players yet".to_string());
            return Ok(problems);
        }

        let rounds = self.store.rounds_of_game(&game.id).await?;
        for n in 1..=game.total_rounds {
            let Some(round) = rounds.iter().find(|r| r.round_number == n) else {
                problems.push(format!("Round {} is missing", n));
                continue;
            };
            let Some(category_id) = &round.category_id else {
                problems.push(format!("Round {} has no category", n));
                continue;
            };
            let answers = self.store.answers_of_category(category_id).await?;
            if !ledger::is_category_complete(&answers, &game.config) {
                problems.push(format!(
                    "Round {} needs {} answers in the top list",
                    n, game.config.top_answers_count
                ));
            }
        }
        Ok(problems)
    }

    pub(crate) async fn ensure_setup_complete(&self, game: &Game) -> GameResult<()> {
        let problems = self.setup_problems(game).await?;
        match problems.first() {
            None => Ok(()),
            Some(first) => Err(GameError::validation(first.clone())),
        }
    }

    /// Keep `total_rounds` and the round rows in line with the active roster.
    ///
    /// Only applies before the game starts. Returns whether the count changed;
    /// a change while Ready drops the game back to Draft.
    pub(crate) async fn sync_round_count(&self, game: &mut Game) -> GameResult<bool> {
        if game.status.is_started() {
            return Ok(false);
        }

        let active = self.active_players(game).await?.len() as u32;
        let total = active * game.config.rounds_per_player;
        let rounds = self.store.rounds_of_game(&game.id).await?;

        for n in 1..=total {
            if rounds.iter().any(|r| r.round_number == n) {
                continue;
            }
            self.store
                .save_round(&Round {
                    id: ulid::Ulid::new().to_string(),
                    game_id: game.id.clone(),
                    category_id: None,
                    round_number: n,
                    status: RoundStatus::Pending,
                    current_slide: 0,
                })
                .await?;
        }
        let mut dropped_answers = 0;
        for extra in rounds.iter().filter(|r| r.round_number > total) {
            for row in self.store.player_answers_of_round(&extra.id).await? {
                self.store.delete_player_answer(&row.id).await?;
                dropped_answers += 1;
            }
            self.store.delete_round(&extra.id).await?;
        }
        // totals must keep summing over the rounds that still exist
        if dropped_answers > 0 {
            tracing::info!(
                "Game {}: dropped {} answers with their rounds",
                game.id,
                dropped_answers
            );
            self.recalculate_all(game).await?;
        }

        let changed = total != game.total_rounds;
        game.total_rounds = total;
        game.current_round = game.current_round.min(total);

        if changed {
            tracing::info!(
                "Game {} now has {} rounds ({} active players)",
                game.id,
                total,
                active
            );
            if game.status == GameStatus::Ready {
                game.status = game.status.transition(GameStatus::Draft)?;
            }
        }
        Ok(changed)
    }

    pub async fn assign_category(
        &self,
        game_id: &str,
        round_number: u32,
        category_id: &str,
    ) -> GameResult<Arc<Snapshot>> {
        let _writer = self.lock_game(game_id).await;
        let mut game = self.require_game(game_id).await?;
        if game.status.is_started() {
            return Err(GameError::validation(
                "Categories can only be changed before the game starts",
            ));
        }

        let mut round = self.require_round(&game, round_number).await?;
        let category = self
            .store
            .load_category(category_id)
            .await?
            .ok_or_else(|| GameError::not_found("category", category_id))?;

        let answers = self.store.answers_of_category(&category.id).await?;
        if !ledger::is_category_complete(&answers, &game.config) {
            return Err(GameError::validation(format!(
                "Category '{}' needs {} answers in the top list",
                category.name, game.config.top_answers_count
            )));
        }
        if answers.len() > game.config.max_answers_per_category as usize {
            return Err(GameError::validation(format!(
                "Category '{}' has more than {} answers",
                category.name, game.config.max_answers_per_category
            )));
        }

        let rounds = self.store.rounds_of_game(&game.id).await?;
        if let Some(other) = rounds.iter().find(|r| {
            r.round_number != round_number && r.category_id.as_deref() == Some(category_id)
        }) {
            return Err(GameError::validation(format!(
                "Category '{}' is already used in round {}",
                category.name, other.round_number
            )));
        }

        round.category_id = Some(category.id.clone());
        self.store.save_round(&round).await?;
        tracing::info!(
            "Game {} round {} uses category '{}'",
            game_id,
            round_number,
            category.name
        );

        self.commit_game(&mut game).await?;
        self.publish(game_id).await
    }

    /// Change the rules before play; any change sends a Ready game back to Draft
    pub async fn update_config(
        &self,
        game_id: &str,
        config: GameConfig,
        thinking_time: u32,
    ) -> GameResult<Arc<Snapshot>> {
        validate_config(&config)?;

        let _writer = self.lock_game(game_id).await;
        let mut game = self.require_game(game_id).await?;
        if game.status.is_started() {
            return Err(GameError::validation(
                "Configuration can only be changed before the game starts",
            ));
        }

        game.config = config;
        game.thinking_time = thinking_time;
        if game.status == GameStatus::Ready {
            game.status = game.status.transition(GameStatus::Draft)?;
        }
        self.sync_round_count(&mut game).await?;

        tracing::info!("Game {} config updated: {:?}", game_id, game.config);
        self.commit_game(&mut game).await?;
        self.publish(game_id).await
    }

    /// Re-evaluate presence-dependent state and rebroadcast
    pub async fn refresh_presence(&self, game_id: &str) -> GameResult<Arc<Snapshot>> {
        let _writer = self.lock_game(game_id).await;
        let mut game = self.require_game(game_id).await?;
        self.sync_round_count(&mut game).await?;
        self.commit_game(&mut game).await?;
        self.publish(game_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    #[tokio::test]
    async fn test_total_rounds_follow_active_players() {
        let f = fixture();
        let game = f.state.create_game("Quiz".to_string()).await.unwrap();
        for name in ["Ada", "Bob"] {
            f.state
                .add_player(&game.id, name.to_string(), "#111".to_string())
                .await
                .unwrap();
        }
        let game = f.state.require_game(&game.id).await.unwrap();
        assert_eq!(game.total_rounds, 4);
        assert_eq!(f.state.store.rounds_of_game(&game.id).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_removing_player_drops_extra_rounds() {
        let f = fixture();
        let game = f.state.create_game("Quiz".to_string()).await.unwrap();
        let (ada, _) = f
            .state
            .add_player(&game.id, "Ada".to_string(), "#111".to_string())
            .await
            .unwrap();
        f.state
            .add_player(&game.id, "Bob".to_string(), "#222".to_string())
            .await
            .unwrap();
        f.state.remove_player(&game.id, &ada.id).await.unwrap();

        let game = f.state.require_game(&game.id).await.unwrap();
        assert_eq!(game.total_rounds, 2);
        let numbers: Vec<_> = f
            .state
            .store
            .rounds_of_game(&game.id)
            .await
            .unwrap()
            .iter()
            .map(|r| r.round_number)
            .collect();
        assert_eq!(numbers, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_dropped_rounds_take_their_points_along() {
        let f = fixture();
        let (game, players) = playing_game(&f.state, &["Ada", "Bob"]).await;
        for n in 1..=3 {
            f.state.start_collecting(&game.id).await.unwrap();
            for p in &players {
                f.state
                    .submit_answer(&game.id, &p.id, format!("Cat{} answer 5", n), false)
                    .await
                    .unwrap();
            }
            f.state.start_revealing(&game.id).await.unwrap();
            f.state.show_scores(&game.id).await.unwrap();
            f.state.next_round(&game.id).await.unwrap();
        }
        f.state.return_to_setup(&game.id).await.unwrap();
        let current = f.state.require_game(&game.id).await.unwrap();
        let before = f.state.require_player(&current, &players[0].id).await.unwrap();
        assert_eq!(before.total_score, 15);

        // two rounds remain, so round 3's answers go with it
        let snapshot = f.state.remove_player(&game.id, &players[1].id).await.unwrap();
        assert_eq!(snapshot.total_rounds, 2);
        let game = f.state.require_game(&game.id).await.unwrap();
        let rows = f
            .state
            .player_answers_in_game(&game, &players[0].id)
            .await
            .unwrap();
        let sum: i32 = rows.iter().map(|pa| pa.points_awarded).sum();
        assert_eq!(sum, 10);
        assert_eq!(snapshot.players[0].total_score, sum);
    }

    #[tokio::test]
    async fn test_roster_change_sends_ready_game_back_to_draft() {
        let f = fixture();
        let game = f.state.create_game("Quiz".to_string()).await.unwrap();
        f.state
            .add_player(&game.id, "Ada".to_string(), "#111".to_string())
            .await
            .unwrap();
        for n in 1..=2 {
            let c = seed_category(&f.state, &format!("C{}", n), 10).await;
            f.state.assign_category(&game.id, n, &c.id).await.unwrap();
        }
        f.state
            .transition_game(&game.id, GameStatus::Ready)
            .await
            .unwrap();

        f.state
            .add_player(&game.id, "Bob".to_string(), "#222".to_string())
            .await
            .unwrap();
        let game = f.state.require_game(&game.id).await.unwrap();
        assert_eq!(game.status, GameStatus::Draft);
        assert_eq!(game.total_rounds, 4);
    }

    #[tokio::test]
    async fn test_incomplete_category_is_rejected() {
        let f = fixture();
        let game = f.state.create_game("Quiz".to_string()).await.unwrap();
        f.state
            .add_player(&game.id, "Ada".to_string(), "#111".to_string())
            .await
            .unwrap();
        let short = seed_category(&f.state, "Short", 7).await;
        let err = f
            .state
            .assign_category(&game.id, 1, &short.id)
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::Validation(_)));
    }

    #[tokio::test]
    async fn test_category_cannot_be_used_twice() {
        let f = fixture();
        let game = f.state.create_game("Quiz".to_string()).await.unwrap();
        f.state
            .add_player(&game.id, "Ada".to_string(), "#111".to_string())
            .await
            .unwrap();
        let c = seed_category(&f.state, "Rivers", 10).await;
        f.state.assign_category(&game.id, 1, &c.id).await.unwrap();
        assert!(f.state.assign_category(&game.id, 2, &c.id).await.is_err());
        // reassigning to the same round is fine
        assert!(f.state.assign_category(&game.id, 1, &c.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_update_config_recomputes_rounds() {
        let f = fixture();
        let game = f.state.create_game("Quiz".to_string()).await.unwrap();
        f.state
            .add_player(&game.id, "Ada".to_string(), "#111".to_string())
            .await
            .unwrap();
        let config = GameConfig {
            rounds_per_player: 3,
            ..GameConfig::default()
        };
        let snapshot = f.state.update_config(&game.id, config, 45).await.unwrap();
        assert_eq!(snapshot.total_rounds, 3);
        assert_eq!(snapshot.thinking_time, 45);
    }

    #[tokio::test]
    async fn test_update_config_rejects_nonsense() {
        let f = fixture();
        let game = f.state.create_game("Quiz".to_string()).await.unwrap();
        let config = GameConfig {
            top_answers_count: 0,
            ..GameConfig::default()
        };
        assert!(matches!(
            f.state.update_config(&game.id, config, 30).await,
            Err(GameError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_config_locked_once_playing() {
        let f = fixture();
        let (game, _) = playing_game(&f.state, &["Ada"]).await;
        assert!(f
            .state
            .update_config(&game.id, GameConfig::default(), 30)
            .await
            .is_err());
    }
}
