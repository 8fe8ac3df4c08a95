use super::{AppState, Snapshot};
use crate::error::{GameError, GameResult};
use crate::scoring;
use crate::turn::{self, TimerAction, TurnState};
use crate::types::*;
use std::collections::HashSet;
use std::sync::Arc;

/// Who is entering an answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Submitter {
    Device,
    /// The GM, typing for a player no device drives
    Gm,
}

impl AppState {
    /// Derive whose turn it is from the round's answer rows
    pub(crate) async fn turn_state(&self, game: &Game, round: &Round) -> GameResult<TurnState> {
        let active = self.active_players(game).await?;
        let answered: HashSet<PlayerId> = self
            .store
            .player_answers_of_round(&round.id)
            .await?
            .into_iter()
            .map(|pa| pa.player_id)
            .collect();
        Ok(TurnState::derive(
            round.status,
            turn::turn_order(&active),
            &answered,
        ))
    }

    /// Record the current player's answer, score it and hand the turn on
    pub async fn submit_answer(
        &self,
        game_id: &str,
        player_id: &str,
        text: String,
        use_double: bool,
    ) -> GameResult<Arc<Snapshot>> {
        self.submit(game_id, player_id, text, use_double, Submitter::Device)
            .await
    }

    /// GM entry for a player; refused while a device controls that player
    pub async fn submit_answer_for_player(
        &self,
        game_id: &str,
        player_id: &str,
        text: String,
        use_double: bool,
    ) -> GameResult<Arc<Snapshot>> {
        self.submit(game_id, player_id, text, use_double, Submitter::Gm)
            .await
    }

    async fn submit(
        &self,
        game_id: &str,
        player_id: &str,
        text: String,
        use_double: bool,
        submitter: Submitter,
    ) -> GameResult<Arc<Snapshot>> {
        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(GameError::validation("Answer must not be empty"));
        }

        let _writer = self.lock_game(game_id).await;
        let (mut game, round) = self.playing_round(game_id).await?;
        if round.status != RoundStatus::Collecting {
            return Err(GameError::validation(format!(
                "Round {} is not collecting answers",
                round.round_number
            )));
        }

        let mut player = self.require_player(&game, player_id).await?;
        if submitter == Submitter::Gm {
            let sessions = self.store.sessions_of_player(&player.id).await?;
            let flags = self
                .presence
                .classify(&player, &sessions, game.status, self.now());
            if !flags.is_gm_controlled {
                return Err(GameError::validation(format!(
                    "{} answers from their own device",
                    player.name
                )));
            }
            tracing::info!("GM answers for {}", player.name);
        }

        let turn = self.turn_state(&game, &round).await?;
        match &turn.current {
            Some(current) if current == player_id => {}
            Some(_) if turn.order.iter().any(|id| id == player_id) => {
                // an earlier answer row means they already had their go
                let rows = self.store.player_answers_of_round(&round.id).await?;
                if rows.iter().any(|pa| pa.player_id == player_id) {
                    return Err(GameError::validation(format!(
                        "{} already answered this round",
                        player.name
                    )));
                }
                return Err(GameError::validation(format!(
                    "It is not {}'s turn",
                    player.name
                )));
            }
            Some(_) => {
                return Err(GameError::validation(format!(
                    "{} is not taking part in this round",
                    player.name
                )));
            }
            None => {
                return Err(GameError::validation("Everyone has already answered"));
            }
        }

        if use_double && player.doubles_remaining(&game.config) == 0 {
            return Err(GameError::validation(format!(
                "{} has no doubles left",
                player.name
            )));
        }

        let answers = self.round_answers(&round).await?;
        let resolution = scoring::resolve_answer(&text, &answers, &game.config);
        let points = scoring::apply_double(resolution.points, use_double, &game.config);

        tracing::info!(
            "Game {} round {}: {} answered '{}' -> {:?} via {:?} ({} points{})",
            game_id,
            round.round_number,
            player.name,
            text,
            resolution.answer.as_ref().map(|a| a.position),
            resolution.kind,
            points,
            if use_double { ", doubled" } else { "" }
        );

        self.store
            .save_player_answer(&PlayerAnswer {
                id: ulid::Ulid::new().to_string(),
                round_id: round.id.clone(),
                player_id: player.id.clone(),
                answer_id: resolution.answer.map(|a| a.id),
                submitted_text: text,
                points_awarded: points,
                was_doubled: use_double,
                created_at: self.now(),
            })
            .await?;

        if use_double {
            player.doubles_used += 1;
        }
        self.recalculate_total(&game, &mut player).await?;

        let next = self.turn_state(&game, &round).await?;
        match next.timer_action() {
            TimerAction::Stop => game.stop_timer(),
            TimerAction::Restart => game.start_timer(self.now()),
            TimerAction::Keep => {}
        }

        self.commit_game(&mut game).await?;
        self.publish(game_id).await
    }

    /// GM override of the current round's match for one player
    pub async fn correct_answer(
        &self,
        game_id: &str,
        player_id: &str,
        answer_id: Option<AnswerId>,
    ) -> GameResult<Arc<Snapshot>> {
        let _writer = self.lock_game(game_id).await;
        let game = self.require_game(game_id).await?;
        let round_number = game.current_round;
        self.correct_answer_locked(game, round_number, player_id, answer_id)
            .await
    }

    /// Same as `correct_answer` for an earlier round; the total is repaired too
    pub async fn correct_answer_in_round(
        &self,
        game_id: &str,
        round_number: u32,
        player_id: &str,
        answer_id: Option<AnswerId>,
    ) -> GameResult<Arc<Snapshot>> {
        let _writer = self.lock_game(game_id).await;
        let game = self.require_game(game_id).await?;
        self.correct_answer_locked(game, round_number, player_id, answer_id)
            .await
    }

    async fn correct_answer_locked(
        &self,
        mut game: Game,
        round_number: u32,
        player_id: &str,
        answer_id: Option<AnswerId>,
    ) -> GameResult<Arc<Snapshot>> {
        if !game.status.is_started() {
            return Err(GameError::validation("Nothing to correct before the game starts"));
        }

        let round = self.require_round(&game, round_number).await?;
        let mut player = self.require_player(&game, player_id).await?;
        let mut row = self
            .store
            .player_answers_of_round(&round.id)
            .await?
            .into_iter()
            .find(|pa| pa.player_id == player_id)
            .ok_or_else(|| GameError::not_found("player answer", player_id))?;

        let answers = self.round_answers(&round).await?;
        let answer = match &answer_id {
            Some(id) => Some(
                answers
                    .iter()
                    .find(|a| &a.id == id)
                    .ok_or_else(|| GameError::not_found("answer", id.clone()))?,
            ),
            None => None,
        };

        let base = scoring::base_points(answer, &game.config);
        row.answer_id = answer.map(|a| a.id.clone());
        row.points_awarded = scoring::apply_double(base, row.was_doubled, &game.config);
        self.store.save_player_answer(&row).await?;

        let total = self.recalculate_total(&game, &mut player).await?;
        tracing::info!(
            "Game {} round {}: corrected {} to {:?} ({} points, total {})",
            game.id,
            round_number,
            player.name,
            answer.map(|a| a.position),
            row.points_awarded,
            total
        );

        self.commit_game(&mut game).await?;
        self.publish(&game.id).await
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    async fn collecting(f: &Fixture, names: &[&str]) -> (Game, Vec<Player>) {
        let (game, players) = playing_game(&f.state, names).await;
        f.state.start_collecting(&game.id).await.unwrap();
        (game, players)
    }

    #[tokio::test]
    async fn test_empty_answer_is_rejected() {
        let f = fixture();
        let (game, players) = collecting(&f, &["Ada"]).await;
        let err = f
            .state
            .submit_answer(&game.id, &players[0].id, "   ".to_string(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::Validation(_)));
    }

    #[tokio::test]
    async fn test_gm_answers_only_for_players_without_a_device() {
        let f = fixture();
        let (game, players) = collecting(&f, &["Ada", "Bob"]).await;
        f.state
            .claim_player(&game.id, &players[0].id, "phone".to_string())
            .await
            .unwrap();

        // Ada's phone is live, so the GM may not type for her
        let err = f
            .state
            .submit_answer_for_player(&game.id, &players[0].id, "Cat1 answer 1".to_string(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::Validation(_)));

        // once the phone drops, the seat falls to the GM
        f.clock.advance(chrono::Duration::seconds(20));
        f.state
            .submit_answer_for_player(&game.id, &players[0].id, "Cat1 answer 1".to_string(), false)
            .await
            .unwrap();
        let snapshot = f
            .state
            .submit_answer_for_player(&game.id, &players[1].id, "Cat1 answer 2".to_string(), false)
            .await
            .unwrap();
        assert!(snapshot.all_answered);
    }

    #[tokio::test]
    async fn test_turns_advance_and_timer_follows() {
        let f = fixture();
        let (game, players) = collecting(&f, &["Ada", "Bob", "Cy"]).await;
        let started = f.state.now();

        let snapshot = f.state.current_snapshot(&game.id).await.unwrap();
        assert_eq!(snapshot.current_turn_player.as_deref(), Some(players[0].id.as_str()));
        assert_eq!(snapshot.timer_mode, Some(TimerMode::Countdown));

        f.clock.advance(chrono::Duration::seconds(8));
        let snapshot = f
            .state
            .submit_answer(&game.id, &players[0].id, "Cat1 answer 2".to_string(), false)
            .await
            .unwrap();
        assert_eq!(snapshot.current_turn_player.as_deref(), Some(players[1].id.as_str()));
        assert_eq!(snapshot.timer_mode, Some(TimerMode::Countup));
        assert!(snapshot.timer_running);
        assert_ne!(snapshot.timer_started_at, Some(started));
        assert_eq!(snapshot.timer_started_at, Some(f.state.now()));

        f.state
            .submit_answer(&game.id, &players[1].id, "Cat1 answer 3".to_string(), false)
            .await
            .unwrap();
        let snapshot = f
            .state
            .submit_answer(&game.id, &players[2].id, "Cat1 answer 4".to_string(), false)
            .await
            .unwrap();
        assert!(snapshot.all_answered);
        assert_eq!(snapshot.current_turn_player, None);
        assert_eq!(snapshot.timer_mode, None);
        assert!(!snapshot.timer_running);
    }

    #[tokio::test]
    async fn test_out_of_turn_and_duplicate_answers_are_rejected() {
        let f = fixture();
        let (game, players) = collecting(&f, &["Ada", "Bob"]).await;

        assert!(f
            .state
            .submit_answer(&game.id, &players[1].id, "Cat1 answer 1".to_string(), false)
            .await
            .is_err());

        f.state
            .submit_answer(&game.id, &players[0].id, "Cat1 answer 1".to_string(), false)
            .await
            .unwrap();
        let err = f
            .state
            .submit_answer(&game.id, &players[0].id, "Cat1 answer 2".to_string(), false)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already answered"));
    }

    #[tokio::test]
    async fn test_shared_answer_can_be_claimed_by_several_players() {
        let f = fixture();
        let (game, players) = collecting(&f, &["Ada", "Bob"]).await;
        for p in &players {
            f.state
                .submit_answer(&game.id, &p.id, "Cat1 answer 7".to_string(), false)
                .await
                .unwrap();
        }
        f.state.start_revealing(&game.id).await.unwrap();
        let snapshot = f.state.reveal_all(&game.id).await.unwrap();
        let seventh = snapshot
            .revealed_answers
            .iter()
            .find(|a| a.position == 7)
            .unwrap();
        assert_eq!(seventh.claimed_by.len(), 2);
    }

    #[tokio::test]
    async fn test_double_is_limited_per_game() {
        let f = fixture();
        let (game, players) = collecting(&f, &["Ada"]).await;
        let ada = &players[0];

        f.state
            .submit_answer(&game.id, &ada.id, "Cat1 answer 5".to_string(), true)
            .await
            .unwrap();
        let player = f.state.store.load_player(&ada.id).await.unwrap().unwrap();
        assert_eq!(player.total_score, 10);
        assert_eq!(player.doubles_remaining(&game.config), 0);

        f.state.start_revealing(&game.id).await.unwrap();
        f.state.show_scores(&game.id).await.unwrap();
        f.state.next_round(&game.id).await.unwrap();
        f.state.start_collecting(&game.id).await.unwrap();

        let err = f
            .state
            .submit_answer(&game.id, &ada.id, "Cat2 answer 5".to_string(), true)
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::Validation(_)));
    }

    #[tokio::test]
    async fn test_doubled_penalty_is_doubled() {
        let f = fixture();
        let (game, players) = collecting(&f, &["Ada"]).await;
        f.state
            .submit_answer(&game.id, &players[0].id, "Cat1 answer 12".to_string(), true)
            .await
            .unwrap();
        let player = f.state.store.load_player(&players[0].id).await.unwrap().unwrap();
        assert_eq!(player.total_score, -10);
    }

    #[tokio::test]
    async fn test_correct_answer_keeps_double_and_repairs_total() {
        let f = fixture();
        let (game, players) = collecting(&f, &["Ada"]).await;
        let ada = &players[0];
        f.state
            .submit_answer(&game.id, &ada.id, "Xyzzy".to_string(), true)
            .await
            .unwrap();
        assert_eq!(
            f.state.store.load_player(&ada.id).await.unwrap().unwrap().total_score,
            -6
        );

        let round = f.state.require_round(&game, 1).await.unwrap();
        let answers = f.state.round_answers(&round).await.unwrap();
        let eighth = answers.iter().find(|a| a.position == 8).unwrap();
        f.state
            .correct_answer(&game.id, &ada.id, Some(eighth.id.clone()))
            .await
            .unwrap();

        let rows = f.state.store.player_answers_of_round(&round.id).await.unwrap();
        assert!(rows[0].was_doubled);
        assert_eq!(rows[0].points_awarded, 16);
        let player = f.state.store.load_player(&ada.id).await.unwrap().unwrap();
        assert_eq!(player.total_score, 16);
    }

    #[tokio::test]
    async fn test_correct_earlier_round_updates_total() {
        let f = fixture();
        let (game, players) = collecting(&f, &["Ada"]).await;
        let ada = &players[0];
        f.state
            .submit_answer(&game.id, &ada.id, "Cat1 answer 2".to_string(), false)
            .await
            .unwrap();
        f.state.start_revealing(&game.id).await.unwrap();
        f.state.show_scores(&game.id).await.unwrap();
        f.state.next_round(&game.id).await.unwrap();
        f.state.start_collecting(&game.id).await.unwrap();
        f.state
            .submit_answer(&game.id, &ada.id, "Cat2 answer 9".to_string(), false)
            .await
            .unwrap();

        f.state
            .correct_answer_in_round(&game.id, 1, &ada.id, None)
            .await
            .unwrap();
        let player = f.state.store.load_player(&ada.id).await.unwrap().unwrap();
        assert_eq!(player.total_score, -3 + 9);
    }

    #[tokio::test]
    async fn test_correct_without_submission_is_not_found() {
        let f = fixture();
        let (game, players) = collecting(&f, &["Ada"]).await;
        let err = f
            .state
            .correct_answer(&game.id, &players[0].id, None)
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::NotFound { .. }));
    }
}
