use super::{AppState, Snapshot};
use crate::error::{GameError, GameResult};
use crate::ledger;
use crate::types::*;
use std::sync::Arc;

impl RoundStatus {
    pub fn allowed_transitions(self) -> &'static [RoundStatus] {
        use RoundStatus::*;

        match self {
            Pending => &[Intro],
            Intro => &[Collecting, Pending],
            Collecting => &[Revealing, Intro],
            Revealing => &[Friction, Scoring, Collecting],
            Friction => &[Scoring, Revealing],
            Scoring => &[Complete, Revealing, Friction],
            Complete => &[Pending],
        }
    }

    pub fn can_transition_to(self, target: RoundStatus) -> bool {
        self.allowed_transitions().contains(&target)
    }

    pub fn transition(self, target: RoundStatus) -> GameResult<RoundStatus> {
        if self.can_transition_to(target) {
            Ok(target)
        } else {
            Err(GameError::invalid(self, target))
        }
    }

    /// Answers are being uncovered on the presentation
    pub fn is_revealing(self) -> bool {
        matches!(self, RoundStatus::Revealing | RoundStatus::Friction)
    }
}

impl AppState {
    /// Load the game and its current round for a round-level action
    pub(super) async fn playing_round(&self, game_id: &str) -> GameResult<(Game, Round)> {
        let game = self.require_game(game_id).await?;
        if game.status != GameStatus::Playing {
            return Err(GameError::validation(format!(
                "Game {} is not being played",
                game_id
            )));
        }
        let round = self.current_round(&game).await?;
        Ok((game, round))
    }

    pub(super) async fn commit_round(
        &self,
        game: &mut Game,
        round: &Round,
    ) -> GameResult<Arc<Snapshot>> {
        self.store.save_round(round).await?;
        self.commit_game(game).await?;
        self.publish(&game.id).await
    }

    /// Move the current round to `target`, applying that state's entry effects
    pub async fn transition_round(
        &self,
        game_id: &str,
        target: RoundStatus,
    ) -> GameResult<Arc<Snapshot>> {
        let _writer = self.lock_game(game_id).await;
        let (mut game, mut round) = self.playing_round(game_id).await?;
        self.enter_round_status(&mut game, &mut round, target).await?;
        self.commit_round(&mut game, &round).await
    }

    async fn enter_round_status(
        &self,
        game: &mut Game,
        round: &mut Round,
        target: RoundStatus,
    ) -> GameResult<()> {
        let from = round.status;
        round.status = from.transition(target)?;

        tracing::info!(
            "Game {} round {} transition {:?} -> {:?}",
            game.id,
            round.round_number,
            from,
            target
        );

        match target {
            RoundStatus::Pending => {
                round.current_slide = 0;
                game.stop_timer();
            }
            RoundStatus::Intro => game.stop_timer(),
            RoundStatus::Collecting => {
                game.show_rules = false;
                game.start_timer(self.now());
            }
            RoundStatus::Revealing if from == RoundStatus::Collecting => {
                round.current_slide = 0;
                game.stop_timer();
            }
            RoundStatus::Revealing | RoundStatus::Friction => {}
            RoundStatus::Scoring => self.recalculate_all(game).await?,
            RoundStatus::Complete => game.stop_timer(),
        }
        Ok(())
    }

    /// Open the round for answers; calling it again restarts the thinking timer
    pub async fn start_collecting(&self, game_id: &str) -> GameResult<Arc<Snapshot>> {
        let _writer = self.lock_game(game_id).await;
        let (mut game, mut round) = self.playing_round(game_id).await?;
        if round.status == RoundStatus::Collecting {
            game.start_timer(self.now());
            tracing::info!("Game {} thinking timer restarted", game_id);
        } else {
            self.enter_round_status(&mut game, &mut round, RoundStatus::Collecting)
                .await?;
        }
        self.commit_round(&mut game, &round).await
    }

    pub async fn start_revealing(&self, game_id: &str) -> GameResult<Arc<Snapshot>> {
        let _writer = self.lock_game(game_id).await;
        let (mut game, mut round) = self.playing_round(game_id).await?;
        round.status.transition(RoundStatus::Revealing)?;
        round.status = RoundStatus::Revealing;
        round.current_slide = 0;
        game.stop_timer();
        tracing::info!("Game {} round {} revealing", game_id, round.round_number);
        self.commit_round(&mut game, &round).await
    }

    fn ensure_revealing(round: &Round, target: RoundStatus) -> GameResult<()> {
        if round.status.is_revealing() {
            Ok(())
        } else {
            Err(GameError::invalid(round.status, target))
        }
    }

    /// Uncover one more answer; past the safe zone the round enters Friction
    pub async fn reveal_next(&self, game_id: &str) -> GameResult<Arc<Snapshot>> {
        let _writer = self.lock_game(game_id).await;
        let (mut game, mut round) = self.playing_round(game_id).await?;
        Self::ensure_revealing(&round, RoundStatus::Friction)?;

        let answers = self.round_answers(&round).await?;
        let cap = ledger::max_slide(&answers);
        if round.current_slide < cap {
            round.current_slide += 1;
        }
        if round.current_slide > game.config.top_answers_count
            && round.status == RoundStatus::Revealing
        {
            round.status = RoundStatus::Friction;
            tracing::info!("Game {} round {} entered friction", game_id, round.round_number);
        }

        tracing::debug!(
            "Game {} slide {}/{}",
            game_id,
            round.current_slide,
            cap
        );
        self.commit_round(&mut game, &round).await
    }

    /// Step back one slide; returning into the safe zone leaves Friction
    pub async fn reveal_previous(&self, game_id: &str) -> GameResult<Arc<Snapshot>> {
        let _writer = self.lock_game(game_id).await;
        let (mut game, mut round) = self.playing_round(game_id).await?;
        Self::ensure_revealing(&round, RoundStatus::Revealing)?;

        round.current_slide = round.current_slide.saturating_sub(1);
        if round.status == RoundStatus::Friction
            && round.current_slide <= game.config.top_answers_count
        {
            round.status = RoundStatus::Revealing;
        }
        self.commit_round(&mut game, &round).await
    }

    /// Uncover everything at once
    pub async fn reveal_all(&self, game_id: &str) -> GameResult<Arc<Snapshot>> {
        let _writer = self.lock_game(game_id).await;
        let (mut game, mut round) = self.playing_round(game_id).await?;
        Self::ensure_revealing(&round, RoundStatus::Friction)?;

        let answers = self.round_answers(&round).await?;
        round.current_slide = ledger::max_slide(&answers);
        round.status = if ledger::has_friction_answers(&answers, &game.config) {
            RoundStatus::Friction
        } else {
            RoundStatus::Revealing
        };
        tracing::info!(
            "Game {} round {} revealed all {} answers",
            game_id,
            round.round_number,
            round.current_slide
        );
        self.commit_round(&mut game, &round).await
    }

    pub async fn show_scores(&self, game_id: &str) -> GameResult<Arc<Snapshot>> {
        self.transition_round(game_id, RoundStatus::Scoring).await
    }

    /// Close the current round and open the next one, or finish the game
    pub async fn next_round(&self, game_id: &str) -> GameResult<Arc<Snapshot>> {
        let _writer = self.lock_game(game_id).await;
        let (mut game, mut round) = self.playing_round(game_id).await?;

        if round.status != RoundStatus::Complete {
            self.enter_round_status(&mut game, &mut round, RoundStatus::Complete)
                .await?;
            self.store.save_round(&round).await?;
        }

        if game.current_round >= game.total_rounds {
            self.complete_game_locked(&mut game).await?;
        } else {
            game.current_round += 1;
            let mut next = self.current_round(&game).await?;
            next.status = RoundStatus::Intro;
            next.current_slide = 0;
            self.store.save_round(&next).await?;
            game.show_rules = false;
            game.stop_timer();
            tracing::info!(
                "Game {} advanced to round {}/{}",
                game_id,
                game.current_round,
                game.total_rounds
            );
        }

        self.commit_game(&mut game).await?;
        self.publish(game_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    const ALL: [RoundStatus; 7] = [
        RoundStatus::Pending,
        RoundStatus::Intro,
        RoundStatus::Collecting,
        RoundStatus::Revealing,
        RoundStatus::Friction,
        RoundStatus::Scoring,
        RoundStatus::Complete,
    ];

    #[test]
    fn test_transition_table_is_exhaustive() {
        use RoundStatus::*;
        let allowed = [
            (Pending, Intro),
            (Intro, Collecting),
            (Intro, Pending),
            (Collecting, Revealing),
            (Collecting, Intro),
            (Revealing, Friction),
            (Revealing, Scoring),
            (Revealing, Collecting),
            (Friction, Scoring),
            (Friction, Revealing),
            (Scoring, Complete),
            (Scoring, Revealing),
            (Scoring, Friction),
            (Complete, Pending),
        ];
        for from in ALL {
            for to in ALL {
                let expected = allowed.contains(&(from, to));
                assert_eq!(from.can_transition_to(to), expected, "{:?} -> {:?}", from, to);
                assert_eq!(from.transition(to).is_ok(), expected);
            }
        }
    }

    async fn revealing_game(f: &Fixture) -> Game {
        let (game, _) = playing_game(&f.state, &["Ada"]).await;
        f.state.start_collecting(&game.id).await.unwrap();
        f.state.start_revealing(&game.id).await.unwrap();
        game
    }

    #[tokio::test]
    async fn test_collecting_starts_timer_and_revealing_stops_it() {
        let f = fixture();
        let (game, _) = playing_game(&f.state, &["Ada"]).await;

        let snapshot = f.state.start_collecting(&game.id).await.unwrap();
        assert!(snapshot.timer_running);
        assert_eq!(snapshot.timer_started_at, Some(f.state.now()));

        let snapshot = f.state.start_revealing(&game.id).await.unwrap();
        assert_eq!(snapshot.round_status, Some(RoundStatus::Revealing));
        assert_eq!(snapshot.current_slide, 0);
        assert!(!snapshot.timer_running);
        assert!(snapshot.timer_started_at.is_none());
    }

    #[tokio::test]
    async fn test_restart_collecting_resets_timer() {
        let f = fixture();
        let (game, _) = playing_game(&f.state, &["Ada"]).await;
        f.state.start_collecting(&game.id).await.unwrap();
        f.clock.advance(chrono::Duration::seconds(12));
        let snapshot = f.state.start_collecting(&game.id).await.unwrap();
        assert_eq!(snapshot.timer_started_at, Some(f.state.now()));
    }

    #[tokio::test]
    async fn test_reveal_next_enters_friction_and_caps() {
        let f = fixture();
        let game = revealing_game(&f).await;

        for _ in 0..10 {
            f.state.reveal_next(&game.id).await.unwrap();
        }
        let snapshot = f.state.current_snapshot(&game.id).await.unwrap();
        assert_eq!(snapshot.current_slide, 10);
        assert_eq!(snapshot.round_status, Some(RoundStatus::Revealing));

        let snapshot = f.state.reveal_next(&game.id).await.unwrap();
        assert_eq!(snapshot.current_slide, 11);
        assert_eq!(snapshot.round_status, Some(RoundStatus::Friction));

        for _ in 0..5 {
            f.state.reveal_next(&game.id).await.unwrap();
        }
        let snapshot = f.state.current_snapshot(&game.id).await.unwrap();
        assert_eq!(snapshot.current_slide, 12);
        assert_eq!(snapshot.revealed_answers.len(), 12);
    }

    #[tokio::test]
    async fn test_reveal_previous_returns_to_safe_zone() {
        let f = fixture();
        let game = revealing_game(&f).await;
        f.state.reveal_all(&game.id).await.unwrap();

        f.state.reveal_previous(&game.id).await.unwrap();
        let snapshot = f.state.reveal_previous(&game.id).await.unwrap();
        assert_eq!(snapshot.current_slide, 10);
        assert_eq!(snapshot.round_status, Some(RoundStatus::Revealing));
    }

    #[tokio::test]
    async fn test_reveal_all_is_idempotent() {
        let f = fixture();
        let game = revealing_game(&f).await;

        let once = f.state.reveal_all(&game.id).await.unwrap();
        let twice = f.state.reveal_all(&game.id).await.unwrap();
        assert_eq!(once.current_slide, 12);
        assert_eq!(once.round_status, Some(RoundStatus::Friction));
        assert_eq!(once.current_slide, twice.current_slide);
        assert_eq!(once.round_status, twice.round_status);
        assert_eq!(once.revealed_answers.len(), twice.revealed_answers.len());
    }

    #[tokio::test]
    async fn test_reveal_all_without_friction_stays_revealing() {
        let f = fixture();
        let game = f.state.create_game("Small".to_string()).await.unwrap();
        f.state
            .add_player(&game.id, "Ada".to_string(), "#111".to_string())
            .await
            .unwrap();
        for n in 1..=2 {
            let c = seed_category(&f.state, &format!("Ten{}", n), 10).await;
            f.state.assign_category(&game.id, n, &c.id).await.unwrap();
        }
        f.state
            .transition_game(&game.id, GameStatus::Ready)
            .await
            .unwrap();
        f.state.start_game(&game.id).await.unwrap();
        f.state.start_collecting(&game.id).await.unwrap();
        f.state.start_revealing(&game.id).await.unwrap();

        let snapshot = f.state.reveal_all(&game.id).await.unwrap();
        assert_eq!(snapshot.current_slide, 10);
        assert_eq!(snapshot.round_status, Some(RoundStatus::Revealing));
    }

    #[tokio::test]
    async fn test_reveal_outside_revealing_is_rejected() {
        let f = fixture();
        let (game, _) = playing_game(&f.state, &["Ada"]).await;
        let err = f.state.reveal_next(&game.id).await.unwrap_err();
        assert!(matches!(err, GameError::InvalidStateTransition { .. }));
    }

    #[tokio::test]
    async fn test_next_round_advances_then_completes() {
        let f = fixture();
        let (game, _) = playing_game(&f.state, &["Ada"]).await;
        assert_eq!(game.total_rounds, 2);

        for expected_round in [2, 0] {
            f.state.start_collecting(&game.id).await.unwrap();
            f.state.start_revealing(&game.id).await.unwrap();
            f.state.show_scores(&game.id).await.unwrap();
            let snapshot = f.state.next_round(&game.id).await.unwrap();
            if expected_round == 2 {
                assert_eq!(snapshot.current_round, 2);
                assert_eq!(snapshot.round_status, Some(RoundStatus::Intro));
                assert_eq!(snapshot.current_slide, 0);
            } else {
                assert_eq!(snapshot.status, GameStatus::Completed);
            }
        }

        let first = f.state.require_round(&game, 1).await.unwrap();
        assert_eq!(first.status, RoundStatus::Complete);
    }

    #[tokio::test]
    async fn test_next_round_requires_scoring() {
        let f = fixture();
        let (game, _) = playing_game(&f.state, &["Ada"]).await;
        f.state.start_collecting(&game.id).await.unwrap();
        assert!(f.state.next_round(&game.id).await.is_err());
        let game = f.state.require_game(&game.id).await.unwrap();
        assert_eq!(game.current_round, 1);
    }

    #[tokio::test]
    async fn test_backward_transition_keeps_answers() {
        let f = fixture();
        let (game, players) = playing_game(&f.state, &["Ada"]).await;
        f.state.start_collecting(&game.id).await.unwrap();
        f.state
            .submit_answer(&game.id, &players[0].id, "Cat1 answer 3".to_string(), false)
            .await
            .unwrap();
        f.state.start_revealing(&game.id).await.unwrap();
        f.state
            .transition_round(&game.id, RoundStatus::Collecting)
            .await
            .unwrap();

        let round = f.state.require_round(&game, 1).await.unwrap();
        let rows = f.state.store.player_answers_of_round(&round.id).await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn test_round_actions_need_a_playing_game() {
        let f = fixture();
        let game = f.state.create_game("Quiz".to_string()).await.unwrap();
        assert!(matches!(
            f.state.start_collecting(&game.id).await,
            Err(GameError::Validation(_))
        ));
    }
}
