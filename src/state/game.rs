use super::{generate_join_code, AppState, Snapshot};
use crate::error::{GameError, GameResult};
use crate::types::*;
use std::sync::Arc;

impl GameStatus {
    /// Directed, GM-navigable transitions
    pub fn allowed_transitions(self) -> &'static [GameStatus] {
        use GameStatus::*;

        match self {
            Draft => &[Ready],
            Ready => &[Draft, Playing],
            Playing => &[Ready, Completed],
            Completed => &[Ready],
        }
    }

    pub fn can_transition_to(self, target: GameStatus) -> bool {
        self.allowed_transitions().contains(&target)
    }

    /// Checked before anything is written
    pub fn transition(self, target: GameStatus) -> GameResult<GameStatus> {
        if self.can_transition_to(target) {
            Ok(target)
        } else {
            Err(GameError::invalid(self, target))
        }
    }
}

impl AppState {
    /// Create a game in Draft with a fresh, unused join code
    pub async fn create_game(&self, name: String) -> GameResult<Game> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(GameError::validation("Game name must not be empty"));
        }

        let join_code = loop {
            let code = generate_join_code();
            if self.store.find_game_by_join_code(&code).await?.is_none() {
                break code;
            }
        };

        let mut game = Game {
            id: ulid::Ulid::new().to_string(),
            name,
            version: 0,
            status: GameStatus::Draft,
            current_round: 0,
            total_rounds: 0,
            config: GameConfig::default(),
            timer_running: false,
            timer_started_at: None,
            show_rules: false,
            join_code,
            thinking_time: 30,
            created_at: self.now(),
        };

        self.commit_game(&mut game).await?;
        tracing::info!("Created game {} (join code {})", game.id, game.join_code);
        self.publish(&game.id).await?;
        Ok(game)
    }

    pub async fn find_game_by_join_code(&self, code: &str) -> GameResult<Game> {
        self.store
            .find_game_by_join_code(code.trim())
            .await?
            .ok_or_else(|| GameError::not_found("join code", code))
    }

    /// GM navigation; each target routes to the operation that owns its side effects
    pub async fn transition_game(
        &self,
        game_id: &str,
        target: GameStatus,
    ) -> GameResult<Arc<Snapshot>> {
        let _writer = self.lock_game(game_id).await;
        let mut game = self.require_game(game_id).await?;
        game.status.transition(target)?;

        tracing::info!(
            "Game {} transition {:?} -> {:?}",
            game_id,
            game.status,
            target
        );

        match (game.status, target) {
            (GameStatus::Draft, GameStatus::Ready) => {
                self.ensure_setup_complete(&game).await?;
                game.status = GameStatus::Ready;
            }
            (GameStatus::Ready, GameStatus::Draft) => game.status = GameStatus::Draft,
            (_, GameStatus::Playing) => self.start_game_locked(&mut game).await?,
            (_, GameStatus::Completed) => self.complete_game_locked(&mut game).await?,
            (_, GameStatus::Ready) => self.return_to_setup_locked(&mut game).await?,
            _ => return Err(GameError::invalid(game.status, target)),
        }

        self.commit_game(&mut game).await?;
        self.publish(game_id).await
    }

    pub async fn start_game(&self, game_id: &str) -> GameResult<Arc<Snapshot>> {
        let _writer = self.lock_game(game_id).await;
        let mut game = self.require_game(game_id).await?;
        self.start_game_locked(&mut game).await?;
        self.commit_game(&mut game).await?;
        self.publish(game_id).await
    }

    async fn start_game_locked(&self, game: &mut Game) -> GameResult<()> {
        game.status.transition(GameStatus::Playing)?;
        self.ensure_setup_complete(game).await?;

        if game.current_round == 0 {
            game.current_round = 1;
        }
        let mut round = self.current_round(game).await?;
        if round.status == RoundStatus::Pending {
            round.status = RoundStatus::Intro;
            round.current_slide = 0;
            self.store.save_round(&round).await?;
        }

        game.status = GameStatus::Playing;
        game.show_rules = game.current_round == 1;
        game.stop_timer();

        tracing::info!(
            "Game {} started at round {}/{}",
            game.id,
            game.current_round,
            game.total_rounds
        );
        Ok(())
    }

    /// Finish the game; a second call finds it Completed and changes nothing
    pub async fn complete_game(&self, game_id: &str) -> GameResult<Arc<Snapshot>> {
        let _writer = self.lock_game(game_id).await;
        let mut game = self.require_game(game_id).await?;
        if game.status == GameStatus::Completed {
            return self.publish(game_id).await;
        }
        self.complete_game_locked(&mut game).await?;
        self.commit_game(&mut game).await?;
        self.publish(game_id).await
    }

    pub(crate) async fn complete_game_locked(&self, game: &mut Game) -> GameResult<()> {
        game.status.transition(GameStatus::Completed)?;

        let now = self.now();
        for round in self.store.rounds_of_game(&game.id).await? {
            let Some(category_id) = &round.category_id else {
                continue;
            };
            let Some(mut category) = self.store.load_category(category_id).await? else {
                continue;
            };
            if category.played {
                continue;
            }
            category.played = true;
            category.played_at = Some(now);
            self.store.save_category(&category).await?;
            tracing::debug!("Marked category {} as played", category.name);
        }

        game.status = GameStatus::Completed;
        game.show_rules = false;
        game.stop_timer();
        tracing::info!("Game {} completed", game.id);
        Ok(())
    }

    /// Administrative full rewind outside the round transition table; scores are kept
    pub async fn return_to_setup(&self, game_id: &str) -> GameResult<Arc<Snapshot>> {
        let _writer = self.lock_game(game_id).await;
        let mut game = self.require_game(game_id).await?;
        self.return_to_setup_locked(&mut game).await?;
        self.commit_game(&mut game).await?;
        self.publish(game_id).await
    }

    async fn return_to_setup_locked(&self, game: &mut Game) -> GameResult<()> {
        for mut round in self.store.rounds_of_game(&game.id).await? {
            round.status = RoundStatus::Pending;
            round.current_slide = 0;
            self.store.save_round(&round).await?;
        }

        game.status = GameStatus::Ready;
        game.current_round = 0;
        game.show_rules = false;
        game.stop_timer();
        tracing::info!("Game {} returned to setup", game.id);
        Ok(())
    }

    /// Show or hide the rules overlay on the presentation
    pub async fn toggle_rules(&self, game_id: &str, show: bool) -> GameResult<Arc<Snapshot>> {
        let _writer = self.lock_game(game_id).await;
        let mut game = self.require_game(game_id).await?;
        game.show_rules = show;
        self.commit_game(&mut game).await?;
        self.publish(game_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    const ALL: [GameStatus; 4] = [
        GameStatus::Draft,
        GameStatus::Ready,
        GameStatus::Playing,
        GameStatus::Completed,
    ];

    #[test]
    fn test_transition_table_is_exhaustive() {
        use GameStatus::*;
        let allowed = [
            (Draft, Ready),
            (Ready, Draft),
            (Ready, Playing),
            (Playing, Ready),
            (Playing, Completed),
            (Completed, Ready),
        ];
        for from in ALL {
            for to in ALL {
                let expected = allowed.contains(&(from, to));
                assert_eq!(from.transition(to).is_ok(), expected, "{:?} -> {:?}", from, to);
                if !expected {
                    assert!(matches!(
                        from.transition(to),
                        Err(GameError::InvalidStateTransition { .. })
                    ));
                }
            }
        }
    }

    #[tokio::test]
    async fn test_invalid_transition_leaves_status_unchanged() {
        let f = fixture();
        let game = f.state.create_game("Quiz".to_string()).await.unwrap();
        let version = f.state.require_game(&game.id).await.unwrap().version;

        let err = f
            .state
            .transition_game(&game.id, GameStatus::Completed)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Invalid state transition"));

        let after = f.state.require_game(&game.id).await.unwrap();
        assert_eq!(after.status, GameStatus::Draft);
        assert_eq!(after.version, version);
    }

    #[tokio::test]
    async fn test_ready_requires_complete_setup() {
        let f = fixture();
        let game = f.state.create_game("Quiz".to_string()).await.unwrap();
        f.state
            .add_player(&game.id, "Ada".to_string(), "#111".to_string())
            .await
            .unwrap();

        let err = f
            .state
            .transition_game(&game.id, GameStatus::Ready)
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::Validation(_)));
    }

    #[tokio::test]
    async fn test_start_game_enters_intro_with_rules() {
        let f = fixture();
        let (game, _) = playing_game(&f.state, &["Ada", "Bob"]).await;
        assert_eq!(game.status, GameStatus::Playing);
        assert_eq!(game.current_round, 1);
        assert!(game.show_rules);

        let round = f.state.current_round(&game).await.unwrap();
        assert_eq!(round.status, RoundStatus::Intro);
        assert_eq!(round.current_slide, 0);
    }

    #[tokio::test]
    async fn test_complete_game_is_idempotent_and_marks_categories() {
        let f = fixture();
        let (game, _) = playing_game(&f.state, &["Ada"]).await;

        f.state.complete_game(&game.id).await.unwrap();
        let once = f.state.require_game(&game.id).await.unwrap();
        f.state.complete_game(&game.id).await.unwrap();
        let twice = f.state.require_game(&game.id).await.unwrap();

        assert_eq!(once.status, GameStatus::Completed);
        assert_eq!(twice.status, GameStatus::Completed);
        assert_eq!(once.version, twice.version);

        for round in f.state.store.rounds_of_game(&game.id).await.unwrap() {
            let category_id = round.category_id.unwrap();
            let category = f.state.store.load_category(&category_id).await.unwrap().unwrap();
            assert!(category.played);
        }
    }

    #[tokio::test]
    async fn test_already_played_category_keeps_original_timestamp() {
        let f = fixture();
        let (game, _) = playing_game(&f.state, &["Ada"]).await;
        let round = f.state.require_round(&game, 1).await.unwrap();
        let category_id = round.category_id.unwrap();

        let mut category = f.state.store.load_category(&category_id).await.unwrap().unwrap();
        let earlier = f.state.now() - chrono::Duration::days(3);
        category.played = true;
        category.played_at = Some(earlier);
        f.state.store.save_category(&category).await.unwrap();

        f.state.complete_game(&game.id).await.unwrap();
        let category = f.state.store.load_category(&category_id).await.unwrap().unwrap();
        assert_eq!(category.played_at, Some(earlier));
    }

    #[tokio::test]
    async fn test_return_to_setup_rewinds_every_round() {
        let f = fixture();
        let (game, _) = playing_game(&f.state, &["Ada", "Bob"]).await;
        f.state.start_collecting(&game.id).await.unwrap();

        f.state.return_to_setup(&game.id).await.unwrap();
        let game = f.state.require_game(&game.id).await.unwrap();
        assert_eq!(game.status, GameStatus::Ready);
        assert!(!game.timer_running);
        assert!(game.timer_started_at.is_none());
        for round in f.state.store.rounds_of_game(&game.id).await.unwrap() {
            assert_eq!(round.status, RoundStatus::Pending);
            assert_eq!(round.current_slide, 0);
        }
    }

    #[tokio::test]
    async fn test_transition_game_routes_playing_to_ready_as_rewind() {
        let f = fixture();
        let (game, _) = playing_game(&f.state, &["Ada"]).await;
        f.state
            .transition_game(&game.id, GameStatus::Ready)
            .await
            .unwrap();
        let round = f.state.require_round(&game, 1).await.unwrap();
        assert_eq!(round.status, RoundStatus::Pending);

        // and the game can be started again from round 1
        f.state
            .transition_game(&game.id, GameStatus::Playing)
            .await
            .unwrap();
        let game = f.state.require_game(&game.id).await.unwrap();
        assert_eq!(game.current_round, 1);
        assert!(game.show_rules);
    }

    #[tokio::test]
    async fn test_toggle_rules() {
        let f = fixture();
        let (game, _) = playing_game(&f.state, &["Ada"]).await;
        let snapshot = f.state.toggle_rules(&game.id, false).await.unwrap();
        assert!(!snapshot.show_rules);
    }
}
