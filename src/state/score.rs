use super::{AppState, Snapshot};
use crate::error::GameResult;
use crate::scoring;
use crate::types::*;
use std::sync::Arc;

impl AppState {
    /// Every PlayerAnswer the player has across all rounds of the game
    pub(crate) async fn player_answers_in_game(
        &self,
        game: &Game,
        player_id: &str,
    ) -> GameResult<Vec<PlayerAnswer>> {
        let mut rows = Vec::new();
        for round in self.store.rounds_of_game(&game.id).await? {
            rows.extend(
                self.store
                    .player_answers_of_round(&round.id)
                    .await?
                    .into_iter()
                    .filter(|pa| pa.player_id == player_id),
            );
        }
        Ok(rows)
    }

    /// Re-derive and persist a player's total from their awarded rows
    pub(crate) async fn recalculate_total(
        &self,
        game: &Game,
        player: &mut Player,
    ) -> GameResult<i32> {
        let rows = self.player_answers_in_game(game, &player.id).await?;
        player.total_score = scoring::recalculate_total(&rows);
        self.store.save_player(player).await?;
        Ok(player.total_score)
    }

    pub(crate) async fn recalculate_all(&self, game: &Game) -> GameResult<()> {
        for mut player in self.store.players_of_game(&game.id).await? {
            self.recalculate_total(game, &mut player).await?;
        }
        tracing::debug!("Recalculated totals for game {}", game.id);
        Ok(())
    }

    /// Wipe every answer of the game; doubles come back and totals return to zero
    pub async fn reset_scores(&self, game_id: &str) -> GameResult<Arc<Snapshot>> {
        let _writer = self.lock_game(game_id).await;
        let mut game = self.require_game(game_id).await?;

        let mut removed = 0;
        for round in self.store.rounds_of_game(&game.id).await? {
            for row in self.store.player_answers_of_round(&round.id).await? {
                self.store.delete_player_answer(&row.id).await?;
                removed += 1;
            }
        }
        for mut player in self.store.players_of_game(&game.id).await? {
            player.doubles_used = 0;
            player.total_score = 0;
            self.store.save_player(&player).await?;
        }

        tracing::info!("Game {} scores reset ({} answers removed)", game_id, removed);
        self.commit_game(&mut game).await?;
        self.publish(game_id).await
    }
}
