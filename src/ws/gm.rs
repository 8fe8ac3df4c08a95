//! GM message handlers that need more than a straight call into the engine.

use super::handlers::{reject, respond};
use crate::protocol::ServerMessage;
use crate::state::AppState;
use crate::types::{AnswerId, PlayerId};
use std::sync::Arc;

pub async fn handle_add_player(
    state: &Arc<AppState>,
    game_id: &str,
    name: String,
    color: String,
) -> Option<ServerMessage> {
    match state.add_player(game_id, name, color).await {
        Ok((player, _)) => {
            tracing::debug!("GM created player {} ({})", player.name, player.id);
            None
        }
        Err(e) => reject("add player", e),
    }
}

/// The GM may only answer for players no device is driving
pub async fn handle_submit_for_player(
    state: &Arc<AppState>,
    game_id: &str,
    player_id: PlayerId,
    text: String,
    use_double: bool,
) -> Option<ServerMessage> {
    respond(
        "GM answer",
        state
            .submit_answer_for_player(game_id, &player_id, text, use_double)
            .await,
    )
}

pub async fn handle_correct_answer(
    state: &Arc<AppState>,
    game_id: &str,
    player_id: PlayerId,
    round_number: Option<u32>,
    answer_id: Option<AnswerId>,
) -> Option<ServerMessage> {
    let result = match round_number {
        Some(n) => {
            state
                .correct_answer_in_round(game_id, n, &player_id, answer_id)
                .await
        }
        None => state.correct_answer(game_id, &player_id, answer_id).await,
    };
    respond("correct answer", result)
}
