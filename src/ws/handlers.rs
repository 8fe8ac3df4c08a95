//! WebSocket message dispatch
//!
//! Authorization is checked here, then dispatched to the GM or player handlers.

use crate::error::{GameError, GameResult};
use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::{AppState, Snapshot};
use crate::types::{GameId, Role};
use std::sync::Arc;

use super::{gm, player};

/// What a socket is bound to; player sessions fill this in after joining
#[derive(Debug, Clone)]
pub struct Connection {
    pub role: Role,
    pub game_id: Option<GameId>,
    pub token: Option<String>,
}

impl Connection {
    pub fn new(role: Role, game_id: Option<GameId>, token: Option<String>) -> Self {
        Self {
            role,
            game_id,
            token,
        }
    }
}

/// Return early unless the connection belongs to the GM
macro_rules! check_gm {
    ($conn:expr, $action:expr) => {
        if $conn.role != Role::Gm {
            return Some(ServerMessage::Error {
                code: "UNAUTHORIZED".to_string(),
                msg: format!("Only the GM can {}", $action),
            });
        }
    };
}

/// Return early when no game is bound to the connection
macro_rules! require_game {
    ($conn:expr) => {
        match $conn.game_id.clone() {
            Some(id) => id,
            None => {
                return Some(ServerMessage::Error {
                    code: "NO_GAME".to_string(),
                    msg: "Connection is not bound to a game".to_string(),
                });
            }
        }
    };
}

/// Map a mutation result onto the reply for the caller.
///
/// Success is silent because the broadcast already carries the new snapshot.
/// NotFound is swallowed: it comes from refresh and navigation races.
pub fn respond(action: &str, result: GameResult<Arc<Snapshot>>) -> Option<ServerMessage> {
    match result {
        Ok(_) => None,
        Err(e) => reject(action, e),
    }
}

pub fn reject(action: &str, err: GameError) -> Option<ServerMessage> {
    match &err {
        GameError::NotFound { .. } => {
            tracing::debug!("Ignoring {}: {}", action, err);
            None
        }
        GameError::Storage(_) => {
            tracing::error!("{} failed: {}", action, err);
            Some(ServerMessage::error(&err))
        }
        _ => {
            tracing::warn!("{} rejected: {}", action, err);
            Some(ServerMessage::error(&err))
        }
    }
}

/// Handle a client message and return an optional direct reply
pub async fn handle_message(
    msg: ClientMessage,
    conn: &mut Connection,
    state: &Arc<AppState>,
) -> Option<ServerMessage> {
    match msg {
        ClientMessage::RequestSnapshot => {
            let game_id = require_game!(conn);
            match state.current_snapshot(&game_id).await {
                Ok(snapshot) => Some(ServerMessage::snapshot(&snapshot)),
                Err(e) => reject("snapshot request", e),
            }
        }

        // Player messages
        ClientMessage::Heartbeat => player::handle_heartbeat(state, conn).await,

        ClientMessage::JoinGame {
            join_code,
            name,
            color,
            device,
        } => player::handle_join_game(state, conn, join_code, name, color, device).await,

        ClientMessage::ClaimPlayer { player_id, device } => {
            let game_id = require_game!(conn);
            player::handle_claim_player(state, conn, game_id, player_id, device).await
        }

        ClientMessage::Reconnect { player_id, device } => {
            player::handle_reconnect(state, conn, player_id, device).await
        }

        ClientMessage::SubmitAnswer { text, use_double } => {
            player::handle_submit_answer(state, conn, text, use_double).await
        }

        ClientMessage::Disconnect => player::handle_disconnect(state, conn).await,

        // GM-only commands (authorization checked before dispatch)
        ClientMessage::GmTransitionGame { status } => {
            check_gm!(conn, "change the game status");
            let game_id = require_game!(conn);
            respond(
                "game transition",
                state.transition_game(&game_id, status).await,
            )
        }

        ClientMessage::GmStartGame => {
            check_gm!(conn, "start the game");
            let game_id = require_game!(conn);
            respond("start game", state.start_game(&game_id).await)
        }

        ClientMessage::GmCompleteGame => {
            check_gm!(conn, "complete the game");
            let game_id = require_game!(conn);
            respond("complete game", state.complete_game(&game_id).await)
        }

        ClientMessage::GmReturnToSetup => {
            check_gm!(conn, "return to setup");
            let game_id = require_game!(conn);
            respond("return to setup", state.return_to_setup(&game_id).await)
        }

        ClientMessage::GmToggleRules { show } => {
            check_gm!(conn, "toggle the rules");
            let game_id = require_game!(conn);
            respond("toggle rules", state.toggle_rules(&game_id, show).await)
        }

        ClientMessage::GmAddPlayer { name, color } => {
            check_gm!(conn, "add players");
            let game_id = require_game!(conn);
            gm::handle_add_player(state, &game_id, name, color).await
        }

        ClientMessage::GmRemovePlayer { player_id } => {
            check_gm!(conn, "remove players");
            let game_id = require_game!(conn);
            respond(
                "remove player",
                state.remove_player(&game_id, &player_id).await,
            )
        }

        ClientMessage::GmReorderPlayers { order } => {
            check_gm!(conn, "reorder players");
            let game_id = require_game!(conn);
            respond(
                "reorder players",
                state.reorder_players(&game_id, order).await,
            )
        }

        ClientMessage::GmAssignCategory {
            round_number,
            category_id,
        } => {
            check_gm!(conn, "assign categories");
            let game_id = require_game!(conn);
            respond(
                "assign category",
                state
                    .assign_category(&game_id, round_number, &category_id)
                    .await,
            )
        }

        ClientMessage::GmUpdateConfig {
            config,
            thinking_time,
        } => {
            check_gm!(conn, "change the configuration");
            let game_id = require_game!(conn);
            respond(
                "update config",
                state.update_config(&game_id, config, thinking_time).await,
            )
        }

        ClientMessage::GmTransitionRound { status } => {
            check_gm!(conn, "change the round status");
            let game_id = require_game!(conn);
            respond(
                "round transition",
                state.transition_round(&game_id, status).await,
            )
        }

        ClientMessage::GmStartCollecting => {
            check_gm!(conn, "start collecting");
            let game_id = require_game!(conn);
            respond("start collecting", state.start_collecting(&game_id).await)
        }

        ClientMessage::GmStartRevealing => {
            check_gm!(conn, "start revealing");
            let game_id = require_game!(conn);
            respond("start revealing", state.start_revealing(&game_id).await)
        }

        ClientMessage::GmRevealNext => {
            check_gm!(conn, "control the reveal");
            let game_id = require_game!(conn);
            respond("reveal next", state.reveal_next(&game_id).await)
        }

        ClientMessage::GmRevealPrev => {
            check_gm!(conn, "control the reveal");
            let game_id = require_game!(conn);
            respond("reveal previous", state.reveal_previous(&game_id).await)
        }

        ClientMessage::GmRevealAll => {
            check_gm!(conn, "control the reveal");
            let game_id = require_game!(conn);
            respond("reveal all", state.reveal_all(&game_id).await)
        }

        ClientMessage::GmShowScores => {
            check_gm!(conn, "show scores");
            let game_id = require_game!(conn);
            respond("show scores", state.show_scores(&game_id).await)
        }

        ClientMessage::GmNextRound => {
            check_gm!(conn, "advance rounds");
            let game_id = require_game!(conn);
            respond("next round", state.next_round(&game_id).await)
        }

        ClientMessage::GmSubmitAnswer {
            player_id,
            text,
            use_double,
        } => {
            check_gm!(conn, "answer for players");
            let game_id = require_game!(conn);
            gm::handle_submit_for_player(state, &game_id, player_id, text, use_double).await
        }

        ClientMessage::GmCorrectAnswer {
            player_id,
            round_number,
            answer_id,
        } => {
            check_gm!(conn, "correct answers");
            let game_id = require_game!(conn);
            gm::handle_correct_answer(state, &game_id, player_id, round_number, answer_id).await
        }

        ClientMessage::GmResetScores => {
            check_gm!(conn, "reset scores");
            let game_id = require_game!(conn);
            respond("reset scores", state.reset_scores(&game_id).await)
        }
    }
}
