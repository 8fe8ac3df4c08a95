//! Player message handlers
//!
//! Joining, claiming and reconnecting bind the socket to a session token;
//! everything else is looked up through that token.

use super::handlers::{reject, respond, Connection};
use crate::error::GameError;
use crate::protocol::ServerMessage;
use crate::state::{AppState, JoinedPlayer};
use crate::types::{GameId, PlayerId, Role};
use std::sync::Arc;

fn require_player_role(conn: &Connection) -> Option<ServerMessage> {
    if conn.role == Role::Player {
        None
    } else {
        Some(ServerMessage::Error {
            code: "UNAUTHORIZED".to_string(),
            msg: "Only player connections can hold a session".to_string(),
        })
    }
}

fn bind_session(conn: &mut Connection, joined: JoinedPlayer) -> Option<ServerMessage> {
    conn.game_id = Some(joined.player.game_id.clone());
    conn.token = Some(joined.session.token.clone());
    Some(ServerMessage::SessionCreated {
        player_id: joined.player.id,
        game_id: joined.player.game_id,
        token: joined.session.token,
    })
}

fn missing_session() -> Option<ServerMessage> {
    Some(ServerMessage::Error {
        code: "NO_SESSION".to_string(),
        msg: "Join or claim a player first".to_string(),
    })
}

/// Rebroadcast after a timed-out device came back, off the heartbeat path
pub fn spawn_refresh(state: Arc<AppState>, game_id: GameId) {
    tokio::spawn(async move {
        if let Err(e) = state.refresh_presence(&game_id).await {
            tracing::warn!("Presence refresh for game {} failed: {}", game_id, e);
        }
    });
}

pub async fn handle_join_game(
    state: &Arc<AppState>,
    conn: &mut Connection,
    join_code: String,
    name: String,
    color: String,
    device: String,
) -> Option<ServerMessage> {
    if let Some(err) = require_player_role(conn) {
        return Some(err);
    }
    tracing::info!("Join request for code {} as {}", join_code, name);
    match state.join_game(&join_code, name, color, device).await {
        Ok(joined) => bind_session(conn, joined),
        // an unknown join code is a user typo, not a race
        Err(e @ GameError::NotFound { .. }) => Some(ServerMessage::error(&e)),
        Err(e) => reject("join game", e),
    }
}

pub async fn handle_claim_player(
    state: &Arc<AppState>,
    conn: &mut Connection,
    game_id: GameId,
    player_id: PlayerId,
    device: String,
) -> Option<ServerMessage> {
    if let Some(err) = require_player_role(conn) {
        return Some(err);
    }
    match state.claim_player(&game_id, &player_id, device).await {
        Ok(joined) => bind_session(conn, joined),
        Err(e) => reject("claim player", e),
    }
}

pub async fn handle_reconnect(
    state: &Arc<AppState>,
    conn: &mut Connection,
    player_id: PlayerId,
    device: String,
) -> Option<ServerMessage> {
    if let Some(err) = require_player_role(conn) {
        return Some(err);
    }
    let held = conn.token.clone();
    match state.reconnect(&player_id, device, held.as_deref()).await {
        Ok(joined) => bind_session(conn, joined),
        Err(e) => reject("reconnect", e),
    }
}

pub async fn handle_submit_answer(
    state: &Arc<AppState>,
    conn: &Connection,
    text: String,
    use_double: bool,
) -> Option<ServerMessage> {
    let Some(token) = &conn.token else {
        return missing_session();
    };
    let player = match state.player_for_token(token).await {
        Ok(p) => p,
        // retired or unknown token: the device has to reconnect
        Err(GameError::NotFound { .. }) => return missing_session(),
        Err(e) => return reject("submit answer", e),
    };
    respond(
        "submit answer",
        state
            .submit_answer(&player.game_id, &player.id, text, use_double)
            .await,
    )
}

pub async fn handle_heartbeat(state: &Arc<AppState>, conn: &Connection) -> Option<ServerMessage> {
    if let Some(token) = &conn.token {
        match state.heartbeat(token).await {
            Ok(Some(outcome)) if outcome.reconnected => {
                spawn_refresh(state.clone(), outcome.game_id);
            }
            Ok(_) => {}
            Err(e) => tracing::error!("Heartbeat failed: {}", e),
        }
    }
    Some(ServerMessage::HeartbeatAck {
        server_now: state.clock.now().to_rfc3339(),
    })
}

pub async fn handle_disconnect(
    state: &Arc<AppState>,
    conn: &mut Connection,
) -> Option<ServerMessage> {
    let token = conn.token.take()?;
    match state.disconnect(&token).await {
        Ok(_) => None,
        Err(e) => reject("disconnect", e),
    }
}
