pub mod gm;
pub mod handlers;
pub mod player;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
};
use futures::{
    sink::SinkExt,
    stream::{SplitSink, StreamExt},
};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::{AppState, Snapshot};
use crate::types::{GameId, Role};
use handlers::Connection;

const PROTOCOL_VERSION: &str = "1.0";

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub role: Option<String>,
    pub game: Option<String>,
    pub token: Option<String>,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsQuery>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    tracing::info!(
        "WebSocket connection request: role={:?}, game={:?}",
        params.role,
        params.game
    );

    ws.on_upgrade(move |socket| handle_socket(socket, params, state))
}

fn parse_role(role: Option<&str>) -> Role {
    match role {
        Some("gm") => Role::Gm,
        Some("player") => Role::Player,
        _ => Role::Presentation,
    }
}

/// Work out which game a new socket belongs to
async fn resolve_game(state: &AppState, params: &WsQuery) -> Option<GameId> {
    if let Some(game) = &params.game {
        return Some(game.clone());
    }
    let token = params.token.as_deref()?;
    state.player_for_token(token).await.ok().map(|p| p.game_id)
}

async fn send_json(
    sender: &mut SplitSink<WebSocket, Message>,
    msg: &ServerMessage,
) -> Result<(), axum::Error> {
    match serde_json::to_string(msg) {
        Ok(json) => sender.send(Message::Text(json.into())).await,
        Err(e) => {
            tracing::error!("Failed to serialize server message: {}", e);
            Ok(())
        }
    }
}

/// A snapshot subscription that only forwards strictly newer versions
struct Feed {
    game_id: GameId,
    rx: broadcast::Receiver<Arc<Snapshot>>,
    last: Option<Arc<Snapshot>>,
}

impl Feed {
    fn subscribe(state: &AppState, game_id: GameId) -> Self {
        Self {
            rx: state.hub.subscribe(&game_id),
            game_id,
            last: None,
        }
    }

    /// Keep the snapshot if it is newer than what the client already shows
    fn accept(&mut self, snapshot: Arc<Snapshot>) -> Option<Arc<Snapshot>> {
        if let Some(last) = &self.last {
            if !snapshot.supersedes(last) {
                tracing::trace!("Dropping stale snapshot v{}", snapshot.version);
                return None;
            }
        }
        self.last = Some(snapshot.clone());
        Some(snapshot)
    }
}

async fn next_snapshot(feed: &mut Option<Feed>, state: &AppState) -> Option<Arc<Snapshot>> {
    let Some(feed) = feed else {
        return std::future::pending().await;
    };
    loop {
        match feed.rx.recv().await {
            Ok(snapshot) => return Some(snapshot),
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!("Observer lagged by {} snapshots, resyncing", skipped);
                if let Ok(snapshot) = state.current_snapshot(&feed.game_id).await {
                    return Some(snapshot);
                }
            }
            Err(RecvError::Closed) => return None,
        }
    }
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, params: WsQuery, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    let role = parse_role(params.role.as_deref());
    let game_id = resolve_game(&state, &params).await;
    let mut conn = Connection::new(role.clone(), game_id.clone(), params.token.clone());
    tracing::info!("WebSocket connected with role {:?} for game {:?}", role, game_id);

    let mut feed = game_id.map(|id| Feed::subscribe(&state, id));

    let snapshot = match &mut feed {
        Some(f) => match state.current_snapshot(&f.game_id).await {
            Ok(s) => f.accept(s).map(|s| (*s).clone()),
            Err(e) => {
                tracing::warn!("No snapshot for new connection: {}", e);
                None
            }
        },
        None => None,
    };
    let welcome = ServerMessage::Welcome {
        protocol: PROTOCOL_VERSION.to_string(),
        role: role.clone(),
        snapshot,
    };
    if send_json(&mut sender, &welcome).await.is_err() {
        tracing::error!("Failed to send welcome message");
        return;
    }

    loop {
        tokio::select! {
            snapshot = next_snapshot(&mut feed, &state) => {
                let Some(snapshot) = snapshot else { break };
                let Some(f) = feed.as_mut() else { continue };
                if let Some(snapshot) = f.accept(snapshot) {
                    if send_json(&mut sender, &ServerMessage::snapshot(&snapshot)).await.is_err() {
                        break;
                    }
                }
            }

            ws_msg = receiver.next() => {
                match ws_msg {
                    Some(Ok(Message::Text(text))) => {
                        tracing::debug!("Received message: {}", text);

                        let reply = match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => {
                                handlers::handle_message(client_msg, &mut conn, &state).await
                            }
                            Err(e) => {
                                tracing::warn!("Failed to parse client message: {}", e);
                                Some(ServerMessage::Error {
                                    code: "PARSE_ERROR".to_string(),
                                    msg: format!("Invalid message format: {}", e),
                                })
                            }
                        };

                        // joining binds the socket to a (possibly different) game
                        if conn.game_id.is_some()
                            && conn.game_id.as_ref() != feed.as_ref().map(|f| &f.game_id)
                        {
                            feed = conn.game_id.clone().map(|id| Feed::subscribe(&state, id));
                        }

                        if let Some(reply) = reply {
                            if send_json(&mut sender, &reply).await.is_err() {
                                tracing::error!("Failed to send response");
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        tracing::info!("WebSocket closed");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!("WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    tracing::info!("WebSocket connection closed for role: {:?}", role);
}
