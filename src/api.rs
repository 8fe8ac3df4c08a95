//! HTTP endpoints: the polling fallback, heartbeats and the page-unload beacon.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::GameError;
use crate::ledger;
use crate::state::{AppState, Snapshot};
use crate::types::{CategoryId, GameConfig, GameId, GameStatus};
use crate::ws::player::spawn_refresh;

/// Engine errors rendered as `{code, msg}` with a matching status
pub struct ApiError(GameError);

impl From<GameError> for ApiError {
    fn from(e: GameError) -> Self {
        ApiError(e)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub msg: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            GameError::NotFound { .. } => StatusCode::NOT_FOUND,
            GameError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            GameError::InvalidStateTransition { .. } => StatusCode::CONFLICT,
            GameError::Storage(e) => {
                tracing::error!("Storage failure behind HTTP request: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = ErrorBody {
            code: self.0.code().to_string(),
            msg: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Deserialize)]
pub struct CreateGameRequest {
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GameInfo {
    pub game_id: GameId,
    pub name: String,
    pub status: GameStatus,
    pub join_code: String,
}

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    /// False for unknown tokens; the client should join again
    pub known: bool,
    pub server_now: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CategoryListing {
    pub id: CategoryId,
    pub name: String,
    pub answer_count: usize,
    pub complete: bool,
    pub played: bool,
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/games", post(create_game))
        .route("/api/games/{id}/snapshot", get(game_snapshot))
        .route("/api/join/{code}", get(lookup_join_code))
        .route("/api/categories", get(list_categories))
        .route("/api/heartbeat", post(heartbeat))
        .route("/api/disconnect", post(disconnect))
}

/// POST /api/games
pub async fn create_game(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateGameRequest>,
) -> ApiResult<Json<GameInfo>> {
    let game = state.create_game(req.name).await?;
    Ok(Json(GameInfo {
        game_id: game.id,
        name: game.name,
        status: game.status,
        join_code: game.join_code,
    }))
}

/// GET /api/games/{id}/snapshot
///
/// Polling observers call this on their own schedule; the document is the same
/// one pushed over the WebSocket.
pub async fn game_snapshot(
    State(state): State<Arc<AppState>>,
    Path(id): Path<GameId>,
) -> ApiResult<Json<Snapshot>> {
    let snapshot = state.current_snapshot(&id).await?;
    Ok(Json((*snapshot).clone()))
}

/// GET /api/join/{code}
pub async fn lookup_join_code(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> ApiResult<Json<GameInfo>> {
    let game = state.find_game_by_join_code(&code).await?;
    Ok(Json(GameInfo {
        game_id: game.id,
        name: game.name,
        status: game.status,
        join_code: game.join_code,
    }))
}

/// GET /api/categories
pub async fn list_categories(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<CategoryListing>>> {
    let config = GameConfig::default();
    let mut listing = Vec::new();
    for category in state
        .store
        .list_categories()
        .await
        .map_err(GameError::from)?
    {
        let answers = state
            .store
            .answers_of_category(&category.id)
            .await
            .map_err(GameError::from)?;
        listing.push(CategoryListing {
            complete: ledger::is_category_complete(&answers, &config),
            answer_count: answers.len(),
            id: category.id,
            name: category.name,
            played: category.played,
        });
    }
    Ok(Json(listing))
}

/// POST /api/heartbeat
pub async fn heartbeat(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TokenRequest>,
) -> ApiResult<Json<HeartbeatResponse>> {
    let outcome = state.heartbeat(&req.token).await?;
    if let Some(outcome) = &outcome {
        if outcome.reconnected {
            spawn_refresh(state.clone(), outcome.game_id.clone());
        }
    }
    Ok(Json(HeartbeatResponse {
        known: outcome.is_some(),
        server_now: state.clock.now().to_rfc3339(),
    }))
}

/// POST /api/disconnect
///
/// Sent as a beacon while the page unloads; nobody reads the response.
pub async fn disconnect(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TokenRequest>,
) -> ApiResult<StatusCode> {
    state.disconnect(&req.token).await?;
    Ok(StatusCode::NO_CONTENT)
}
