//! Error taxonomy shared by the engine and its transports

use crate::types::{GameStatus, RoundStatus};
use std::fmt;

/// Either of the two state machines, so one error variant covers both
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Game(GameStatus),
    Round(RoundStatus),
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Game(s) => write!(f, "game {:?}", s),
            Status::Round(s) => write!(f, "round {:?}", s),
        }
    }
}

impl From<GameStatus> for Status {
    fn from(s: GameStatus) -> Self {
        Status::Game(s)
    }
}

impl From<RoundStatus> for Status {
    fn from(s: RoundStatus) -> Self {
        Status::Round(s)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

#[derive(Debug, thiserror::Error)]
pub enum GameError {
    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: Status, to: Status },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl GameError {
    pub fn invalid(from: impl Into<Status>, to: impl Into<Status>) -> Self {
        GameError::InvalidStateTransition {
            from: from.into(),
            to: to.into(),
        }
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        GameError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        GameError::Validation(msg.into())
    }

    /// Stable machine-readable code for the wire
    pub fn code(&self) -> &'static str {
        match self {
            GameError::InvalidStateTransition { .. } => "INVALID_TRANSITION",
            GameError::NotFound { .. } => "NOT_FOUND",
            GameError::Validation(_) => "VALIDATION_FAILED",
            GameError::Storage(_) => "STORAGE_ERROR",
        }
    }
}

pub type GameResult<T> = Result<T, GameError>;
