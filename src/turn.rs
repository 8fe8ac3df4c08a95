//! Turn engine: whose turn it is, derived from who has already answered.
//!
//! No "current player" field is stored anywhere. The turn is a pure function
//! of the static order and the set of players with a PlayerAnswer row.

use crate::types::{Player, PlayerId, RoundStatus, TimerMode};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnState {
    pub order: Vec<PlayerId>,
    pub current: Option<PlayerId>,
    pub timer_mode: Option<TimerMode>,
    pub all_answered: bool,
}

/// What the thinking timer should do after a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerAction {
    Stop,
    Restart,
    Keep,
}

/// Stable ordering of the given players by GM-defined position
pub fn turn_order<'a>(players: impl IntoIterator<Item = &'a Player>) -> Vec<PlayerId> {
    let mut players: Vec<&Player> = players.into_iter().collect();
    players.sort_by(|a, b| {
        a.position
            .cmp(&b.position)
            .then(a.created_at.cmp(&b.created_at))
            .then(a.id.cmp(&b.id))
    });
    players.into_iter().map(|p| p.id.clone()).collect()
}

impl TurnState {
    pub fn derive(status: RoundStatus, order: Vec<PlayerId>, answered: &HashSet<PlayerId>) -> Self {
        let next = order.iter().find(|id| !answered.contains(*id)).cloned();
        let all_answered = next.is_none();

        if status != RoundStatus::Collecting {
            return Self {
                order,
                current: None,
                timer_mode: None,
                all_answered,
            };
        }

        let timer_mode = next.as_ref().map(|id| {
            if order.first() == Some(id) {
                TimerMode::Countdown
            } else {
                TimerMode::Countup
            }
        });

        Self {
            order,
            current: next,
            timer_mode,
            all_answered,
        }
    }

    pub fn is_first(&self, player_id: &str) -> bool {
        self.order.first().is_some_and(|id| id == player_id)
    }

    /// The countdown runs once for the first player; every later player gets a fresh countup
    pub fn timer_action(&self) -> TimerAction {
        match &self.current {
            None => TimerAction::Stop,
            Some(id) if self.is_first(id) => TimerAction::Keep,
            Some(_) => TimerAction::Restart,
        }
    }
}
