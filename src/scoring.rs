//! Pure scoring rules: resolve, double, total.

use crate::matcher::{self, MatchKind};
use crate::types::{Answer, GameConfig, PlayerAnswer};

#[derive(Debug, Clone)]
pub struct Resolution {
    pub answer: Option<Answer>,
    pub kind: Option<MatchKind>,
    pub points: i32,
}

/// Match free text against the category and price it
pub fn resolve_answer(text: &str, answers: &[Answer], config: &GameConfig) -> Resolution {
    match matcher::find_match(text, answers) {
        Some(m) => Resolution {
            points: m.answer.points(config),
            answer: Some(m.answer.clone()),
            kind: Some(m.kind),
        },
        None => Resolution {
            answer: None,
            kind: None,
            points: config.not_on_list_penalty,
        },
    }
}

/// Points for a settled answer (None = not on list)
pub fn base_points(answer: Option<&Answer>, config: &GameConfig) -> i32 {
    answer.map_or(config.not_on_list_penalty, |a| a.points(config))
}

/// Multiply when doubled; negative results double too
pub fn apply_double(points: i32, doubled: bool, config: &GameConfig) -> i32 {
    if doubled {
        points * config.double_multiplier
    } else {
        points
    }
}

/// Total is always re-derived from the awarded rows
pub fn recalculate_total<'a>(answers: impl IntoIterator<Item = &'a PlayerAnswer>) -> i32 {
    answers.into_iter().map(|pa| pa.points_awarded).sum()
}
