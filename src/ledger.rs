//! Answer ledger: point values derived from an answer's rank in its category.

use crate::types::{Answer, GameConfig};

impl Answer {
    /// Answers ranked below the top list land in the friction zone
    pub fn is_friction(&self, config: &GameConfig) -> bool {
        self.position > config.top_answers_count
    }

    /// Points are always re-derived from position, never cached
    pub fn points(&self, config: &GameConfig) -> i32 {
        if self.is_friction(config) {
            config.friction_penalty
        } else {
            self.position as i32
        }
    }
}

/// Sort answers by position (ledger order)
pub fn ordered(mut answers: Vec<Answer>) -> Vec<Answer> {
    answers.sort_by_key(|a| a.position);
    answers
}

/// A category is playable once the whole safe zone is filled
pub fn is_category_complete(answers: &[Answer], config: &GameConfig) -> bool {
    let safe = answers.iter().filter(|a| !a.is_friction(config)).count();
    safe >= config.top_answers_count as usize
}

pub fn has_friction_answers(answers: &[Answer], config: &GameConfig) -> bool {
    answers.iter().any(|a| a.is_friction(config))
}

/// Highest slide the reveal can reach for this category
pub fn max_slide(answers: &[Answer]) -> u32 {
    answers.iter().map(|a| a.position).max().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answer(position: u32) -> Answer {
        Answer {
            id: format!("a{}", position),
            category_id: "c".to_string(),
            position,
            text: format!("Answer {}", position),
            display_text: None,
            stat: None,
        }
    }

    #[test]
    fn test_points_follow_position() {
        let config = GameConfig::default();
        assert_eq!(answer(5).points(&config), 5);
        assert_eq!(answer(10).points(&config), 10);
        assert!(!answer(10).is_friction(&config));
    }

    #[test]
    fn test_friction_zone_scores_penalty() {
        let config = GameConfig::default();
        assert!(answer(12).is_friction(&config));
        assert_eq!(answer(12).points(&config), -5);
    }

    #[test]
    fn test_category_complete_needs_full_safe_zone() {
        let config = GameConfig {
            top_answers_count: 3,
            ..GameConfig::default()
        };
        let mut answers: Vec<_> = [1, 2, 4, 5].into_iter().map(answer).collect();
        assert!(!is_category_complete(&answers, &config));
        answers.push(answer(3));
        assert!(is_category_complete(&answers, &config));
        assert!(has_friction_answers(&answers, &config));
        assert_eq!(max_slide(&answers), 5);
    }
}
