//! Category seed file: a JSON list of categories with their ranked answers.
//!
//! ```json
//! [{ "name": "Largest countries", "answers": [{ "text": "Russia", "stat": "17.1M km²" }] }]
//! ```
//!
//! Answers are ranked in file order unless they carry an explicit `position`.

use crate::error::StoreError;
use crate::store::GameStore;
use crate::types::{Answer, Category};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("failed to read category file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid category file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("category '{0}' has two answers at position {1}")]
    DuplicatePosition(String, u32),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Deserialize)]
pub struct SeedAnswer {
    pub text: String,
    #[serde(default)]
    pub display_text: Option<String>,
    #[serde(default)]
    pub stat: Option<String>,
    #[serde(default)]
    pub position: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct SeedCategory {
    pub name: String,
    pub answers: Vec<SeedAnswer>,
}

pub fn parse_categories(json: &str) -> Result<Vec<SeedCategory>, SeedError> {
    Ok(serde_json::from_str(json)?)
}

/// Store every category not already present by name; returns how many were added
pub async fn seed_categories(
    store: &dyn GameStore,
    seeds: Vec<SeedCategory>,
) -> Result<usize, SeedError> {
    let existing = store.list_categories().await?;
    let mut added = 0;

    for seed in seeds {
        if existing
            .iter()
            .any(|c| c.name.eq_ignore_ascii_case(&seed.name))
        {
            tracing::debug!("Category '{}' already loaded", seed.name);
            continue;
        }

        let category = Category {
            id: ulid::Ulid::new().to_string(),
            name: seed.name,
            played: false,
            played_at: None,
        };

        let mut answers = Vec::with_capacity(seed.answers.len());
        for (index, a) in seed.answers.into_iter().enumerate() {
            let position = a.position.unwrap_or(index as u32 + 1);
            if answers.iter().any(|other: &Answer| other.position == position) {
                return Err(SeedError::DuplicatePosition(category.name, position));
            }
            answers.push(Answer {
                id: ulid::Ulid::new().to_string(),
                category_id: category.id.clone(),
                position,
                text: a.text,
                display_text: a.display_text,
                stat: a.stat,
            });
        }

        store.save_category(&category).await?;
        for answer in &answers {
            store.save_answer(answer).await?;
        }
        tracing::info!(
            "Loaded category '{}' with {} answers",
            category.name,
            answers.len()
        );
        added += 1;
    }
    Ok(added)
}

pub async fn load_categories_file(store: &dyn GameStore, path: &Path) -> Result<usize, SeedError> {
    let json = tokio::fs::read_to_string(path).await?;
    seed_categories(store, parse_categories(&json)?).await
}
