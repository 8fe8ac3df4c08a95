//! Fuzzy resolution of free-text player input against a category's answers.
//!
//! Stages run in order and each one scans the whole answer list before the
//! next stage is tried, so a weak match on a high-ranked answer never beats a
//! strong match further down the list:
//!
//! 1. exact (case-insensitive) on the answer text
//! 2. exact (case-insensitive) on the alternate/display text
//! 3. normalized equality on either text
//! 4. containment either way, when the shorter side has at least 4 characters
//! 5. closest Levenshtein distance (≤2 for targets longer than 5 chars, else ≤1)

use crate::types::Answer;

/// Articles stripped from the front of an answer before comparing
const LEADING_ARTICLES: &[&str] = &[
    "the", "a", "an", "el", "la", "los", "las", "le", "les", "der", "die", "das",
];

const MIN_CONTAINMENT_CHARS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Exact,
    ExactDisplay,
    Normalized,
    Containment,
    EditDistance(usize),
}

#[derive(Debug, Clone, Copy)]
pub struct Match<'a> {
    pub answer: &'a Answer,
    pub kind: MatchKind,
}

/// Lowercase, drop one leading article, drop punctuation, collapse whitespace
pub fn normalize(text: &str) -> String {
    let lowered = text.trim().to_lowercase();

    let without_article = match lowered.split_once(char::is_whitespace) {
        Some((first, rest)) if LEADING_ARTICLES.contains(&first) && !rest.trim().is_empty() => {
            rest
        }
        _ => lowered.as_str(),
    };

    let stripped: String = without_article
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();

    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Classic two-row Levenshtein over chars
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

fn edit_threshold(target: &str) -> usize {
    if target.chars().count() > 5 {
        2
    } else {
        1
    }
}

/// Both searchable names of an answer, primary first
fn names(answer: &Answer) -> impl Iterator<Item = &str> {
    std::iter::once(answer.text.as_str()).chain(answer.display_text.as_deref())
}

/// Resolve input to at most one answer; `None` means "not on list"
pub fn find_match<'a>(input: &str, answers: &'a [Answer]) -> Option<Match<'a>> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    let mut ranked: Vec<&Answer> = answers.iter().collect();
    ranked.sort_by_key(|a| a.position);

    let lowered = input.to_lowercase();
    let found = |answer: &'a Answer, kind| Some(Match { answer, kind });

    if let Some(a) = ranked
        .iter()
        .find(|a| a.text.trim().to_lowercase() == lowered)
    {
        return found(*a, MatchKind::Exact);
    }

    if let Some(a) = ranked.iter().find(|a| {
        a.display_text
            .as_deref()
            .is_some_and(|d| d.trim().to_lowercase() == lowered)
    }) {
        return found(*a, MatchKind::ExactDisplay);
    }

    let normalized = normalize(input);
    if normalized.is_empty() {
        return None;
    }

    if let Some(a) = ranked
        .iter()
        .find(|a| names(a).any(|n| normalize(n) == normalized))
    {
        return found(*a, MatchKind::Normalized);
    }

    if let Some(a) = ranked.iter().find(|a| {
        names(a).any(|n| {
            let target = normalize(n);
            let shorter = normalized.chars().count().min(target.chars().count());
            shorter >= MIN_CONTAINMENT_CHARS
                && (target.contains(&normalized) || normalized.contains(&target))
        })
    }) {
        return found(*a, MatchKind::Containment);
    }

    let mut best: Option<(&Answer, usize)> = None;
    for a in &ranked {
        for n in names(a) {
            let target = normalize(n);
            if target.is_empty() {
                continue;
            }
            let distance = levenshtein(&normalized, &target);
            if distance > edit_threshold(&target) {
                continue;
            }
            // strict comparison keeps the earliest (lowest position) on ties
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((*a, distance));
            }
        }
    }

    best.map(|(answer, d)| Match {
        answer,
        kind: MatchKind::EditDistance(d),
    })
}
