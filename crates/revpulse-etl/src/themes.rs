//! Keyword-based theme classification for review text.

use crate::types::Theme;

/// Category keyword table. Keys are lowercase single words; a review matches
/// a category when any of its words hit the category's list.
const THEME_LEXICON: &[(&str, &[&str])] = &[
    (
        "service",
        &[
            "service", "staff", "waiter", "waitress", "server", "friendly", "rude", "helpful",
            "attentive",
        ],
    ),
    (
        "food_quality",
        &[
            "food", "delicious", "tasty", "bland", "fresh", "stale", "flavor", "menu", "dish",
            "undercooked", "overcooked",
        ],
    ),
    (
        "cleanliness",
        &["clean", "dirty", "spotless", "filthy", "hygiene", "tidy"],
    ),
    (
        "value",
        &[
            "price", "prices", "expensive", "cheap", "value", "overpriced", "affordable", "worth",
        ],
    ),
    (
        "atmosphere",
        &[
            "atmosphere", "ambiance", "cozy", "loud", "noisy", "music", "decor", "vibe",
        ],
    ),
    (
        "wait_time",
        &["wait", "waited", "slow", "quick", "fast", "queue", "line"],
    ),
];

/// Classifies review text into themed categories with a confidence score.
///
/// Confidence starts at 0.6 for a single keyword hit and grows 0.1 per
/// additional hit, capped at 0.95; `frequency` is the raw hit count. Text
/// matching no category yields an empty list — the pipeline treats missing
/// themes as a degraded, not failed, enrichment.
#[must_use]
pub fn extract_themes(text: &str) -> Vec<Theme> {
    let words: Vec<String> = text
        .split_whitespace()
        .map(|word| {
            word.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect();

    let mut themes = Vec::new();
    for &(category, keywords) in THEME_LEXICON {
        let frequency = words
            .iter()
            .filter(|w| keywords.contains(&w.as_str()))
            .count();
        if frequency == 0 {
            continue;
        }
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
        let confidence = (0.6 + 0.1 * (frequency as f32 - 1.0)).min(0.95);
        #[allow(clippy::cast_possible_truncation)]
        themes.push(Theme {
            category: category.to_owned(),
            confidence,
            frequency: frequency as u32,
        });
    }
    themes
}
