//! Sentiment wire types and response validation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SentimentError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

/// Which bound the model declares for its score.
///
/// The engine's internal scale is signed `[-1, 1]`; unit-scale scores are
/// normalized at validation time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreScale {
    /// `[-1, 1]`
    #[default]
    Signed,
    /// `[0, 1]`
    Unit,
}

/// Unvalidated model response, exactly as it came off the wire.
///
/// `key_phrases` stays as raw JSON values so that a non-string element is a
/// validation failure rather than a deserialization one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSentiment {
    pub sentiment: String,
    pub score: f64,
    #[serde(default)]
    pub key_phrases: Vec<serde_json::Value>,
    pub emotional_tone: String,
    #[serde(default)]
    pub scale: ScoreScale,
}

/// A validated, normalized sentiment. Immutable once cached: the engine
/// never rewrites an entry after the first successful computation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentResult {
    pub sentiment: Sentiment,
    /// Normalized to `[-1, 1]`.
    pub score: f32,
    pub key_phrases: Vec<String>,
    pub emotional_tone: String,
    pub analyzed_at: DateTime<Utc>,
}

/// Point-in-time aggregation over cached sentiment entries.
#[derive(Debug, Clone, Serialize)]
pub struct SentimentTrends {
    pub average_score: f32,
    pub total_reviews: usize,
    pub key_phrase_frequency: std::collections::BTreeMap<String, u32>,
}

/// Structurally validates a model response and normalizes it to the signed
/// score scale.
///
/// # Errors
///
/// Returns [`SentimentError::InvalidResponse`] when the sentiment label is
/// unknown, the score is non-finite or outside the declared bound, a key
/// phrase is not a string, or the emotional tone is empty.
pub fn validate(raw: RawSentiment) -> Result<SentimentResult, SentimentError> {
    let sentiment = match raw.sentiment.as_str() {
        "positive" => Sentiment::Positive,
        "negative" => Sentiment::Negative,
        "neutral" => Sentiment::Neutral,
        other => {
            return Err(SentimentError::InvalidResponse(format!(
                "unknown sentiment label '{other}'"
            )))
        }
    };

    if !raw.score.is_finite() {
        return Err(SentimentError::InvalidResponse(
            "score is not a finite number".to_owned(),
        ));
    }
    let (lo, hi) = match raw.scale {
        ScoreScale::Signed => (-1.0, 1.0),
        ScoreScale::Unit => (0.0, 1.0),
    };
    if raw.score < lo || raw.score > hi {
        return Err(SentimentError::InvalidResponse(format!(
            "score {} outside declared bound [{lo}, {hi}]",
            raw.score
        )));
    }
    #[allow(clippy::cast_possible_truncation)]
    let score = match raw.scale {
        ScoreScale::Signed => raw.score as f32,
        // Map [0, 1] onto [-1, 1].
        ScoreScale::Unit => (raw.score * 2.0 - 1.0) as f32,
    };

    let mut key_phrases = Vec::with_capacity(raw.key_phrases.len());
    for value in raw.key_phrases {
        match value {
            serde_json::Value::String(s) => key_phrases.push(s),
            other => {
                return Err(SentimentError::InvalidResponse(format!(
                    "key phrase is not a string: {other}"
                )))
            }
        }
    }

    if raw.emotional_tone.trim().is_empty() {
        return Err(SentimentError::InvalidResponse(
            "emotional_tone is empty".to_owned(),
        ));
    }

    Ok(SentimentResult {
        sentiment,
        score,
        key_phrases,
        emotional_tone: raw.emotional_tone,
        analyzed_at: Utc::now(),
    })
}
