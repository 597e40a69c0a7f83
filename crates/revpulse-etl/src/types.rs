//! Records and events produced by the pipeline.

use serde::{Deserialize, Serialize};

use revpulse_core::ReviewRecord;
use revpulse_sentiment::SentimentResult;

/// A review theme classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Theme {
    pub category: String,
    pub confidence: f32,
    /// Keyword hits for this category in the review text.
    pub frequency: u32,
}

/// A [`ReviewRecord`] augmented with sentiment and theme data.
///
/// Produced exactly once per review id by the orchestrator; persisting it is
/// an upsert, so redelivered jobs overwrite rather than duplicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedReview {
    /// The place/business the review belongs to — the fan-out topic.
    pub entity_id: String,
    pub review: ReviewRecord,
    pub sentiment: SentimentResult,
    pub themes: Vec<Theme>,
}

/// Pipeline event published for every processed review, successful or not.
#[derive(Debug, Clone)]
pub struct ReviewEvent {
    pub entity_id: String,
    pub kind: ReviewEventKind,
}

#[derive(Debug, Clone)]
pub enum ReviewEventKind {
    New(Box<EnrichedReview>),
    Error { message: String },
}
