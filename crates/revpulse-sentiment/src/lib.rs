//! Sentiment analysis engine for revpulse.
//!
//! Converts review text into [`SentimentResult`]s via an external model,
//! with a response cache keyed by review id, a queued batch mode drained on
//! a timer, and point-in-time trend aggregation over the cached window.

pub mod cache;
pub mod engine;
pub mod error;
pub mod model;
pub mod types;

mod retry;

pub use cache::{MemoryCache, SentimentCache};
pub use engine::{EngineConfig, SentimentEngine};
pub use error::SentimentError;
pub use model::{HttpSentimentModel, SentimentModel};
pub use types::{RawSentiment, ScoreScale, Sentiment, SentimentResult, SentimentTrends};
