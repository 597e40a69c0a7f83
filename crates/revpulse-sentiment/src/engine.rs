//! The sentiment engine: cached on-demand analysis plus queued batch mode.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::Mutex;

use revpulse_core::AppConfig;

use crate::cache::SentimentCache;
use crate::error::SentimentError;
use crate::model::SentimentModel;
use crate::retry::retry_with_backoff;
use crate::types::{validate, SentimentResult, SentimentTrends};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum items drained per batch tick.
    pub batch_size: usize,
    /// Interval between batch drain ticks.
    pub processing_interval: Duration,
    /// Total model-call attempts per item (retryable failures only).
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    /// TTL applied to cached sentiment entries.
    pub cache_ttl_secs: u64,
}

impl EngineConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        EngineConfig {
            batch_size: config.sentiment_batch_size,
            processing_interval: Duration::from_millis(config.sentiment_interval_ms),
            max_attempts: config.sentiment_max_attempts,
            backoff_base_ms: config.sentiment_backoff_base_ms,
            cache_ttl_secs: config.sentiment_cache_ttl_secs,
        }
    }
}

struct QueuedReview {
    review_id: String,
    text: String,
}

/// Analyzes review text through an external model, caching results by review
/// id.
///
/// Two access modes:
/// - [`SentimentEngine::analyze`]: synchronous on-demand analysis. Cache-first
///   with per-key single-flight — concurrent misses for one review id
///   coalesce into a single model call.
/// - [`SentimentEngine::queue`] + the drain loop: queued batch analysis. At
///   most one batch is in flight at a time; a tick that lands mid-drain is a
///   no-op, and items queued during a drain wait for the next tick.
///
/// Cache entries are written once and never invalidated here; eviction is
/// the cache collaborator's concern.
pub struct SentimentEngine {
    model: Arc<dyn SentimentModel>,
    cache: Arc<dyn SentimentCache>,
    config: EngineConfig,
    queue: Mutex<VecDeque<QueuedReview>>,
    batch_in_flight: AtomicBool,
    key_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SentimentEngine {
    #[must_use]
    pub fn new(
        model: Arc<dyn SentimentModel>,
        cache: Arc<dyn SentimentCache>,
        config: EngineConfig,
    ) -> Self {
        SentimentEngine {
            model,
            cache,
            config,
            queue: Mutex::new(VecDeque::new()),
            batch_in_flight: AtomicBool::new(false),
            key_locks: Mutex::new(HashMap::new()),
        }
    }

    fn cache_key(review_id: &str) -> String {
        format!("sentiment:{review_id}")
    }

    /// Analyzes one review, serving from cache when possible.
    ///
    /// On a miss the model is called with bounded retry/backoff for
    /// retryable failures, the response is structurally validated, and the
    /// result is stored under `sentiment:<review_id>` with the configured
    /// TTL.
    ///
    /// # Errors
    ///
    /// Surfaces the final model error after retries are exhausted, or
    /// [`SentimentError::InvalidResponse`] for a response that fails
    /// validation.
    pub async fn analyze(
        &self,
        review_id: &str,
        text: &str,
    ) -> Result<SentimentResult, SentimentError> {
        let key = Self::cache_key(review_id);
        if let Some(hit) = self.cached(&key).await? {
            return Ok(hit);
        }

        // Single-flight: one computation per key; followers block here and
        // then find the cache populated.
        let key_lock = {
            let mut locks = self.key_locks.lock().await;
            Arc::clone(locks.entry(key.clone()).or_default())
        };
        let guard = key_lock.lock().await;
        let result = self.analyze_miss(&key, text).await;

        // The map entry goes on every exit, success or not; followers still
        // hold their own Arc to the mutex.
        drop(guard);
        self.key_locks.lock().await.remove(&key);
        result
    }

    async fn analyze_miss(&self, key: &str, text: &str) -> Result<SentimentResult, SentimentError> {
        if let Some(hit) = self.cached(key).await? {
            return Ok(hit);
        }

        let raw = retry_with_backoff(self.config.max_attempts, self.config.backoff_base_ms, || {
            self.model.analyze(text)
        })
        .await?;
        let result = validate(raw)?;

        let json = serde_json::to_string(&result).map_err(|e| SentimentError::Deserialize {
            context: key.to_owned(),
            source: e,
        })?;
        self.cache
            .setex(key, self.config.cache_ttl_secs, &json)
            .await?;
        Ok(result)
    }

    async fn cached(&self, key: &str) -> Result<Option<SentimentResult>, SentimentError> {
        match self.cache.get(key).await? {
            None => Ok(None),
            Some(json) => match serde_json::from_str(&json) {
                Ok(result) => Ok(Some(result)),
                Err(e) => {
                    // A corrupt entry is treated as a miss and recomputed.
                    tracing::warn!(key, error = %e, "unreadable cached sentiment entry");
                    Ok(None)
                }
            },
        }
    }

    /// Queues a review for the next batch drain.
    pub async fn queue(&self, review_id: &str, text: &str) {
        self.queue.lock().await.push_back(QueuedReview {
            review_id: review_id.to_owned(),
            text: text.to_owned(),
        });
    }

    pub async fn queued_len(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// Drains up to `batch_size` queued items as one batch.
    ///
    /// Items settle independently: each outcome is matched back to its
    /// review id, and one item's failure never aborts its siblings. Returns
    /// an empty list when another batch is already in flight (the component
    /// is not reentrant) or the queue is empty.
    pub async fn drain_batch(&self) -> Vec<(String, Result<SentimentResult, SentimentError>)> {
        if self.batch_in_flight.swap(true, Ordering::SeqCst) {
            return Vec::new();
        }

        let items: Vec<QueuedReview> = {
            let mut queue = self.queue.lock().await;
            let take = self.config.batch_size.min(queue.len());
            queue.drain(..take).collect()
        };
        if items.is_empty() {
            self.batch_in_flight.store(false, Ordering::SeqCst);
            return Vec::new();
        }

        tracing::debug!(count = items.len(), "draining sentiment batch");
        let results = join_all(items.into_iter().map(|item| async move {
            let result = self.analyze(&item.review_id, &item.text).await;
            (item.review_id, result)
        }))
        .await;

        self.batch_in_flight.store(false, Ordering::SeqCst);
        results
    }

    /// Spawns the periodic drain loop. Missed ticks during an in-flight
    /// drain are skipped, not bursted.
    #[must_use]
    pub fn spawn_drain_loop(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(engine.config.processing_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let results = engine.drain_batch().await;
                let failed = results.iter().filter(|(_, r)| r.is_err()).count();
                if failed > 0 {
                    tracing::warn!(
                        total = results.len(),
                        failed,
                        "sentiment batch completed with item failures"
                    );
                }
            }
        })
    }

    /// Aggregates cached sentiment entries analyzed within `window`.
    ///
    /// Point-in-time, read-only, O(n) over the cache — acceptable because
    /// entries are bounded by the cache TTL.
    ///
    /// # Errors
    ///
    /// Returns [`SentimentError::Cache`]-class errors from the underlying
    /// cache scan.
    pub async fn trends(&self, window: Duration) -> Result<SentimentTrends, SentimentError> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::zero());

        let keys = self.cache.keys("sentiment:*").await?;
        let mut total = 0usize;
        let mut score_sum = 0.0f32;
        let mut frequency = std::collections::BTreeMap::new();

        for key in keys {
            let Some(result) = self.cached(&key).await? else {
                continue;
            };
            if result.analyzed_at < cutoff {
                continue;
            }
            total += 1;
            score_sum += result.score;
            for phrase in result.key_phrases {
                *frequency.entry(phrase).or_insert(0u32) += 1;
            }
        }

        #[allow(clippy::cast_precision_loss)]
        let average_score = if total == 0 {
            0.0
        } else {
            score_sum / total as f32
        };
        Ok(SentimentTrends {
            average_score,
            total_reviews: total,
            key_phrase_frequency: frequency,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::types::{RawSentiment, ScoreScale, Sentiment};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;

    /// Responds based on the text: texts containing "invalid" get a response
    /// that fails validation, everything else is positive 0.8.
    struct ScriptedModel {
        calls: AtomicU32,
        delay: Duration,
    }

    impl ScriptedModel {
        fn new() -> Self {
            ScriptedModel {
                calls: AtomicU32::new(0),
                delay: Duration::ZERO,
            }
        }

        fn with_delay(delay: Duration) -> Self {
            ScriptedModel {
                calls: AtomicU32::new(0),
                delay,
            }
        }

        fn call_count(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SentimentModel for ScriptedModel {
        async fn analyze(&self, text: &str) -> Result<RawSentiment, SentimentError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let sentiment = if text.contains("invalid") {
                "angry"
            } else {
                "positive"
            };
            Ok(RawSentiment {
                sentiment: sentiment.to_owned(),
                score: 0.8,
                key_phrases: vec!["great".into()],
                emotional_tone: "enthusiastic".to_owned(),
                scale: ScoreScale::Signed,
            })
        }
    }

    fn engine_with(model: Arc<ScriptedModel>, batch_size: usize) -> Arc<SentimentEngine> {
        Arc::new(SentimentEngine::new(
            model,
            Arc::new(MemoryCache::new()),
            EngineConfig {
                batch_size,
                processing_interval: Duration::from_millis(100),
                max_attempts: 3,
                backoff_base_ms: 0,
                cache_ttl_secs: 3600,
            },
        ))
    }

    #[tokio::test]
    async fn second_analyze_is_served_from_cache() {
        let model = Arc::new(ScriptedModel::new());
        let engine = engine_with(Arc::clone(&model), 10);

        let first = engine.analyze("rev-1", "Great place!").await.unwrap();
        let second = engine.analyze("rev-1", "Great place!").await.unwrap();

        assert_eq!(model.call_count(), 1);
        assert_eq!(first.sentiment, Sentiment::Positive);
        // The cached value comes back unchanged, timestamp included.
        assert_eq!(first.analyzed_at, second.analyzed_at);
        assert_eq!(first.key_phrases, second.key_phrases);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_misses_coalesce_into_one_model_call() {
        let model = Arc::new(ScriptedModel::with_delay(Duration::from_millis(50)));
        let engine = engine_with(Arc::clone(&model), 10);

        let a = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.analyze("rev-1", "Great place!").await })
        };
        let b = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.analyze("rev-1", "Great place!").await })
        };

        assert!(a.await.unwrap().is_ok());
        assert!(b.await.unwrap().is_ok());
        assert_eq!(model.call_count(), 1);
    }

    #[tokio::test]
    async fn failed_analyses_release_their_key_locks() {
        let model = Arc::new(ScriptedModel::new());
        let engine = engine_with(Arc::clone(&model), 10);

        for i in 0..20 {
            let err = engine
                .analyze(&format!("rev-{i}"), "invalid review")
                .await
                .unwrap_err();
            assert!(matches!(err, SentimentError::InvalidResponse(_)));
        }

        assert!(
            engine.key_locks.lock().await.is_empty(),
            "key lock map must not retain entries for failed analyses"
        );
    }

    #[tokio::test]
    async fn batch_items_settle_independently() {
        let model = Arc::new(ScriptedModel::new());
        let engine = engine_with(Arc::clone(&model), 10);

        for i in 0..5 {
            let text = if i == 1 {
                "invalid review".to_owned()
            } else {
                format!("nice review {i}")
            };
            engine.queue(&format!("rev-{i}"), &text).await;
        }

        let mut results = engine.drain_batch().await;
        results.sort_by(|a, b| a.0.cmp(&b.0));

        assert_eq!(results.len(), 5);
        assert!(results[1].1.is_err(), "item 2 must fail validation");
        for (i, (id, result)) in results.iter().enumerate() {
            assert_eq!(id, &format!("rev-{i}"));
            if i != 1 {
                assert!(result.is_ok(), "sibling item {i} must still succeed");
            }
        }
    }

    #[tokio::test]
    async fn drain_respects_batch_size_and_leaves_the_rest_queued() {
        let model = Arc::new(ScriptedModel::new());
        let engine = engine_with(Arc::clone(&model), 5);

        for i in 0..7 {
            engine.queue(&format!("rev-{i}"), "fine").await;
        }

        let results = engine.drain_batch().await;
        assert_eq!(results.len(), 5);
        assert_eq!(engine.queued_len().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn tick_is_a_noop_while_a_batch_is_in_flight() {
        let model = Arc::new(ScriptedModel::with_delay(Duration::from_millis(100)));
        let engine = engine_with(Arc::clone(&model), 10);
        engine.queue("rev-1", "fine").await;

        let in_flight = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.drain_batch().await })
        };
        tokio::task::yield_now().await;

        // Second drain while the first is mid-batch: no-op.
        assert!(engine.drain_batch().await.is_empty());

        let results = in_flight.await.unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn trends_window_filters_old_entries() {
        let model = Arc::new(ScriptedModel::new());
        let cache = Arc::new(MemoryCache::new());
        let engine = SentimentEngine::new(
            model,
            Arc::clone(&cache) as Arc<dyn SentimentCache>,
            EngineConfig {
                batch_size: 10,
                processing_interval: Duration::from_millis(100),
                max_attempts: 1,
                backoff_base_ms: 0,
                cache_ttl_secs: 3600,
            },
        );

        let recent = SentimentResult {
            sentiment: Sentiment::Positive,
            score: 0.6,
            key_phrases: vec!["service".to_owned()],
            emotional_tone: "happy".to_owned(),
            analyzed_at: Utc::now(),
        };
        let stale = SentimentResult {
            sentiment: Sentiment::Negative,
            score: -0.9,
            key_phrases: vec!["wait".to_owned()],
            emotional_tone: "frustrated".to_owned(),
            analyzed_at: Utc::now() - chrono::Duration::hours(2),
        };
        cache
            .set("sentiment:new", &serde_json::to_string(&recent).unwrap())
            .await
            .unwrap();
        cache
            .set("sentiment:old", &serde_json::to_string(&stale).unwrap())
            .await
            .unwrap();

        let trends = engine.trends(Duration::from_secs(3600)).await.unwrap();
        assert_eq!(trends.total_reviews, 1);
        assert!((trends.average_score - 0.6).abs() < 1e-6);
        assert_eq!(trends.key_phrase_frequency.get("service"), Some(&1));
        assert!(!trends.key_phrase_frequency.contains_key("wait"));
    }

    #[tokio::test]
    async fn trends_on_empty_cache_is_neutral() {
        let model = Arc::new(ScriptedModel::new());
        let engine = engine_with(model, 10);
        let trends = engine.trends(Duration::from_secs(60)).await.unwrap();
        assert_eq!(trends.total_reviews, 0);
        assert!((trends.average_score).abs() < f32::EPSILON);
    }
}
