//! Opaque persistence boundary for enriched reviews, tracked entities, and
//! alert rules.
//!
//! The pipeline only needs record CRUD; schema and indexing belong to the
//! storage collaborator behind this trait. [`MemoryStore`] is the in-process
//! implementation used by the server and by tests.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use revpulse_core::Platform;

use crate::alerts::AlertRule;
use crate::types::EnrichedReview;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage write failed: {0}")]
    Write(String),

    #[error("storage read failed: {0}")]
    Read(String),
}

/// A business whose reviews the pipeline tracks, keyed by the pipeline-level
/// entity id and carrying the platform-native id collectors need.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TrackedEntity {
    pub entity_id: String,
    pub platform: Platform,
    pub external_id: String,
    pub name: String,
}

#[async_trait]
pub trait ReviewStore: Send + Sync {
    /// Upserts keyed on `review.id`: reprocessing the same review overwrites
    /// the stored enrichment instead of duplicating it.
    async fn upsert_enriched(&self, enriched: &EnrichedReview) -> Result<(), StoreError>;

    /// Enriched reviews for an entity whose review `created_at` falls within
    /// the trailing `window`.
    async fn enriched_for_entity(
        &self,
        entity_id: &str,
        window: Duration,
    ) -> Result<Vec<EnrichedReview>, StoreError>;

    async fn list_entities(&self) -> Result<Vec<TrackedEntity>, StoreError>;

    async fn upsert_entity(&self, entity: &TrackedEntity) -> Result<(), StoreError>;

    async fn alert_rules_for_entity(&self, entity_id: &str) -> Result<Vec<AlertRule>, StoreError>;

    async fn insert_alert_rule(&self, rule: &AlertRule) -> Result<(), StoreError>;

    /// Marks a rule inactive; used for one-time rules after they fire.
    async fn deactivate_alert_rule(&self, rule_id: Uuid) -> Result<(), StoreError>;
}

#[derive(Default)]
pub struct MemoryStore {
    reviews: RwLock<HashMap<String, EnrichedReview>>,
    entities: RwLock<HashMap<String, TrackedEntity>>,
    rules: RwLock<Vec<AlertRule>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        MemoryStore::default()
    }

    pub async fn review_count(&self) -> usize {
        self.reviews.read().await.len()
    }
}

#[async_trait]
impl ReviewStore for MemoryStore {
    async fn upsert_enriched(&self, enriched: &EnrichedReview) -> Result<(), StoreError> {
        self.reviews
            .write()
            .await
            .insert(enriched.review.id.clone(), enriched.clone());
        Ok(())
    }

    async fn enriched_for_entity(
        &self,
        entity_id: &str,
        window: Duration,
    ) -> Result<Vec<EnrichedReview>, StoreError> {
        let cutoff = Utc::now() - window;
        Ok(self
            .reviews
            .read()
            .await
            .values()
            .filter(|r| r.entity_id == entity_id && r.review.created_at >= cutoff)
            .cloned()
            .collect())
    }

    async fn list_entities(&self) -> Result<Vec<TrackedEntity>, StoreError> {
        Ok(self.entities.read().await.values().cloned().collect())
    }

    async fn upsert_entity(&self, entity: &TrackedEntity) -> Result<(), StoreError> {
        self.entities
            .write()
            .await
            .insert(entity.entity_id.clone(), entity.clone());
        Ok(())
    }

    async fn alert_rules_for_entity(&self, entity_id: &str) -> Result<Vec<AlertRule>, StoreError> {
        Ok(self
            .rules
            .read()
            .await
            .iter()
            .filter(|rule| rule.entity_id == entity_id)
            .cloned()
            .collect())
    }

    async fn insert_alert_rule(&self, rule: &AlertRule) -> Result<(), StoreError> {
        self.rules.write().await.push(rule.clone());
        Ok(())
    }

    async fn deactivate_alert_rule(&self, rule_id: Uuid) -> Result<(), StoreError> {
        let mut rules = self.rules.write().await;
        match rules.iter_mut().find(|rule| rule.id == rule_id) {
            Some(rule) => {
                rule.active = false;
                Ok(())
            }
            None => Err(StoreError::Write(format!("no such alert rule: {rule_id}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{AlertConditions, AlertRuleType};
    use revpulse_core::ReviewRecord;
    use revpulse_sentiment::{Sentiment, SentimentResult};

    fn enriched(id: &str, entity: &str, age_hours: i64) -> EnrichedReview {
        EnrichedReview {
            entity_id: entity.to_owned(),
            review: ReviewRecord {
                id: id.to_owned(),
                rating: 4.0,
                content: "fine".to_owned(),
                platform: Platform::Google,
                created_at: Utc::now() - Duration::hours(age_hours),
                metadata: serde_json::Map::new(),
            },
            sentiment: SentimentResult {
                sentiment: Sentiment::Positive,
                score: 0.5,
                key_phrases: Vec::new(),
                emotional_tone: "calm".to_owned(),
                analyzed_at: Utc::now(),
            },
            themes: Vec::new(),
        }
    }

    #[tokio::test]
    async fn upsert_is_idempotent_on_review_id() {
        let store = MemoryStore::new();
        store.upsert_enriched(&enriched("r1", "e1", 0)).await.unwrap();
        store.upsert_enriched(&enriched("r1", "e1", 0)).await.unwrap();
        assert_eq!(store.review_count().await, 1);
    }

    #[tokio::test]
    async fn windowed_fetch_excludes_old_reviews() {
        let store = MemoryStore::new();
        store.upsert_enriched(&enriched("new", "e1", 1)).await.unwrap();
        store.upsert_enriched(&enriched("old", "e1", 48)).await.unwrap();
        store.upsert_enriched(&enriched("other", "e2", 1)).await.unwrap();

        let recent = store
            .enriched_for_entity("e1", Duration::hours(24))
            .await
            .unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].review.id, "new");
    }

    #[tokio::test]
    async fn deactivate_flips_the_rule() {
        let store = MemoryStore::new();
        let rule = AlertRule {
            id: Uuid::new_v4(),
            owner_id: "owner".to_owned(),
            entity_id: "e1".to_owned(),
            rule_type: AlertRuleType::RatingThreshold,
            conditions: AlertConditions {
                threshold: 3.0,
                sample_size: 1,
                window_secs: 3600,
                one_time: true,
            },
            active: true,
        };
        store.insert_alert_rule(&rule).await.unwrap();
        store.deactivate_alert_rule(rule.id).await.unwrap();

        let rules = store.alert_rules_for_entity("e1").await.unwrap();
        assert!(!rules[0].active);
    }
}
