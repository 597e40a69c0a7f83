//! Alert rule evaluation.
//!
//! Rules are owned by users, scoped to one tracked entity, and evaluated
//! after every processed batch (and after collection failures). A firing
//! rule enqueues a `notifications` job; delivery itself happens downstream.
//! One-time rules are deactivated as they fire so a persistent condition
//! does not notify on every batch.

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EtlError;
use crate::jobs::{Job, JobQueues, QUEUE_NOTIFICATIONS};
use crate::store::ReviewStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertRuleType {
    /// Average rating in the window dropped below the threshold.
    RatingThreshold,
    /// Review count in the window reached the threshold.
    ReviewVolume,
    /// Average sentiment score fell by at least the threshold versus the
    /// preceding window of equal length.
    SentimentDrop,
    /// A collection run for the entity failed.
    CollectionError,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AlertConditions {
    pub threshold: f32,
    /// Minimum reviews in the window before the rule may fire. Guards the
    /// rating and sentiment rules against single-review noise.
    pub sample_size: usize,
    pub window_secs: u64,
    /// Deactivate the rule after it first fires.
    pub one_time: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: Uuid,
    pub owner_id: String,
    pub entity_id: String,
    pub rule_type: AlertRuleType,
    pub conditions: AlertConditions,
    pub active: bool,
}

/// Windowed rollup the rules are evaluated against.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityAggregates {
    pub average_rating: f32,
    pub reviews_in_window: usize,
    /// Mean sentiment score of the window minus the mean of the preceding
    /// window of equal length. Zero when either window is empty.
    pub sentiment_delta: f32,
}

/// Widest rule window accepted: one year. Larger values are clamped so the
/// doubled lookback below can never overflow a chrono delta.
const MAX_WINDOW_SECS: u64 = 365 * 24 * 60 * 60;

async fn aggregates_for_window(
    store: &dyn ReviewStore,
    entity_id: &str,
    window_secs: u64,
) -> Result<EntityAggregates, EtlError> {
    #[allow(clippy::cast_possible_wrap)]
    let window = Duration::seconds(window_secs.min(MAX_WINDOW_SECS) as i64);
    let cutoff = Utc::now() - window;
    // One double-width fetch covers the active window and its predecessor.
    let all = store.enriched_for_entity(entity_id, window * 2).await?;

    let (recent, prior): (Vec<_>, Vec<_>) =
        all.into_iter().partition(|r| r.review.created_at >= cutoff);

    let mean_rating = |rs: &[crate::types::EnrichedReview]| {
        rs.iter().map(|r| r.review.rating).sum::<f32>() / rs.len() as f32
    };
    let mean_score = |rs: &[crate::types::EnrichedReview]| {
        rs.iter().map(|r| r.sentiment.score).sum::<f32>() / rs.len() as f32
    };

    let average_rating = if recent.is_empty() {
        0.0
    } else {
        mean_rating(&recent)
    };
    let sentiment_delta = if recent.is_empty() || prior.is_empty() {
        0.0
    } else {
        mean_score(&recent) - mean_score(&prior)
    };

    Ok(EntityAggregates {
        average_rating,
        reviews_in_window: recent.len(),
        sentiment_delta,
    })
}

fn rule_fires(rule: &AlertRule, agg: &EntityAggregates, collection_failed: bool) -> bool {
    let c = &rule.conditions;
    match rule.rule_type {
        AlertRuleType::RatingThreshold => {
            agg.reviews_in_window >= c.sample_size && agg.average_rating < c.threshold
        }
        AlertRuleType::ReviewVolume => agg.reviews_in_window as f32 >= c.threshold,
        AlertRuleType::SentimentDrop => {
            agg.reviews_in_window >= c.sample_size && agg.sentiment_delta <= -c.threshold
        }
        AlertRuleType::CollectionError => collection_failed,
    }
}

/// Evaluates every active rule for an entity and enqueues a notification job
/// per firing rule. Returns the number of rules that fired.
///
/// # Errors
///
/// Propagates store reads/writes and queue submission failures.
pub async fn evaluate_entity(
    store: &dyn ReviewStore,
    queues: &JobQueues,
    entity_id: &str,
    collection_failed: bool,
) -> Result<u32, EtlError> {
    let rules = store.alert_rules_for_entity(entity_id).await?;
    let mut fired = 0u32;

    for rule in rules.into_iter().filter(|r| r.active) {
        let agg = aggregates_for_window(store, entity_id, rule.conditions.window_secs).await?;
        if !rule_fires(&rule, &agg, collection_failed) {
            continue;
        }

        tracing::info!(
            entity_id,
            rule_id = %rule.id,
            rule_type = ?rule.rule_type,
            "alert rule fired"
        );
        queues.enqueue(
            QUEUE_NOTIFICATIONS,
            Job::new(
                "alert",
                serde_json::json!({
                    "businessId": entity_id,
                    "notificationData": {
                        "ruleId": rule.id,
                        "ruleType": rule.rule_type,
                        "aggregates": agg,
                    },
                    "channels": ["dashboard", "email"],
                }),
            ),
        )?;
        fired += 1;

        if rule.conditions.one_time {
            store.deactivate_alert_rule(rule.id).await?;
        }
    }

    Ok(fired)
}
