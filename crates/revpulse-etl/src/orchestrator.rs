//! The pipeline hub: collection → enrichment → persistence → events.

use std::sync::Arc;

use futures::future::join_all;
use serde::Deserialize;
use tokio::sync::broadcast;

use revpulse_core::{Platform, ReviewRecord};
use revpulse_collectors::CollectorRegistry;
use revpulse_sentiment::SentimentEngine;

use crate::alerts;
use crate::error::EtlError;
use crate::jobs::{
    Job, JobOptions, JobQueues, QUEUE_DATA_COLLECTION, QUEUE_ETL, QUEUE_NOTIFICATIONS,
    QUEUE_SENTIMENT,
};
use crate::store::{ReviewStore, TrackedEntity};
use crate::themes::extract_themes;
use crate::types::{EnrichedReview, ReviewEvent, ReviewEventKind};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Outcome of one `process_reviews` run.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessSummary {
    pub processed: usize,
    pub failed: usize,
    pub alerts_fired: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EtlJobPayload {
    entity_id: String,
    reviews: Vec<ReviewRecord>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CollectionJobPayload {
    entity_id: String,
    platform: Platform,
    external_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SentimentJobPayload {
    review_id: String,
    text: String,
}

/// Coordinates collectors, the sentiment engine, the store, the job queues,
/// and the realtime event channel. One instance per process, shared behind
/// an `Arc`.
pub struct Orchestrator {
    registry: Arc<CollectorRegistry>,
    engine: Arc<SentimentEngine>,
    store: Arc<dyn ReviewStore>,
    queues: Arc<JobQueues>,
    events: broadcast::Sender<ReviewEvent>,
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        registry: Arc<CollectorRegistry>,
        engine: Arc<SentimentEngine>,
        store: Arc<dyn ReviewStore>,
        queues: Arc<JobQueues>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Orchestrator {
            registry,
            engine,
            store,
            queues,
            events,
        }
    }

    /// Subscribes to the pipeline event stream. Slow subscribers that fall
    /// more than the channel capacity behind lose the oldest events.
    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<ReviewEvent> {
        self.events.subscribe()
    }

    /// Enriches, persists, and publishes a batch of raw reviews for one
    /// entity, then evaluates the entity's alert rules.
    ///
    /// Reviews are processed concurrently and settle independently: one bad
    /// review fails alone and the rest of the batch lands. Reprocessing a
    /// review id overwrites its stored enrichment, so redelivered jobs are
    /// harmless.
    ///
    /// # Errors
    ///
    /// Only alert evaluation errors propagate; per-review failures are
    /// counted in the summary and published as error events.
    pub async fn process_reviews(
        &self,
        entity_id: &str,
        reviews: Vec<ReviewRecord>,
    ) -> Result<ProcessSummary, EtlError> {
        let outcomes = join_all(
            reviews
                .into_iter()
                .map(|review| self.process_one(entity_id, review)),
        )
        .await;

        let mut summary = ProcessSummary::default();
        for outcome in outcomes {
            match outcome {
                Ok(()) => summary.processed += 1,
                Err(_) => summary.failed += 1,
            }
        }

        summary.alerts_fired =
            alerts::evaluate_entity(self.store.as_ref(), &self.queues, entity_id, false).await?;

        tracing::info!(
            entity_id,
            processed = summary.processed,
            failed = summary.failed,
            alerts_fired = summary.alerts_fired,
            "review batch processed"
        );
        Ok(summary)
    }

    async fn process_one(&self, entity_id: &str, review: ReviewRecord) -> Result<(), EtlError> {
        let result = self.enrich_and_store(entity_id, review).await;
        match &result {
            Ok(enriched) => {
                // Nobody listening is fine; events are best-effort.
                let _ = self.events.send(ReviewEvent {
                    entity_id: entity_id.to_owned(),
                    kind: ReviewEventKind::New(Box::new(enriched.clone())),
                });
            }
            Err(err) => {
                tracing::warn!(entity_id, error = %err, "review enrichment failed");
                let _ = self.events.send(ReviewEvent {
                    entity_id: entity_id.to_owned(),
                    kind: ReviewEventKind::Error {
                        message: err.to_string(),
                    },
                });
            }
        }
        result.map(|_| ())
    }

    async fn enrich_and_store(
        &self,
        entity_id: &str,
        review: ReviewRecord,
    ) -> Result<EnrichedReview, EtlError> {
        let sentiment = self.engine.analyze(&review.id, &review.content).await?;
        let themes = extract_themes(&review.content);

        let enriched = EnrichedReview {
            entity_id: entity_id.to_owned(),
            review,
            sentiment,
            themes,
        };
        self.store.upsert_enriched(&enriched).await?;
        Ok(enriched)
    }

    /// Fetches fresh reviews for a tracked entity and hands them to the
    /// `etl` queue. A collection failure evaluates the entity's
    /// collection-error alert rules before propagating.
    ///
    /// # Errors
    ///
    /// Collector and queue failures propagate; [`EtlError::NoCollector`]
    /// when the entity's platform has no configured collector.
    pub async fn run_collection(&self, entity: &TrackedEntity) -> Result<usize, EtlError> {
        let collector = self
            .registry
            .get(entity.platform)
            .ok_or(EtlError::NoCollector(entity.platform))?;

        match collector.get_reviews(&entity.external_id).await {
            Ok(reviews) => {
                let count = reviews.len();
                tracing::info!(
                    entity_id = %entity.entity_id,
                    platform = %entity.platform,
                    count,
                    "collection run complete"
                );
                self.queues.enqueue(
                    QUEUE_ETL,
                    Job::new(
                        "processReviews",
                        serde_json::json!({
                            "entityId": entity.entity_id,
                            "reviews": reviews,
                        }),
                    ),
                )?;
                Ok(count)
            }
            Err(err) => {
                tracing::warn!(
                    entity_id = %entity.entity_id,
                    platform = %entity.platform,
                    error = %err,
                    "collection run failed"
                );
                alerts::evaluate_entity(self.store.as_ref(), &self.queues, &entity.entity_id, true)
                    .await?;
                Err(err.into())
            }
        }
    }

    /// Wires the orchestrator to all four job queues.
    ///
    /// # Errors
    ///
    /// Fails if any queue already has a processor.
    pub fn register_job_processors(
        self: &Arc<Self>,
        options: JobOptions,
    ) -> Result<Vec<tokio::task::JoinHandle<()>>, EtlError> {
        let mut handles = Vec::with_capacity(4);

        let this = Arc::clone(self);
        handles.push(self.queues.register_processor(
            QUEUE_DATA_COLLECTION,
            options.clone(),
            move |job| {
                let this = Arc::clone(&this);
                async move {
                    let payload: CollectionJobPayload = parse_payload(QUEUE_DATA_COLLECTION, job)?;
                    let entity = TrackedEntity {
                        entity_id: payload.entity_id,
                        platform: payload.platform,
                        external_id: payload.external_id,
                        name: String::new(),
                    };
                    this.run_collection(&entity).await.map(|_| ())
                }
            },
        )?);

        let this = Arc::clone(self);
        handles.push(
            self.queues
                .register_processor(QUEUE_ETL, options.clone(), move |job| {
                    let this = Arc::clone(&this);
                    async move {
                        let payload: EtlJobPayload = parse_payload(QUEUE_ETL, job)?;
                        this.process_reviews(&payload.entity_id, payload.reviews)
                            .await
                            .map(|_| ())
                    }
                })?,
        );

        let this = Arc::clone(self);
        handles.push(
            self.queues
                .register_processor(QUEUE_SENTIMENT, options.clone(), move |job| {
                    let this = Arc::clone(&this);
                    async move {
                        let payload: SentimentJobPayload = parse_payload(QUEUE_SENTIMENT, job)?;
                        this.engine.queue(&payload.review_id, &payload.text).await;
                        Ok(())
                    }
                })?,
        );

        // Delivery itself belongs to the notification collaborators; here we
        // only log the dispatch.
        handles.push(
            self.queues
                .register_processor(QUEUE_NOTIFICATIONS, options, move |job| async move {
                    tracing::info!(
                        business_id = %job.payload["businessId"],
                        channels = %job.payload["channels"],
                        "alert notification dispatched"
                    );
                    Ok(())
                })?,
        );

        Ok(handles)
    }
}

fn parse_payload<T: serde::de::DeserializeOwned>(queue: &str, job: Job) -> Result<T, EtlError> {
    serde_json::from_value(job.payload).map_err(|source| EtlError::Payload {
        context: format!("{queue}/{}", job.job_type),
        source,
    })
}
