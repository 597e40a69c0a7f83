//! Background job scheduler.
//!
//! Initialises a [`JobScheduler`] at server startup and registers the
//! recurring collection sweep: every six hours each tracked entity gets a
//! `dataCollection` job, and the queue's retry policy takes it from there.

use std::sync::Arc;

use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use revpulse_etl::{JobQueues, ReviewStore, QUEUE_DATA_COLLECTION};

const COLLECTION_SWEEP_CRON: &str = "0 0 */6 * * *";

/// Builds and starts the background job scheduler.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive for
/// the lifetime of the process. Dropping it shuts down all scheduled jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised, the
/// sweep job cannot be registered, or the scheduler fails to start.
pub async fn build_scheduler(
    store: Arc<dyn ReviewStore>,
    queues: Arc<JobQueues>,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    let job = Job::new_async(COLLECTION_SWEEP_CRON, move |_uuid, _lock| {
        let store = Arc::clone(&store);
        let queues = Arc::clone(&queues);

        Box::pin(async move {
            tracing::info!("scheduler: starting collection sweep");
            run_collection_sweep(store.as_ref(), &queues).await;
            tracing::info!("scheduler: collection sweep complete");
        })
    })?;
    scheduler.add(job).await?;

    scheduler.start().await?;
    Ok(scheduler)
}

/// Enqueues one collection job per tracked entity. Individual enqueue
/// failures are logged and skipped so one bad entity never stalls the sweep.
async fn run_collection_sweep(store: &dyn ReviewStore, queues: &JobQueues) {
    let entities = match store.list_entities().await {
        Ok(entities) => entities,
        Err(e) => {
            tracing::error!(error = %e, "scheduler: failed to list tracked entities");
            return;
        }
    };

    if entities.is_empty() {
        tracing::info!("scheduler: no tracked entities; skipping sweep");
        return;
    }

    for entity in &entities {
        let job = revpulse_etl::Job::new(
            "collectReviews",
            serde_json::json!({
                "entityId": entity.entity_id,
                "platform": entity.platform,
                "externalId": entity.external_id,
            }),
        );
        if let Err(e) = queues.enqueue(QUEUE_DATA_COLLECTION, job) {
            tracing::error!(
                entity_id = %entity.entity_id,
                error = %e,
                "scheduler: failed to enqueue collection job"
            );
        }
    }

    tracing::info!(count = entities.len(), "scheduler: collection jobs enqueued");
}
