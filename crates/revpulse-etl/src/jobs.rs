//! Named job queues with at-least-once processing.
//!
//! The pipeline schedules asynchronous work through four named queues. Each
//! queue gets one registered processor; a failing job is redelivered to that
//! processor with exponential backoff up to `attempts` total tries, then
//! dropped with an error log. Processing must therefore be idempotent —
//! the orchestrator's store upsert key guarantees that for review work.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::EtlError;

pub const QUEUE_DATA_COLLECTION: &str = "dataCollection";
pub const QUEUE_ETL: &str = "etl";
pub const QUEUE_SENTIMENT: &str = "sentiment";
pub const QUEUE_NOTIFICATIONS: &str = "notifications";

const QUEUE_NAMES: &[&str] = &[
    QUEUE_DATA_COLLECTION,
    QUEUE_ETL,
    QUEUE_SENTIMENT,
    QUEUE_NOTIFICATIONS,
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    #[serde(rename = "type")]
    pub job_type: String,
    pub payload: serde_json::Value,
}

impl Job {
    #[must_use]
    pub fn new(job_type: &str, payload: serde_json::Value) -> Self {
        Job {
            job_type: job_type.to_owned(),
            payload,
        }
    }
}

/// Per-queue retry policy.
#[derive(Debug, Clone)]
pub struct JobOptions {
    /// Total delivery attempts per job.
    pub attempts: u32,
    /// Base delay for exponential backoff between redeliveries.
    pub backoff_base_ms: u64,
}

impl Default for JobOptions {
    fn default() -> Self {
        JobOptions {
            attempts: 3,
            backoff_base_ms: 1000,
        }
    }
}

struct QueueSlot {
    tx: mpsc::UnboundedSender<Job>,
    rx: Option<mpsc::UnboundedReceiver<Job>>,
}

/// The set of named queues. Producers call [`JobQueues::enqueue`]; each
/// consumer registers exactly one processor per queue at startup.
pub struct JobQueues {
    slots: Mutex<HashMap<&'static str, QueueSlot>>,
}

impl Default for JobQueues {
    fn default() -> Self {
        JobQueues::new()
    }
}

impl JobQueues {
    #[must_use]
    pub fn new() -> Self {
        let mut slots = HashMap::new();
        for &name in QUEUE_NAMES {
            let (tx, rx) = mpsc::unbounded_channel();
            slots.insert(name, QueueSlot { tx, rx: Some(rx) });
        }
        JobQueues {
            slots: Mutex::new(slots),
        }
    }

    /// Schedules a job on a named queue.
    ///
    /// # Errors
    ///
    /// [`EtlError::UnknownQueue`] for an unregistered name;
    /// [`EtlError::QueueClosed`] if the consumer side has shut down.
    pub fn enqueue(&self, queue: &str, job: Job) -> Result<(), EtlError> {
        let slots = self.slots.lock().expect("job queue lock poisoned");
        let slot = slots
            .get(queue)
            .ok_or_else(|| EtlError::UnknownQueue(queue.to_owned()))?;
        slot.tx
            .send(job)
            .map_err(|_| EtlError::QueueClosed(queue.to_owned()))
    }

    /// Registers the processor for a queue and spawns its worker loop.
    ///
    /// Jobs are delivered one at a time in FIFO order. A failing job is
    /// retried with `backoff_base_ms * 2^(n-1)` sleeps up to
    /// `options.attempts` total tries; exhausting them drops the job with an
    /// error log and moves on to the next.
    ///
    /// # Errors
    ///
    /// [`EtlError::UnknownQueue`] for an unregistered name;
    /// [`EtlError::ProcessorAlreadyRegistered`] on a second registration.
    pub fn register_processor<F, Fut>(
        &self,
        queue: &'static str,
        options: JobOptions,
        processor: F,
    ) -> Result<tokio::task::JoinHandle<()>, EtlError>
    where
        F: Fn(Job) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), EtlError>> + Send,
    {
        let mut rx = {
            let mut slots = self.slots.lock().expect("job queue lock poisoned");
            let slot = slots
                .get_mut(queue)
                .ok_or_else(|| EtlError::UnknownQueue(queue.to_owned()))?;
            slot.rx
                .take()
                .ok_or_else(|| EtlError::ProcessorAlreadyRegistered(queue.to_owned()))?
        };

        let attempts = options.attempts.max(1);
        Ok(tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                let mut attempt = 0u32;
                loop {
                    attempt += 1;
                    match processor(job.clone()).await {
                        Ok(()) => break,
                        Err(err) if attempt >= attempts => {
                            tracing::error!(
                                queue,
                                job_type = %job.job_type,
                                attempts,
                                error = %err,
                                "job failed after final attempt, dropping"
                            );
                            break;
                        }
                        Err(err) => {
                            let delay_ms = options
                                .backoff_base_ms
                                .saturating_mul(1u64 << (attempt - 1).min(10));
                            tracing::warn!(
                                queue,
                                job_type = %job.job_type,
                                attempt,
                                delay_ms,
                                error = %err,
                                "job failed, redelivering after backoff"
                            );
                            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                        }
                    }
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn jobs_are_processed_in_fifo_order() {
        let queues = JobQueues::new();
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<String>();

        queues
            .register_processor(QUEUE_ETL, JobOptions::default(), move |job| {
                let done_tx = done_tx.clone();
                async move {
                    done_tx.send(job.job_type).ok();
                    Ok(())
                }
            })
            .unwrap();

        for i in 0..3 {
            queues
                .enqueue(QUEUE_ETL, Job::new(&format!("job-{i}"), serde_json::json!({})))
                .unwrap();
        }

        for i in 0..3 {
            assert_eq!(done_rx.recv().await.unwrap(), format!("job-{i}"));
        }
    }

    #[tokio::test]
    async fn failing_job_is_redelivered_up_to_attempts() {
        let queues = JobQueues::new();
        let calls = Arc::new(AtomicU32::new(0));
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<()>();

        let c = Arc::clone(&calls);
        queues
            .register_processor(
                QUEUE_NOTIFICATIONS,
                JobOptions {
                    attempts: 3,
                    backoff_base_ms: 0,
                },
                move |_job| {
                    let c = Arc::clone(&c);
                    let done_tx = done_tx.clone();
                    async move {
                        let n = c.fetch_add(1, Ordering::SeqCst);
                        if n == 2 {
                            done_tx.send(()).ok();
                        }
                        Err(EtlError::UnknownQueue("always fails".to_owned()))
                    }
                },
            )
            .unwrap();

        queues
            .enqueue(QUEUE_NOTIFICATIONS, Job::new("doomed", serde_json::json!({})))
            .unwrap();

        done_rx.recv().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn transient_failure_recovers_on_redelivery() {
        let queues = JobQueues::new();
        let calls = Arc::new(AtomicU32::new(0));
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<u32>();

        let c = Arc::clone(&calls);
        queues
            .register_processor(
                QUEUE_ETL,
                JobOptions {
                    attempts: 3,
                    backoff_base_ms: 0,
                },
                move |_job| {
                    let c = Arc::clone(&c);
                    let done_tx = done_tx.clone();
                    async move {
                        let n = c.fetch_add(1, Ordering::SeqCst) + 1;
                        if n < 2 {
                            Err(EtlError::UnknownQueue("flaky".to_owned()))
                        } else {
                            done_tx.send(n).ok();
                            Ok(())
                        }
                    }
                },
            )
            .unwrap();

        queues
            .enqueue(QUEUE_ETL, Job::new("flaky", serde_json::json!({})))
            .unwrap();
        assert_eq!(done_rx.recv().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn unknown_queue_is_an_error() {
        let queues = JobQueues::new();
        let err = queues
            .enqueue("bogus", Job::new("x", serde_json::json!({})))
            .unwrap_err();
        assert!(matches!(err, EtlError::UnknownQueue(_)));
    }

    #[tokio::test]
    async fn double_registration_is_rejected() {
        let queues = JobQueues::new();
        queues
            .register_processor(QUEUE_SENTIMENT, JobOptions::default(), |_| async { Ok(()) })
            .unwrap();
        let err = queues
            .register_processor(QUEUE_SENTIMENT, JobOptions::default(), |_| async { Ok(()) })
            .unwrap_err();
        assert!(matches!(err, EtlError::ProcessorAlreadyRegistered(_)));
    }
}
