//! ETL orchestration: the pipeline hub.
//!
//! Turns raw collected reviews into enriched, stored records — sentiment and
//! themes attached — then evaluates alert rules and publishes each enriched
//! review to the realtime event channel. Invoked through named job queues
//! with at-least-once delivery; processing is idempotent on review id.

pub mod alerts;
pub mod error;
pub mod jobs;
pub mod orchestrator;
pub mod store;
pub mod themes;
pub mod types;

pub use alerts::{AlertConditions, AlertRule, AlertRuleType, EntityAggregates};
pub use error::EtlError;
pub use jobs::{
    Job, JobOptions, JobQueues, QUEUE_DATA_COLLECTION, QUEUE_ETL, QUEUE_NOTIFICATIONS,
    QUEUE_SENTIMENT,
};
pub use orchestrator::{Orchestrator, ProcessSummary};
pub use store::{MemoryStore, ReviewStore, StoreError, TrackedEntity};
pub use types::{EnrichedReview, ReviewEvent, ReviewEventKind, Theme};
