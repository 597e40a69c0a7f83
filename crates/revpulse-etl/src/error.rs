use revpulse_core::Platform;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EtlError {
    #[error(transparent)]
    Collection(#[from] revpulse_collectors::CollectorError),

    #[error(transparent)]
    Sentiment(#[from] revpulse_sentiment::SentimentError),

    #[error(transparent)]
    Persistence(#[from] crate::store::StoreError),

    #[error("no collector registered for platform {0}")]
    NoCollector(Platform),

    #[error("unknown job queue: {0}")]
    UnknownQueue(String),

    #[error("job queue {0} is closed")]
    QueueClosed(String),

    #[error("processor already registered for queue {0}")]
    ProcessorAlreadyRegistered(String),

    #[error("invalid job payload for {context}: {source}")]
    Payload {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}
