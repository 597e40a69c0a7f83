use thiserror::Error;

#[derive(Debug, Error)]
pub enum SentimentError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("rate limited by the sentiment model")]
    RateLimited,

    #[error("sentiment model rejected the request: {0}")]
    InvalidRequest(String),

    /// The model answered, but the response failed structural validation
    /// (unknown sentiment label, out-of-bound score, non-string key phrase,
    /// empty tone). Never coerced — always surfaced.
    #[error("model response failed validation: {0}")]
    InvalidResponse(String),

    #[error("sentiment model returned status {status}")]
    UpstreamStatus { status: u16 },

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("cache error: {0}")]
    Cache(String),
}

impl SentimentError {
    /// Failure classification per the engine's retry policy: rate limits,
    /// 5xx responses, and network-level failures are transient; malformed
    /// requests and invalid responses are not.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        match self {
            SentimentError::RateLimited | SentimentError::UpstreamStatus { .. } => true,
            SentimentError::Http(e) => {
                e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
            }
            SentimentError::InvalidRequest(_)
            | SentimentError::InvalidResponse(_)
            | SentimentError::Deserialize { .. }
            | SentimentError::Cache(_) => false,
        }
    }
}
