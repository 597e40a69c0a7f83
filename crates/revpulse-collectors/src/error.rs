use revpulse_core::Platform;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// Uniform translation of a platform-level failure. `code` carries the
    /// platform's machine-readable status when it exposes one; the raw
    /// platform response never leaks past this variant.
    #[error("{platform} API error: {message}")]
    Api {
        platform: Platform,
        code: Option<String>,
        message: String,
    },

    #[error("collector misconfigured for {platform}: {reason}")]
    InvalidConfig { platform: Platform, reason: String },
}
