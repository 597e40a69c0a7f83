//! Sentiment model boundary.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Serialize;

use crate::error::SentimentError;
use crate::types::RawSentiment;

/// External language-model call that turns review text into an unvalidated
/// [`RawSentiment`]. Carried as `Arc<dyn SentimentModel>` so tests can swap
/// in a scripted double.
#[async_trait]
pub trait SentimentModel: Send + Sync {
    async fn analyze(&self, text: &str) -> Result<RawSentiment, SentimentError>;
}

#[derive(Serialize)]
struct AnalyzeRequest<'a> {
    text: &'a str,
}

/// HTTP client for the sentiment model service.
///
/// POSTs `{"text": ...}` to `{base}/analyze`. Status triage: 429 →
/// [`SentimentError::RateLimited`], other 4xx → `InvalidRequest`, 5xx →
/// retryable `UpstreamStatus`.
pub struct HttpSentimentModel {
    client: Client,
    endpoint: Url,
}

impl HttpSentimentModel {
    /// # Errors
    ///
    /// Returns [`SentimentError::Http`] if the HTTP client cannot be built,
    /// or [`SentimentError::InvalidRequest`] for an unparseable base URL.
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, SentimentError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let endpoint = Url::parse(&normalised)
            .and_then(|base| base.join("analyze"))
            .map_err(|e| {
                SentimentError::InvalidRequest(format!("invalid model URL '{base_url}': {e}"))
            })?;
        Ok(HttpSentimentModel { client, endpoint })
    }
}

#[async_trait]
impl SentimentModel for HttpSentimentModel {
    async fn analyze(&self, text: &str) -> Result<RawSentiment, SentimentError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&AnalyzeRequest { text })
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(SentimentError::RateLimited);
        }
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(SentimentError::InvalidRequest(format!(
                "status {status}: {body}"
            )));
        }
        if !status.is_success() {
            return Err(SentimentError::UpstreamStatus {
                status: status.as_u16(),
            });
        }

        let body = response.json::<serde_json::Value>().await?;
        serde_json::from_value(body).map_err(|e| SentimentError::Deserialize {
            context: "analyze".to_owned(),
            source: e,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn analyze_parses_model_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/analyze"))
            .and(body_json(serde_json::json!({ "text": "Great place!" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "sentiment": "positive",
                "score": 0.8,
                "key_phrases": ["great"],
                "emotional_tone": "enthusiastic"
            })))
            .mount(&server)
            .await;

        let model = HttpSentimentModel::new(&server.uri(), 5).unwrap();
        let raw = model.analyze("Great place!").await.unwrap();
        assert_eq!(raw.sentiment, "positive");
        assert!((raw.score - 0.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn http_429_maps_to_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/analyze"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let model = HttpSentimentModel::new(&server.uri(), 5).unwrap();
        let err = model.analyze("hi").await.unwrap_err();
        assert!(matches!(err, SentimentError::RateLimited));
    }

    #[tokio::test]
    async fn http_400_maps_to_invalid_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/analyze"))
            .respond_with(ResponseTemplate::new(400).set_body_string("text too long"))
            .mount(&server)
            .await;

        let model = HttpSentimentModel::new(&server.uri(), 5).unwrap();
        let err = model.analyze("hi").await.unwrap_err();
        assert!(matches!(err, SentimentError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn http_5xx_maps_to_upstream_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/analyze"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let model = HttpSentimentModel::new(&server.uri(), 5).unwrap();
        let err = model.analyze("hi").await.unwrap_err();
        assert!(matches!(
            err,
            SentimentError::UpstreamStatus { status: 503 }
        ));
    }
}
