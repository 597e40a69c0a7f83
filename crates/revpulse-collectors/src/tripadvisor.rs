//! TripAdvisor Content API collector.
//!
//! Key-in-query auth; errors come back as `{"error": {"type", "message",
//! "code"}}` with a non-2xx status. Review timestamps are ISO-8601.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Url};
use serde::Deserialize;

use revpulse_core::{review_id, CompetitorRecord, Platform, ReviewRecord};

use crate::error::CollectorError;
use crate::google::parse_base_url;
use crate::throttle::RateLimiter;
use crate::{ClientSettings, Collector};

const DEFAULT_BASE_URL: &str = "https://api.content.tripadvisor.com/api/v1/";

pub struct TripAdvisorCollector {
    client: Client,
    api_key: String,
    base_url: Url,
    limiter: RateLimiter,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<i64>,
    #[serde(rename = "type", default)]
    error_type: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LocationSearchResponse {
    #[serde(default)]
    data: Vec<LocationResult>,
}

#[derive(Debug, Deserialize)]
struct LocationResult {
    location_id: String,
    name: String,
    #[serde(default)]
    address_obj: Option<AddressObj>,
}

#[derive(Debug, Deserialize)]
struct AddressObj {
    #[serde(default)]
    address_string: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReviewsResponse {
    #[serde(default)]
    data: Vec<TripAdvisorReview>,
}

#[derive(Debug, Deserialize)]
struct TripAdvisorReview {
    id: i64,
    rating: f32,
    #[serde(default)]
    text: String,
    /// ISO-8601 instant, e.g. `2021-03-11T17:00:00Z`.
    published_date: String,
    #[serde(default)]
    lang: Option<String>,
    #[serde(default)]
    user: Option<TripAdvisorUser>,
}

#[derive(Debug, Deserialize)]
struct TripAdvisorUser {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    avatar: Option<Avatar>,
}

#[derive(Debug, Deserialize)]
struct Avatar {
    #[serde(default)]
    large: Option<String>,
}

impl TripAdvisorCollector {
    /// Creates a collector pointed at the production Content API.
    ///
    /// # Errors
    ///
    /// Returns [`CollectorError::Http`] if the HTTP client cannot be built.
    pub fn new(api_key: &str, settings: &ClientSettings) -> Result<Self, CollectorError> {
        Self::with_base_url(api_key, settings, DEFAULT_BASE_URL)
    }

    /// Creates a collector with a custom base URL (for wiremock tests).
    ///
    /// # Errors
    ///
    /// Returns [`CollectorError::Http`] if the HTTP client cannot be built,
    /// or [`CollectorError::InvalidConfig`] for an unparseable base URL.
    pub fn with_base_url(
        api_key: &str,
        settings: &ClientSettings,
        base_url: &str,
    ) -> Result<Self, CollectorError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(settings.user_agent.clone())
            .build()?;
        Ok(TripAdvisorCollector {
            client,
            api_key: api_key.to_owned(),
            base_url: parse_base_url(Platform::TripAdvisor, base_url)?,
            limiter: RateLimiter::new(
                settings.requests_per_second,
                settings.max_attempts,
                Duration::from_millis(settings.retry_delay_ms),
            ),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        mut url: Url,
        context: &str,
    ) -> Result<T, CollectorError> {
        url.query_pairs_mut().append_pair("key", &self.api_key);
        let body = self
            .limiter
            .execute(|| {
                let url = url.clone();
                async move {
                    let response = self.client.get(url).send().await?;
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response.json::<serde_json::Value>().await?);
                    }
                    let (code, message) = match response.json::<ErrorEnvelope>().await {
                        Ok(envelope) => (
                            envelope
                                .error
                                .code
                                .map(|c| c.to_string())
                                .or(envelope.error.error_type),
                            envelope
                                .error
                                .message
                                .unwrap_or_else(|| "TripAdvisor request failed".to_owned()),
                        ),
                        Err(_) => (
                            Some(format!("http_{}", status.as_u16())),
                            "TripAdvisor request failed".to_owned(),
                        ),
                    };
                    Err(CollectorError::Api {
                        platform: Platform::TripAdvisor,
                        code,
                        message,
                    })
                }
            })
            .await?;

        serde_json::from_value(body).map_err(|e| CollectorError::Deserialize {
            context: context.to_owned(),
            source: e,
        })
    }
}

#[async_trait]
impl Collector for TripAdvisorCollector {
    fn platform(&self) -> Platform {
        Platform::TripAdvisor
    }

    async fn search_competitors(
        &self,
        query: &str,
        location: &str,
    ) -> Result<Vec<CompetitorRecord>, CollectorError> {
        let mut url = self.base_url.join("location/search").map_err(|e| {
            CollectorError::InvalidConfig {
                platform: Platform::TripAdvisor,
                reason: e.to_string(),
            }
        })?;
        url.query_pairs_mut()
            .append_pair("searchQuery", query)
            .append_pair("address", location);

        let response: LocationSearchResponse = self.get_json(url, "location/search").await?;
        Ok(response
            .data
            .into_iter()
            .map(|result| {
                let mut metadata = serde_json::Map::new();
                if let Some(address) = result.address_obj.and_then(|a| a.address_string) {
                    metadata.insert("address".to_owned(), address.into());
                }
                CompetitorRecord {
                    name: result.name,
                    platform: Platform::TripAdvisor,
                    external_id: result.location_id,
                    metadata,
                }
            })
            .collect())
    }

    async fn get_reviews(&self, external_id: &str) -> Result<Vec<ReviewRecord>, CollectorError> {
        let url = self
            .base_url
            .join(&format!("location/{external_id}/reviews"))
            .map_err(|e| CollectorError::InvalidConfig {
                platform: Platform::TripAdvisor,
                reason: e.to_string(),
            })?;

        let response: ReviewsResponse = self.get_json(url, "location/reviews").await?;
        Ok(response
            .data
            .into_iter()
            .map(|review| {
                let created_at = review
                    .published_date
                    .parse::<DateTime<Utc>>()
                    .unwrap_or(DateTime::UNIX_EPOCH);
                let mut metadata = serde_json::Map::new();
                if let Some(lang) = review.lang {
                    metadata.insert("language".to_owned(), lang.into());
                }
                if let Some(user) = review.user {
                    if let Some(name) = user.username {
                        metadata.insert("author".to_owned(), name.into());
                    }
                    if let Some(photo) = user.avatar.and_then(|a| a.large) {
                        metadata.insert("photo_url".to_owned(), photo.into());
                    }
                }
                ReviewRecord {
                    id: review_id(Platform::TripAdvisor, &review.id.to_string()),
                    rating: review.rating.clamp(0.0, 5.0),
                    content: review.text,
                    platform: Platform::TripAdvisor,
                    created_at,
                    metadata,
                }
            })
            .collect())
    }
}
