//! Google Places collector.
//!
//! Wraps the Places text-search and place-details endpoints. Google returns
//! HTTP 200 with an application-level `status` field; anything other than
//! `OK`/`ZERO_RESULTS` is surfaced as [`CollectorError::Api`] with the status
//! as the machine code.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Url};
use serde::Deserialize;

use revpulse_core::{review_id, CompetitorRecord, Platform, ReviewRecord};

use crate::error::CollectorError;
use crate::throttle::RateLimiter;
use crate::{ClientSettings, Collector};

const DEFAULT_BASE_URL: &str = "https://maps.googleapis.com/maps/api/place/";

pub struct GooglePlacesCollector {
    client: Client,
    api_key: String,
    base_url: Url,
    limiter: RateLimiter,
}

#[derive(Debug, Deserialize)]
struct SearchEnvelope {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    results: Vec<PlaceResult>,
}

#[derive(Debug, Deserialize)]
struct PlaceResult {
    place_id: String,
    name: String,
    #[serde(default)]
    formatted_address: Option<String>,
    #[serde(default)]
    rating: Option<f32>,
    #[serde(default)]
    user_ratings_total: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct DetailsEnvelope {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    result: Option<PlaceDetails>,
}

#[derive(Debug, Deserialize)]
struct PlaceDetails {
    #[serde(default)]
    reviews: Vec<GoogleReview>,
}

#[derive(Debug, Deserialize)]
struct GoogleReview {
    rating: f32,
    #[serde(default)]
    text: String,
    /// Unix timestamp of the review.
    time: i64,
    #[serde(default)]
    author_name: Option<String>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    profile_photo_url: Option<String>,
}

impl GooglePlacesCollector {
    /// Creates a collector pointed at the production Places API.
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
        let base_url = parse_base_url(Platform::Google, base_url)?;
        Ok(GooglePlacesCollector {
            client,
            api_key: api_key.to_owned(),
            base_url,
            limiter: RateLimiter::new(
                settings.requests_per_second,
                settings.max_attempts,
                Duration::from_millis(settings.retry_delay_ms),
            ),
        })
    }

    async fn get_envelope<T: serde::de::DeserializeOwned>(
        &self,
        url: Url,
        context: &str,
    ) -> Result<T, CollectorError> {
        let body = self
            .limiter
            .execute(|| {
                let url = url.clone();
                async move {
                    let response = self.client.get(url.clone()).send().await?;
                    let status = response.status();
                    if !status.is_success() {
                        return Err(CollectorError::Api {
                            platform: Platform::Google,
                            code: Some(format!("http_{}", status.as_u16())),
                            message: format!("unexpected HTTP status from {}", url.path()),
                        });
                    }
                    Ok(response.json::<serde_json::Value>().await?)
                }
            })
            .await?;

        serde_json::from_value(body).map_err(|e| CollectorError::Deserialize {
            context: context.to_owned(),
            source: e,
        })
    }
}

/// Normalizes a collector base URL, ensuring a trailing slash so joins append
/// rather than replace the last path segment.
pub(crate) fn parse_base_url(platform: Platform, base_url: &str) -> Result<Url, CollectorError> {
    let normalised = format!("{}/", base_url.trim_end_matches('/'));
    Url::parse(&normalised).map_err(|e| CollectorError::InvalidConfig {
        platform,
        reason: format!("invalid base URL '{base_url}': {e}"),
    })
}

/// Maps a Google application-level status. `OK` and `ZERO_RESULTS` are
/// success; everything else becomes an API error carrying the status code.
fn check_status(status: &str, error_message: Option<String>) -> Result<(), CollectorError> {
    match status {
        "OK" | "ZERO_RESULTS" => Ok(()),
        other => Err(CollectorError::Api {
            platform: Platform::Google,
            code: Some(other.to_owned()),
            message: error_message.unwrap_or_else(|| "Google Places request failed".to_owned()),
        }),
    }
}

#[async_trait]
impl Collector for GooglePlacesCollector {
    fn platform(&self) -> Platform {
        Platform::Google
    }

    async fn search_competitors(
        &self,
        query: &str,
        location: &str,
    ) -> Result<Vec<CompetitorRecord>, CollectorError> {
        let mut url = self.base_url.join("textsearch/json").map_err(|e| {
            CollectorError::InvalidConfig {
                platform: Platform::Google,
                reason: e.to_string(),
            }
        })?;
        url.query_pairs_mut()
            .append_pair("query", &format!("{query} in {location}"))
            .append_pair("key", &self.api_key);

        let envelope: SearchEnvelope = self.get_envelope(url, "textsearch").await?;
        check_status(&envelope.status, envelope.error_message)?;

        Ok(envelope
            .results
            .into_iter()
            .map(|place| {
                let mut metadata = serde_json::Map::new();
                if let Some(address) = place.formatted_address {
                    metadata.insert("address".to_owned(), address.into());
                }
                if let Some(rating) = place.rating {
                    metadata.insert("rating".to_owned(), f64::from(rating).into());
                }
                if let Some(total) = place.user_ratings_total {
                    metadata.insert("review_count".to_owned(), total.into());
                }
                CompetitorRecord {
                    name: place.name,
                    platform: Platform::Google,
                    external_id: place.place_id,
                    metadata,
                }
            })
            .collect())
    }

    async fn get_reviews(&self, external_id: &str) -> Result<Vec<ReviewRecord>, CollectorError> {
        let mut url = self.base_url.join("details/json").map_err(|e| {
            CollectorError::InvalidConfig {
                platform: Platform::Google,
                reason: e.to_string(),
            }
        })?;
        url.query_pairs_mut()
            .append_pair("place_id", external_id)
            .append_pair("fields", "reviews")
            .append_pair("key", &self.api_key);

        let envelope: DetailsEnvelope = self.get_envelope(url, "details").await?;
        check_status(&envelope.status, envelope.error_message)?;

        let reviews = envelope.result.map(|r| r.reviews).unwrap_or_default();
        Ok(reviews
            .into_iter()
            .map(|review| {
                // Google exposes no review id; place + timestamp is the
                // stable external key.
                let id = review_id(Platform::Google, &format!("{external_id}:{}", review.time));
                let created_at = DateTime::from_timestamp(review.time, 0)
                    .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
                let mut metadata = serde_json::Map::new();
                if let Some(author) = review.author_name {
                    metadata.insert("author".to_owned(), author.into());
                }
                if let Some(language) = review.language {
                    metadata.insert("language".to_owned(), language.into());
                }
                if let Some(photo) = review.profile_photo_url {
                    metadata.insert("photo_url".to_owned(), photo.into());
                }
                ReviewRecord {
                    id,
                    rating: review.rating.clamp(0.0, 5.0),
                    content: review.text,
                    platform: Platform::Google,
                    created_at,
                    metadata,
                }
            })
            .collect())
    }
}
