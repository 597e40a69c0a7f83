//! Yelp Fusion collector.
//!
//! Uses bearer-token auth and real HTTP status codes; failures carry a JSON
//! envelope `{"error": {"code", "description"}}` which is translated into
//! [`CollectorError::Api`] with Yelp's machine code preserved.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use reqwest::{Client, Url};
use serde::Deserialize;

use revpulse_core::{review_id, CompetitorRecord, Platform, ReviewRecord};

use crate::error::CollectorError;
use crate::google::parse_base_url;
use crate::throttle::RateLimiter;
use crate::{ClientSettings, Collector};

const DEFAULT_BASE_URL: &str = "https://api.yelp.com/v3/";

pub struct YelpCollector {
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
    code: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    businesses: Vec<Business>,
}

#[derive(Debug, Deserialize)]
struct Business {
    id: String,
    name: String,
    #[serde(default)]
    rating: Option<f32>,
    #[serde(default)]
    review_count: Option<u32>,
    #[serde(default)]
    location: Option<BusinessLocation>,
}

#[derive(Debug, Deserialize)]
struct BusinessLocation {
    #[serde(default)]
    display_address: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ReviewsResponse {
    #[serde(default)]
    reviews: Vec<YelpReview>,
}

#[derive(Debug, Deserialize)]
struct YelpReview {
    id: String,
    rating: f32,
    #[serde(default)]
    text: String,
    /// `YYYY-MM-DD HH:MM:SS`, Yelp's fixed review timestamp format.
    time_created: String,
    #[serde(default)]
    user: Option<YelpUser>,
}

#[derive(Debug, Deserialize)]
struct YelpUser {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    image_url: Option<String>,
}

impl YelpCollector {
    /// Creates a collector pointed at the production Fusion API.
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
        Ok(YelpCollector {
            client,
            api_key: api_key.to_owned(),
            base_url: parse_base_url(Platform::Yelp, base_url)?,
            limiter: RateLimiter::new(
                settings.requests_per_second,
                settings.max_attempts,
                Duration::from_millis(settings.retry_delay_ms),
            ),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: Url,
        context: &str,
    ) -> Result<T, CollectorError> {
        let body = self
            .limiter
            .execute(|| {
                let url = url.clone();
                async move {
                    let response = self
                        .client
                        .get(url)
                        .bearer_auth(&self.api_key)
                        .send()
                        .await?;
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response.json::<serde_json::Value>().await?);
                    }
                    // Yelp error envelopes carry a machine code; fall back to
                    // the raw HTTP status when the body is not the envelope.
                    let (code, message) = match response.json::<ErrorEnvelope>().await {
                        Ok(envelope) => (
                            envelope.error.code,
                            envelope
                                .error
                                .description
                                .unwrap_or_else(|| "Yelp request failed".to_owned()),
                        ),
                        Err(_) => (
                            Some(format!("http_{}", status.as_u16())),
                            "Yelp request failed".to_owned(),
                        ),
                    };
                    Err(CollectorError::Api {
                        platform: Platform::Yelp,
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
impl Collector for YelpCollector {
    fn platform(&self) -> Platform {
        Platform::Yelp
    }

    async fn search_competitors(
        &self,
        query: &str,
        location: &str,
    ) -> Result<Vec<CompetitorRecord>, CollectorError> {
        let mut url = self.base_url.join("businesses/search").map_err(|e| {
            CollectorError::InvalidConfig {
                platform: Platform::Yelp,
                reason: e.to_string(),
            }
        })?;
        url.query_pairs_mut()
            .append_pair("term", query)
            .append_pair("location", location);

        let response: SearchResponse = self.get_json(url, "businesses/search").await?;
        Ok(response
            .businesses
            .into_iter()
            .map(|business| {
                let mut metadata = serde_json::Map::new();
                if let Some(rating) = business.rating {
                    metadata.insert("rating".to_owned(), f64::from(rating).into());
                }
                if let Some(count) = business.review_count {
                    metadata.insert("review_count".to_owned(), count.into());
                }
                if let Some(address) = business
                    .location
                    .filter(|l| !l.display_address.is_empty())
                    .map(|l| l.display_address.join(", "))
                {
                    metadata.insert("address".to_owned(), address.into());
                }
                CompetitorRecord {
                    name: business.name,
                    platform: Platform::Yelp,
                    external_id: business.id,
                    metadata,
                }
            })
            .collect())
    }

    async fn get_reviews(&self, external_id: &str) -> Result<Vec<ReviewRecord>, CollectorError> {
        let url = self
            .base_url
            .join(&format!("businesses/{external_id}/reviews"))
            .map_err(|e| CollectorError::InvalidConfig {
                platform: Platform::Yelp,
                reason: e.to_string(),
            })?;

        let response: ReviewsResponse = self.get_json(url, "businesses/reviews").await?;
        Ok(response
            .reviews
            .into_iter()
            .map(|review| {
                let created_at = NaiveDateTime::parse_from_str(
                    &review.time_created,
                    "%Y-%m-%d %H:%M:%S",
                )
                .map(|naive| naive.and_utc())
                .unwrap_or(chrono::DateTime::UNIX_EPOCH);
                let mut metadata = serde_json::Map::new();
                if let Some(user) = review.user {
                    if let Some(name) = user.name {
                        metadata.insert("author".to_owned(), name.into());
                    }
                    if let Some(image) = user.image_url {
                        metadata.insert("photo_url".to_owned(), image.into());
                    }
                }
                ReviewRecord {
                    id: review_id(Platform::Yelp, &review.id),
                    rating: review.rating.clamp(0.0, 5.0),
                    content: review.text,
                    platform: Platform::Yelp,
                    created_at,
                    metadata,
                }
            })
            .collect())
    }
}
