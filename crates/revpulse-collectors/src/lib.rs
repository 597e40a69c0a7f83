//! Platform collectors for external review APIs.
//!
//! Each supported platform (Google Places, Yelp, TripAdvisor) gets one
//! [`Collector`] implementation that normalizes its API into
//! [`ReviewRecord`]/[`CompetitorRecord`] and owns its own HTTP client and
//! [`RateLimiter`], so distinct platforms throttle independently.

pub mod error;
pub mod throttle;

mod google;
mod tripadvisor;
mod yelp;

pub use error::CollectorError;
pub use google::GooglePlacesCollector;
pub use throttle::RateLimiter;
pub use tripadvisor::TripAdvisorCollector;
pub use yelp::YelpCollector;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use revpulse_core::{AppConfig, CompetitorRecord, Platform, ReviewRecord};

/// Uniform contract over heterogeneous review platforms.
///
/// Implementations must translate platform-specific failures into
/// [`CollectorError::Api`], omit missing optional fields from record
/// metadata, and return an empty list (not an error) when a business simply
/// has no reviews.
#[async_trait]
pub trait Collector: Send + Sync {
    fn platform(&self) -> Platform;

    /// Searches the platform for businesses matching `query` near `location`.
    async fn search_competitors(
        &self,
        query: &str,
        location: &str,
    ) -> Result<Vec<CompetitorRecord>, CollectorError>;

    /// Fetches reviews for a business identified by its platform-native id.
    async fn get_reviews(&self, external_id: &str) -> Result<Vec<ReviewRecord>, CollectorError>;
}

/// Shared HTTP/throttle settings for building collectors.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub timeout_secs: u64,
    pub user_agent: String,
    pub requests_per_second: u32,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
}

impl ClientSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        ClientSettings {
            timeout_secs: config.collector_request_timeout_secs,
            user_agent: config.collector_user_agent.clone(),
            requests_per_second: config.collector_requests_per_second,
            max_attempts: config.collector_max_attempts,
            retry_delay_ms: config.collector_retry_delay_ms,
        }
    }
}

/// Platform-keyed registry of collectors.
///
/// The ETL layer looks collectors up by [`Platform`] instead of knowing any
/// concrete implementation.
#[derive(Default)]
pub struct CollectorRegistry {
    collectors: HashMap<Platform, Arc<dyn Collector>>,
}

impl CollectorRegistry {
    #[must_use]
    pub fn new() -> Self {
        CollectorRegistry {
            collectors: HashMap::new(),
        }
    }

    /// Builds a registry with one collector per platform that has an API key
    /// configured. Platforms without credentials are skipped with a log line
    /// rather than an error, so a partially-configured deployment still runs.
    ///
    /// # Errors
    ///
    /// Returns [`CollectorError::Http`] if an underlying HTTP client cannot
    /// be constructed.
    pub fn from_app_config(config: &AppConfig) -> Result<Self, CollectorError> {
        let settings = ClientSettings::from_app_config(config);
        let mut registry = CollectorRegistry::new();

        if let Some(key) = &config.google_api_key {
            registry.register(Arc::new(GooglePlacesCollector::new(key, &settings)?));
        } else {
            tracing::info!("no Google Places API key configured; skipping collector");
        }
        if let Some(key) = &config.yelp_api_key {
            registry.register(Arc::new(YelpCollector::new(key, &settings)?));
        } else {
            tracing::info!("no Yelp API key configured; skipping collector");
        }
        if let Some(key) = &config.tripadvisor_api_key {
            registry.register(Arc::new(TripAdvisorCollector::new(key, &settings)?));
        } else {
            tracing::info!("no TripAdvisor API key configured; skipping collector");
        }

        Ok(registry)
    }

    pub fn register(&mut self, collector: Arc<dyn Collector>) {
        self.collectors.insert(collector.platform(), collector);
    }

    #[must_use]
    pub fn get(&self, platform: Platform) -> Option<Arc<dyn Collector>> {
        self.collectors.get(&platform).map(Arc::clone)
    }

    #[must_use]
    pub fn platforms(&self) -> Vec<Platform> {
        self.collectors.keys().copied().collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.collectors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullCollector(Platform);

    #[async_trait]
    impl Collector for NullCollector {
        fn platform(&self) -> Platform {
            self.0
        }

        async fn search_competitors(
            &self,
            _query: &str,
            _location: &str,
        ) -> Result<Vec<CompetitorRecord>, CollectorError> {
            Ok(Vec::new())
        }

        async fn get_reviews(
            &self,
            _external_id: &str,
        ) -> Result<Vec<ReviewRecord>, CollectorError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn registry_resolves_by_platform() {
        let mut registry = CollectorRegistry::new();
        registry.register(Arc::new(NullCollector(Platform::Yelp)));

        assert!(registry.get(Platform::Yelp).is_some());
        assert!(registry.get(Platform::Google).is_none());
        assert_eq!(registry.platforms(), vec![Platform::Yelp]);
    }

    #[test]
    fn registering_same_platform_replaces_collector() {
        let mut registry = CollectorRegistry::new();
        registry.register(Arc::new(NullCollector(Platform::Google)));
        registry.register(Arc::new(NullCollector(Platform::Google)));
        assert_eq!(registry.platforms().len(), 1);
    }
}
