//! Platform-neutral review and competitor records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// External review platforms the collectors know how to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Google,
    Yelp,
    TripAdvisor,
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::Google => write!(f, "google"),
            Platform::Yelp => write!(f, "yelp"),
            Platform::TripAdvisor => write!(f, "tripadvisor"),
        }
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "google" => Ok(Platform::Google),
            "yelp" => Ok(Platform::Yelp),
            "tripadvisor" => Ok(Platform::TripAdvisor),
            other => Err(format!("unknown platform: {other}")),
        }
    }
}

/// A single customer review, normalized across platforms.
///
/// `id` is deterministic (see [`review_id`]): re-collecting the same upstream
/// review always yields the same id, which is what makes the downstream
/// store upsert idempotent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub id: String,
    /// Normalized to the 0–5 scale regardless of the platform's native scale.
    pub rating: f32,
    pub content: String,
    pub platform: Platform,
    pub created_at: DateTime<Utc>,
    /// Platform-specific extras (author, language, photo URL). Fields the
    /// upstream omitted are absent here, never null placeholders.
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// A competitor business discovered during a platform search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompetitorRecord {
    pub name: String,
    pub platform: Platform,
    pub external_id: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Derives the stable review id for a platform + external key pair.
///
/// The key is whatever uniquely identifies the review upstream (a review id,
/// or `place_id:timestamp` for platforms that expose no review id). The
/// result is `{platform}:{hex}` where `hex` is the first 16 bytes of
/// `sha256("{platform}:{external_key}")` — deterministic across collection
/// runs and collision-resistant across platforms.
#[must_use]
pub fn review_id(platform: Platform, external_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(platform.to_string().as_bytes());
    hasher.update(b":");
    hasher.update(external_key.as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest[..16].iter().map(|b| format!("{b:02x}")).collect();
    format!("{platform}:{hex}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn review_id_is_deterministic_across_runs() {
        let a = review_id(Platform::Google, "place123:1615482000");
        let b = review_id(Platform::Google, "place123:1615482000");
        assert_eq!(a, b);
    }

    #[test]
    fn review_id_differs_across_platforms_for_same_key() {
        let g = review_id(Platform::Google, "abc");
        let y = review_id(Platform::Yelp, "abc");
        assert_ne!(g, y);
    }

    #[test]
    fn review_id_is_prefixed_with_platform_slug() {
        let id = review_id(Platform::TripAdvisor, "r-99");
        assert!(id.starts_with("tripadvisor:"), "got {id}");
    }

    #[test]
    fn platform_round_trips_through_serde() {
        let json = serde_json::to_string(&Platform::TripAdvisor).unwrap();
        assert_eq!(json, "\"tripadvisor\"");
        let back: Platform = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Platform::TripAdvisor);
    }

    #[test]
    fn platform_parses_case_insensitively() {
        assert_eq!("Google".parse::<Platform>().unwrap(), Platform::Google);
        assert!("facebook".parse::<Platform>().is_err());
    }
}
