//! Shared domain model and configuration for the revpulse pipeline.
//!
//! Holds the platform-neutral review/competitor records produced by the
//! collectors and consumed by the ETL layer, plus the env-driven
//! [`AppConfig`] used by every binary.

mod app_config;
mod config;
mod model;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use model::{review_id, CompetitorRecord, Platform, ReviewRecord};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}
