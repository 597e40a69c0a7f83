use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files — useful for testing
/// or when the caller manages env setup.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// This is the core parsing/validation logic, decoupled from the actual
/// environment so it can be tested with a pure `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default =
        |var: &str, default: &str| -> String { lookup(var).unwrap_or_else(|_| default.to_string()) };

    let parse_addr = |var: &str, default: &str| -> Result<SocketAddr, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u32>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u64>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<usize>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })
    };

    let env = parse_environment(&or_default("REVPULSE_ENV", "development"));
    let bind_addr = parse_addr("REVPULSE_BIND_ADDR", "0.0.0.0:3000")?;
    let log_level = or_default("REVPULSE_LOG_LEVEL", "info");

    let google_api_key = lookup("GOOGLE_PLACES_API_KEY").ok();
    let yelp_api_key = lookup("YELP_API_KEY").ok();
    let tripadvisor_api_key = lookup("TRIPADVISOR_API_KEY").ok();

    let collector_requests_per_second =
        parse_u32("REVPULSE_COLLECTOR_REQUESTS_PER_SECOND", "10")?;
    if collector_requests_per_second == 0 {
        return Err(ConfigError::InvalidEnvVar {
            var: "REVPULSE_COLLECTOR_REQUESTS_PER_SECOND".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
    let collector_max_attempts = parse_u32("REVPULSE_COLLECTOR_MAX_ATTEMPTS", "3")?;
    let collector_retry_delay_ms = parse_u64("REVPULSE_COLLECTOR_RETRY_DELAY_MS", "1000")?;
    let collector_request_timeout_secs =
        parse_u64("REVPULSE_COLLECTOR_REQUEST_TIMEOUT_SECS", "30")?;
    let collector_user_agent = or_default(
        "REVPULSE_COLLECTOR_USER_AGENT",
        "revpulse/0.1 (review-intelligence)",
    );

    let sentiment_model_url = require("REVPULSE_SENTIMENT_MODEL_URL")?;
    let sentiment_batch_size = parse_usize("REVPULSE_SENTIMENT_BATCH_SIZE", "10")?;
    let sentiment_interval_ms = parse_u64("REVPULSE_SENTIMENT_INTERVAL_MS", "5000")?;
    let sentiment_max_attempts = parse_u32("REVPULSE_SENTIMENT_MAX_ATTEMPTS", "3")?;
    let sentiment_backoff_base_ms = parse_u64("REVPULSE_SENTIMENT_BACKOFF_BASE_MS", "500")?;
    let sentiment_cache_ttl_secs = parse_u64("REVPULSE_SENTIMENT_CACHE_TTL_SECS", "86400")?;

    let job_attempts = parse_u32("REVPULSE_JOB_ATTEMPTS", "3")?;
    let job_backoff_base_ms = parse_u64("REVPULSE_JOB_BACKOFF_BASE_MS", "1000")?;

    let ws_heartbeat_interval_secs = parse_u64("REVPULSE_WS_HEARTBEAT_INTERVAL_SECS", "30")?;
    let ws_heartbeat_timeout_secs = parse_u64("REVPULSE_WS_HEARTBEAT_TIMEOUT_SECS", "90")?;

    Ok(AppConfig {
        env,
        bind_addr,
        log_level,
        google_api_key,
        yelp_api_key,
        tripadvisor_api_key,
        collector_requests_per_second,
        collector_max_attempts,
        collector_retry_delay_ms,
        collector_request_timeout_secs,
        collector_user_agent,
        sentiment_model_url,
        sentiment_batch_size,
        sentiment_interval_ms,
        sentiment_max_attempts,
        sentiment_backoff_base_ms,
        sentiment_cache_ttl_secs,
        job_attempts,
        job_backoff_base_ms,
        ws_heartbeat_interval_secs,
        ws_heartbeat_timeout_secs,
    })
}

fn parse_environment(raw: &str) -> Environment {
    match raw.to_ascii_lowercase().as_str() {
        "production" | "prod" => Environment::Production,
        "test" => Environment::Test,
        _ => Environment::Development,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from<'a>(
        map: &'a HashMap<&'a str, &'a str>,
    ) -> impl Fn(&str) -> Result<String, std::env::VarError> + 'a {
        move |key| {
            map.get(key)
                .map(|v| (*v).to_string())
                .ok_or(std::env::VarError::NotPresent)
        }
    }

    fn minimal_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([("REVPULSE_SENTIMENT_MODEL_URL", "http://localhost:8600")])
    }

    #[test]
    fn minimal_env_uses_defaults() {
        let env = minimal_env();
        let config = build_app_config(lookup_from(&env)).unwrap();
        assert_eq!(config.env, Environment::Development);
        assert_eq!(config.bind_addr.port(), 3000);
        assert_eq!(config.collector_requests_per_second, 10);
        assert_eq!(config.collector_max_attempts, 3);
        assert_eq!(config.sentiment_batch_size, 10);
        assert_eq!(config.job_attempts, 3);
        assert!(config.google_api_key.is_none());
    }

    #[test]
    fn missing_model_url_is_an_error() {
        let env: HashMap<&str, &str> = HashMap::new();
        let err = build_app_config(lookup_from(&env)).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(var) if var == "REVPULSE_SENTIMENT_MODEL_URL"));
    }

    #[test]
    fn zero_requests_per_second_is_rejected() {
        let mut env = minimal_env();
        env.insert("REVPULSE_COLLECTOR_REQUESTS_PER_SECOND", "0");
        let err = build_app_config(lookup_from(&env)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar { .. }));
    }

    #[test]
    fn invalid_bind_addr_is_rejected() {
        let mut env = minimal_env();
        env.insert("REVPULSE_BIND_ADDR", "not-an-addr");
        let err = build_app_config(lookup_from(&env)).unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidEnvVar { var, .. } if var == "REVPULSE_BIND_ADDR")
        );
    }

    #[test]
    fn production_env_parses() {
        let mut env = minimal_env();
        env.insert("REVPULSE_ENV", "production");
        let config = build_app_config(lookup_from(&env)).unwrap();
        assert_eq!(config.env, Environment::Production);
    }

    #[test]
    fn debug_redacts_api_keys() {
        let mut env = minimal_env();
        env.insert("YELP_API_KEY", "super-secret");
        let config = build_app_config(lookup_from(&env)).unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("super-secret"), "{rendered}");
        assert!(rendered.contains("[redacted]"));
    }
}
