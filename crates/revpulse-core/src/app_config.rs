use std::net::SocketAddr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,

    pub google_api_key: Option<String>,
    pub yelp_api_key: Option<String>,
    pub tripadvisor_api_key: Option<String>,

    pub collector_requests_per_second: u32,
    pub collector_max_attempts: u32,
    pub collector_retry_delay_ms: u64,
    pub collector_request_timeout_secs: u64,
    pub collector_user_agent: String,

    pub sentiment_model_url: String,
    pub sentiment_batch_size: usize,
    pub sentiment_interval_ms: u64,
    pub sentiment_max_attempts: u32,
    pub sentiment_backoff_base_ms: u64,
    pub sentiment_cache_ttl_secs: u64,

    pub job_attempts: u32,
    pub job_backoff_base_ms: u64,

    pub ws_heartbeat_interval_secs: u64,
    pub ws_heartbeat_timeout_secs: u64,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field(
                "google_api_key",
                &self.google_api_key.as_ref().map(|_| "[redacted]"),
            )
            .field(
                "yelp_api_key",
                &self.yelp_api_key.as_ref().map(|_| "[redacted]"),
            )
            .field(
                "tripadvisor_api_key",
                &self.tripadvisor_api_key.as_ref().map(|_| "[redacted]"),
            )
            .field(
                "collector_requests_per_second",
                &self.collector_requests_per_second,
            )
            .field("collector_max_attempts", &self.collector_max_attempts)
            .field("collector_retry_delay_ms", &self.collector_retry_delay_ms)
            .field(
                "collector_request_timeout_secs",
                &self.collector_request_timeout_secs,
            )
            .field("collector_user_agent", &self.collector_user_agent)
            .field("sentiment_model_url", &self.sentiment_model_url)
            .field("sentiment_batch_size", &self.sentiment_batch_size)
            .field("sentiment_interval_ms", &self.sentiment_interval_ms)
            .field("sentiment_max_attempts", &self.sentiment_max_attempts)
            .field("sentiment_backoff_base_ms", &self.sentiment_backoff_base_ms)
            .field("sentiment_cache_ttl_secs", &self.sentiment_cache_ttl_secs)
            .field("job_attempts", &self.job_attempts)
            .field("job_backoff_base_ms", &self.job_backoff_base_ms)
            .field(
                "ws_heartbeat_interval_secs",
                &self.ws_heartbeat_interval_secs,
            )
            .field("ws_heartbeat_timeout_secs", &self.ws_heartbeat_timeout_secs)
            .finish()
    }
}
