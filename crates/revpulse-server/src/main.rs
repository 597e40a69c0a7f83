mod api;
mod realtime;
mod scheduler;

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use revpulse_collectors::CollectorRegistry;
use revpulse_etl::{JobOptions, JobQueues, MemoryStore, Orchestrator, ReviewStore};
use revpulse_sentiment::{EngineConfig, HttpSentimentModel, MemoryCache, SentimentEngine};

use crate::api::{build_app, AppState};
use crate::realtime::{HeartbeatConfig, Hub};

const MODEL_TIMEOUT_SECS: u64 = 30;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Arc::new(revpulse_core::load_app_config()?);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let registry = Arc::new(CollectorRegistry::from_app_config(&config)?);
    if registry.is_empty() {
        tracing::warn!("no platform API keys configured; collection is disabled");
    } else {
        tracing::info!(platforms = ?registry.platforms(), "collectors configured");
    }

    let model = HttpSentimentModel::new(&config.sentiment_model_url, MODEL_TIMEOUT_SECS)?;
    let engine = Arc::new(SentimentEngine::new(
        Arc::new(model),
        Arc::new(MemoryCache::new()),
        EngineConfig::from_app_config(&config),
    ));
    let _drain_loop = engine.spawn_drain_loop();

    let store: Arc<dyn ReviewStore> = Arc::new(MemoryStore::new());
    let queues = Arc::new(JobQueues::new());

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&registry),
        Arc::clone(&engine),
        Arc::clone(&store),
        Arc::clone(&queues),
    ));
    let _workers = orchestrator.register_job_processors(JobOptions {
        attempts: config.job_attempts,
        backoff_base_ms: config.job_backoff_base_ms,
    })?;

    let hub = Arc::new(Hub::new());
    let _publisher = hub.spawn_publisher(orchestrator.subscribe_events());

    let _scheduler = scheduler::build_scheduler(Arc::clone(&store), Arc::clone(&queues)).await?;

    let app = build_app(AppState {
        hub,
        heartbeat: HeartbeatConfig {
            interval: Duration::from_secs(config.ws_heartbeat_interval_secs),
            timeout: Duration::from_secs(config.ws_heartbeat_timeout_secs),
        },
        store,
        engine,
    });

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
