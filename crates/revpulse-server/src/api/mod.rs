//! HTTP surface: health, read endpoints, and the WebSocket upgrade.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use revpulse_etl::ReviewStore;
use revpulse_sentiment::SentimentEngine;

use crate::realtime::{ws::ws_handler, HeartbeatConfig, Hub};

#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<Hub>,
    pub heartbeat: HeartbeatConfig,
    pub store: Arc<dyn ReviewStore>,
    pub engine: Arc<SentimentEngine>,
}

#[derive(Debug, Serialize)]
struct HealthData {
    status: &'static str,
}

#[derive(Debug, Deserialize)]
struct TrendsQuery {
    /// Trailing window in hours; defaults to 24.
    hours: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/entities", get(list_entities))
        .route("/api/v1/sentiment/trends", get(sentiment_trends))
        .route("/ws", get(ws_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(HealthData { status: "ok" })
}

async fn list_entities(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.list_entities().await {
        Ok(entities) => (StatusCode::OK, Json(entities)).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to list entities");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody {
                    error: "storage unavailable".to_owned(),
                }),
            )
                .into_response()
        }
    }
}

async fn sentiment_trends(
    State(state): State<AppState>,
    Query(query): Query<TrendsQuery>,
) -> impl IntoResponse {
    let hours = query.hours.unwrap_or(24);
    let window = std::time::Duration::from_secs(u64::from(hours) * 3600);
    match state.engine.trends(window).await {
        Ok(trends) => (StatusCode::OK, Json(trends)).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to compute sentiment trends");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody {
                    error: "trend computation failed".to_owned(),
                }),
            )
                .into_response()
        }
    }
}
