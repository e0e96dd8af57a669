//! Sidecar HTTP API.
//!
//! - POST /v1/prefetch
//! - POST /v1/prefetch/batch
//! - POST /v1/prefetch/clear
//! - DELETE /v1/prefetch
//! - GET /v1/prefetch/stats
//! - GET /health
//! - GET /metrics

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use uuid::Uuid;

use crate::config::Config;
use crate::prefetch::coordinator::PrefetchCoordinator;
use crate::prefetch::error::PrefetchError;
use crate::prefetch::fetcher::QueryCache;
use crate::prefetch::key::{KeyPart, RouteKey};
use crate::prefetch::request::{PrefetchOptions, PrefetchRequest};
use crate::prefetch::stats::PrefetchStatsSnapshot;
use crate::server::metrics::PrefetchMetrics;
use crate::server::origin::SimulatedOrigin;

/// Application state shared across handlers.
pub struct AppState {
    pub coordinator: PrefetchCoordinator,
    pub cache: Arc<QueryCache>,
    pub origin: Arc<SimulatedOrigin>,
    pub metrics: PrefetchMetrics,
    pub config: Arc<Config>,
    pub start_time: Instant,
}

/// Build the axum router with all API routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = state.config.server.cors_permissive;
    let router = Router::new()
        .route("/v1/prefetch", post(prefetch).delete(clear_all))
        .route("/v1/prefetch/batch", post(prefetch_batch))
        .route("/v1/prefetch/clear", post(clear))
        .route("/v1/prefetch/stats", get(stats))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

// ─── Errors ────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    BadKey(#[from] PrefetchError),

    #[error("metrics unavailable: {0}")]
    Metrics(#[from] prometheus::Error),
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::BadKey(_) => StatusCode::BAD_REQUEST,
            ApiError::Metrics(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

// ─── Request/Response Types ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct PrefetchBody {
    pub key: Vec<KeyPart>,
    #[serde(default)]
    pub delay_ms: Option<u64>,
    #[serde(default)]
    pub stale_time_ms: Option<u64>,
    #[serde(default)]
    pub on_hover: bool,
}

#[derive(Debug, Deserialize)]
pub struct BatchBody {
    pub requests: Vec<BatchItem>,
    #[serde(default)]
    pub delay_ms: Option<u64>,
    #[serde(default)]
    pub stale_time_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct BatchItem {
    pub key: Vec<KeyPart>,
    #[serde(default)]
    pub stale_time_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ClearBody {
    pub key: Vec<KeyPart>,
}

#[derive(Debug, Serialize)]
pub struct Accepted {
    pub request_id: String,
    pub keys: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct Cleared {
    pub removed: usize,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub ledger_entries: usize,
    pub pending_fetches: usize,
    pub pending_timers: usize,
    pub cached_payloads: usize,
    pub origin_loads: u64,
    pub events: PrefetchStatsSnapshot,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub disposed: bool,
    pub prefetch: StatsResponse,
}

fn options(delay_ms: Option<u64>, stale_time_ms: Option<u64>, on_hover: bool) -> PrefetchOptions {
    PrefetchOptions {
        delay: delay_ms.map(Duration::from_millis),
        on_hover,
        stale_time: stale_time_ms.map(Duration::from_millis),
    }
}

fn build_request(
    state: &AppState,
    parts: Vec<KeyPart>,
    stale_time_ms: Option<u64>,
) -> Result<PrefetchRequest, ApiError> {
    let key = RouteKey::new(parts)?;
    let loader = state.origin.loader(&key);
    let request = PrefetchRequest::with_loader(key, loader);
    Ok(match stale_time_ms {
        Some(ms) => request.with_stale_time(Duration::from_millis(ms)),
        None => request,
    })
}

fn stats_response(state: &AppState) -> StatsResponse {
    StatsResponse {
        ledger_entries: state.coordinator.ledger_len(),
        pending_fetches: state.coordinator.pending_fetches(),
        pending_timers: state.coordinator.pending_timers(),
        cached_payloads: state.cache.len(),
        origin_loads: state.origin.load_count(),
        events: state.coordinator.stats(),
    }
}

// ─── Route Handlers ────────────────────────────────────────────────────────

async fn prefetch(
    State(state): State<Arc<AppState>>,
    Json(body): Json<PrefetchBody>,
) -> Result<(StatusCode, Json<Accepted>), ApiError> {
    let request_id = Uuid::new_v4().to_string();
    let request = build_request(&state, body.key, None)?;
    let opts = options(body.delay_ms, body.stale_time_ms, body.on_hover);
    let key = request.key().to_string();

    info!(request_id = %request_id, key = %key, on_hover = opts.on_hover, "Prefetch request");

    let coordinator = state.coordinator.clone();
    tokio::spawn(async move {
        coordinator.prefetch(request, opts).await;
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(Accepted {
            request_id,
            keys: vec![key],
        }),
    ))
}

async fn prefetch_batch(
    State(state): State<Arc<AppState>>,
    Json(body): Json<BatchBody>,
) -> Result<(StatusCode, Json<Accepted>), ApiError> {
    let request_id = Uuid::new_v4().to_string();
    let requests = body
        .requests
        .into_iter()
        .map(|item| build_request(&state, item.key, item.stale_time_ms))
        .collect::<Result<Vec<_>, _>>()?;
    let keys: Vec<String> = requests.iter().map(|r| r.key().to_string()).collect();
    let opts = options(body.delay_ms, body.stale_time_ms, false);

    info!(request_id = %request_id, count = requests.len(), "Batch prefetch request");

    let coordinator = state.coordinator.clone();
    tokio::spawn(async move {
        coordinator.prefetch_many(requests, opts).await;
    });

    Ok((StatusCode::ACCEPTED, Json(Accepted { request_id, keys })))
}

async fn clear(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ClearBody>,
) -> Result<Json<Cleared>, ApiError> {
    let key = RouteKey::new(body.key)?;
    let removed = usize::from(state.coordinator.clear_prefetch(&key));
    Ok(Json(Cleared { removed }))
}

async fn clear_all(State(state): State<Arc<AppState>>) -> Json<Cleared> {
    Json(Cleared {
        removed: state.coordinator.clear_all_prefetch(),
    })
}

async fn stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    Json(stats_response(&state))
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        disposed: state.coordinator.is_disposed(),
        prefetch: stats_response(&state),
    })
}

async fn metrics(State(state): State<Arc<AppState>>) -> Result<String, ApiError> {
    Ok(state.metrics.render(&state.coordinator)?)
}
