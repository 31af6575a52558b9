// src/api.rs
//! HTTP surface for the browser overlay and desktop viewer.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::monitor::MonitorHandle;
use crate::notify::{NewItemEvent, RecentItems};
use crate::resolver::LiveResolver;

#[derive(Clone)]
pub struct AppState {
    pub resolver: LiveResolver,
    pub monitor: Option<MonitorHandle>,
    pub recent: Arc<RecentItems>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/api/resolve", get(resolve))
        .route("/api/monitor/trigger", post(trigger_monitor))
        .route("/api/recent", get(recent))
        // The overlay runs on the marketplace's origin.
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Deserialize)]
struct ResolveQuery {
    q: String,
    #[serde(default)]
    ref_price: Option<f64>,
}

async fn resolve(State(state): State<AppState>, Query(params): Query<ResolveQuery>) -> Response {
    if params.q.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "EMPTY_QUERY", "detail": "query `q` must not be empty" })),
        )
            .into_response();
    }

    match state.resolver.resolve(&params.q, params.ref_price).await {
        Ok(result) => Json(result.to_response()).into_response(),
        Err(e) => {
            tracing::warn!(target: "api", kind = %e.kind, "resolve failed upstream");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": e.kind, "status": e.status, "detail": e.detail })),
            )
                .into_response()
        }
    }
}

async fn trigger_monitor(State(state): State<AppState>) -> StatusCode {
    match &state.monitor {
        Some(h) => {
            h.trigger();
            StatusCode::ACCEPTED
        }
        None => StatusCode::SERVICE_UNAVAILABLE,
    }
}

#[derive(Deserialize)]
struct RecentQuery {
    #[serde(default = "default_recent_limit")]
    limit: usize,
}

fn default_recent_limit() -> usize {
    50
}

async fn recent(
    State(state): State<AppState>,
    Query(params): Query<RecentQuery>,
) -> Json<Vec<NewItemEvent>> {
    Json(state.recent.snapshot_last_n(params.limit))
}
