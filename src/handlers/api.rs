//! REST endpoints of the dashboard API.
//!
//! All endpoints are unauthenticated reads over the current snapshot; the
//! only one that does live I/O is `/api/health`, which measures a single RPC
//! round-trip, and `/api/upcoming-launches`, which is served from a 30-second
//! cache.

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::catalog::CatalogClient;
use crate::config::AppConfig;
use crate::dashboard::DashboardState;
use crate::rpc::RpcPool;

/// Shared state for the API handlers.
pub struct ApiContext {
    pub dashboard: Arc<DashboardState>,
    pub rpc: Arc<RpcPool>,
    pub catalog: Arc<CatalogClient>,
    pub config_view: ConfigView,
}

/// Sanitised configuration served by `/api/config`. RPC URLs may embed API
/// keys, so only endpoint counts are exposed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigView {
    pub chain: ChainView,
    pub thresholds: ThresholdsView,
    pub virtuals: VirtualsView,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainView {
    pub id: u64,
    pub name: String,
    pub http_endpoints: usize,
    pub wss_endpoints: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdsView {
    pub big_trade_virtual: String,
    pub tax_window_minutes: u64,
    pub buyback_rate_window_minutes: u64,
    pub stall_alert_minutes: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualsView {
    pub api_base: String,
    pub poll_interval_ms: u64,
    pub max_project_age_minutes: u64,
}

impl ConfigView {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            chain: ChainView {
                id: config.chain.id,
                name: config.chain.name.clone(),
                http_endpoints: config.chain.rpc.http.len(),
                wss_endpoints: config.chain.rpc.wss.len(),
            },
            thresholds: ThresholdsView {
                big_trade_virtual: config.thresholds.big_trade_virtual.clone(),
                tax_window_minutes: config.thresholds.tax_window_minutes,
                buyback_rate_window_minutes: config.thresholds.buyback_rate_window_minutes,
                stall_alert_minutes: config.thresholds.stall_alert_minutes,
            },
            virtuals: VirtualsView {
                api_base: config.virtuals.api_base.clone(),
                poll_interval_ms: config.virtuals.poll_interval_ms,
                max_project_age_minutes: config.virtuals.max_project_age_minutes,
            },
        }
    }
}

/// Build the dashboard router: REST + push socket, CORS `*`.
pub fn api_router(ctx: Arc<ApiContext>) -> Router {
    Router::new()
        .route("/api/state", get(get_state))
        .route("/api/trades", get(get_trades))
        .route("/api/events", get(get_events))
        .route("/api/config", get(get_config))
        .route("/api/health", get(get_health))
        .route("/api/upcoming-launches", get(get_upcoming))
        .route("/ws", get(super::ws::ws_handler))
        .with_state(ctx)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// GET /api/state
async fn get_state(State(ctx): State<Arc<ApiContext>>) -> Json<serde_json::Value> {
    Json(ctx.dashboard.state_json())
}

/// GET /api/trades
async fn get_trades(State(ctx): State<Arc<ApiContext>>) -> impl IntoResponse {
    Json(ctx.dashboard.trades())
}

/// GET /api/events
async fn get_events(State(ctx): State<Arc<ApiContext>>) -> impl IntoResponse {
    Json(ctx.dashboard.events())
}

/// GET /api/config
async fn get_config(State(ctx): State<Arc<ApiContext>>) -> Json<ConfigView> {
    Json(ctx.config_view.clone())
}

/// GET /api/health
async fn get_health(State(ctx): State<Arc<ApiContext>>) -> impl IntoResponse {
    Json(ctx.rpc.health_snapshot().await)
}

/// GET /api/upcoming-launches
async fn get_upcoming(State(ctx): State<Arc<ApiContext>>) -> impl IntoResponse {
    match ctx.catalog.upcoming_launches().await {
        Ok(items) => Json(items).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Upcoming-launches request failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(serde_json::json!({"error": e.to_string()})),
            )
                .into_response()
        }
    }
}
