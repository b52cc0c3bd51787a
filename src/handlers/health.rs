//! Process-level health probe.
//!
//! A tiny server on its own port; the state machine pushes its lifecycle
//! snapshot here every 60 ticks and on every transition.

use axum::{extract::State, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;

/// State behind the probe.
pub struct HealthState {
    started_at: DateTime<Utc>,
    lifecycle: RwLock<Option<serde_json::Value>>,
}

impl HealthState {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            lifecycle: RwLock::new(None),
        }
    }

    /// Called by the state machine with its latest snapshot.
    pub fn update(&self, snapshot: serde_json::Value) {
        *self.lifecycle.write() = Some(snapshot);
    }
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the health probe router.
pub fn health_router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .with_state(state)
}

/// GET /healthz
async fn healthz(State(state): State<Arc<HealthState>>) -> Json<serde_json::Value> {
    let uptime = (Utc::now() - state.started_at).num_seconds();
    Json(serde_json::json!({
        "status": "ok",
        "uptimeSeconds": uptime,
        "lifecycle": state.lifecycle.read().clone(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_healthz_reports_lifecycle() {
        let state = Arc::new(HealthState::new());
        state.update(serde_json::json!({"state": "DISCOVER"}));
        let Json(body) = healthz(State(state)).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["lifecycle"]["state"], "DISCOVER");
    }
}
