//! status.rs — Plain-HTTP observability surface
//!
//! `/health` for liveness probes, `/status` for a JSON snapshot of the
//! pipeline: session states, batch counters, and the most recent
//! estimates. Read-only; nothing here can touch the fusion path.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;

use axum::routing::get;
use axum::{extract::State, Json, Router};
use serde_json::json;
use tokio::sync::RwLock;
use tracing::info;
use wither_types::EventEstimate;

const RECENT_CAP: usize = 32;

#[derive(Debug, Default)]
struct StatusInner {
    sessions: HashMap<String, bool>,
    batches_fused: u64,
    batches_dropped: u64,
    estimates_degraded: u64,
    recent: VecDeque<EventEstimate>,
}

/// Cheap-to-clone handle shared between the orchestrator (writer) and
/// the HTTP routes (readers).
#[derive(Clone, Default)]
pub struct StatusHandle {
    inner: Arc<RwLock<StatusInner>>,
}

impl StatusHandle {
    pub async fn set_session(&self, observer_id: &str, up: bool) {
        self.inner
            .write()
            .await
            .sessions
            .insert(observer_id.to_string(), up);
    }

    pub async fn record_fused(&self, estimate: &EventEstimate, degraded: bool) {
        let mut inner = self.inner.write().await;
        inner.batches_fused += 1;
        if degraded {
            inner.estimates_degraded += 1;
        }
        inner.recent.push_front(estimate.clone());
        inner.recent.truncate(RECENT_CAP);
    }

    pub async fn record_dropped(&self) {
        self.inner.write().await.batches_dropped += 1;
    }

    async fn snapshot(&self) -> serde_json::Value {
        let inner = self.inner.read().await;
        let sessions_up = inner.sessions.values().filter(|&&up| up).count();
        json!({
            "sessions": &inner.sessions,
            "sessions_up": sessions_up,
            "batches_fused": inner.batches_fused,
            "batches_dropped": inner.batches_dropped,
            "estimates_degraded": inner.estimates_degraded,
            "recent": inner.recent.iter().map(|e| json!({
                "x": e.x,
                "z": e.z,
                "y": e.y,
                "error_radius": if e.error_radius.is_finite() { Some(e.error_radius) } else { None },
                "flags": e.flags.iter().map(|f| format!("{f:?}")).collect::<Vec<_>>(),
                "observers": e.observations.len(),
                "sealed_at_ms": e.sealed_at_ms,
            })).collect::<Vec<_>>(),
        })
    }
}

async fn health() -> &'static str {
    "wither-backend ok"
}

async fn status(State(handle): State<StatusHandle>) -> Json<serde_json::Value> {
    Json(handle.snapshot().await)
}

/// Serve the status router until the process exits.
pub async fn serve(handle: StatusHandle, port: u16) {
    use tower_http::cors::{Any, CorsLayer};

    let app = Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .with_state(handle)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    let addr = format!("0.0.0.0:{port}");
    match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => {
            info!("status endpoint at http://{addr}/status");
            if let Err(e) = axum::serve(listener, app).await {
                tracing::warn!(error = %e, "status server stopped");
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, addr, "status server could not bind");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wither_types::EstimateFlag;

    #[tokio::test]
    async fn snapshot_reflects_recorded_activity() {
        let handle = StatusHandle::default();
        handle.set_session("obs-1", true).await;
        handle.set_session("obs-2", false).await;

        let estimate = EventEstimate {
            x: 1.0,
            z: 2.0,
            y: 64.0,
            error_radius: f64::INFINITY,
            feasible_region: None,
            flags: vec![EstimateFlag::IllConditioned],
            observations: Vec::new(),
            sealed_at_ms: 10,
        };
        handle.record_fused(&estimate, true).await;
        handle.record_dropped().await;

        let snap = handle.snapshot().await;
        assert_eq!(snap["sessions_up"], 1);
        assert_eq!(snap["batches_fused"], 1);
        assert_eq!(snap["batches_dropped"], 1);
        assert_eq!(snap["estimates_degraded"], 1);
        assert_eq!(snap["recent"][0]["error_radius"], serde_json::Value::Null);
    }
}
