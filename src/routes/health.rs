use std::time::{Duration, Instant};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::state::AppState;

const STORE_PING_TIMEOUT: Duration = Duration::from_secs(2);

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/live", get(live))
        .route("/ready", get(ready))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    store: &'static str,
    timestamp: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LivenessResponse {
    status: &'static str,
    timestamp: String,
    uptime: u64,
    version: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReadinessResponse {
    status: &'static str,
    timestamp: String,
    uptime: u64,
    store: StoreCheck,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StoreCheck {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    latency_ms: Option<u64>,
}

enum StoreStatus {
    Connected { latency_ms: u64 },
    Timeout,
    Disconnected,
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

async fn store_check(state: &AppState) -> StoreStatus {
    let engine = state.engine();
    let started = Instant::now();
    match tokio::time::timeout(STORE_PING_TIMEOUT, engine.ping()).await {
        Ok(Ok(())) => StoreStatus::Connected {
            latency_ms: started.elapsed().as_millis() as u64,
        },
        Ok(Err(err)) => {
            tracing::warn!(error = %err, "store ping failed");
            StoreStatus::Disconnected
        }
        Err(_) => StoreStatus::Timeout,
    }
}

async fn root(State(state): State<AppState>) -> Response {
    let ok = matches!(store_check(&state).await, StoreStatus::Connected { .. });
    let response = HealthResponse {
        status: if ok { "ok" } else { "degraded" },
        store: if ok { "connected" } else { "disconnected" },
        timestamp: now_iso(),
    };
    let status_code = if ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status_code, Json(response)).into_response()
}

async fn live(State(state): State<AppState>) -> Response {
    Json(LivenessResponse {
        status: "healthy",
        timestamp: now_iso(),
        uptime: state.uptime_seconds(),
        version: env!("CARGO_PKG_VERSION"),
    })
    .into_response()
}

async fn ready(State(state): State<AppState>) -> Response {
    let (status, store) = match store_check(&state).await {
        StoreStatus::Connected { latency_ms } => (
            "healthy",
            StoreCheck {
                status: "connected",
                latency_ms: Some(latency_ms),
            },
        ),
        StoreStatus::Timeout => (
            "degraded",
            StoreCheck {
                status: "timeout",
                latency_ms: None,
            },
        ),
        StoreStatus::Disconnected => (
            "unhealthy",
            StoreCheck {
                status: "disconnected",
                latency_ms: None,
            },
        ),
    };

    let status_code = if status == "unhealthy" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    let response = ReadinessResponse {
        status,
        timestamp: now_iso(),
        uptime: state.uptime_seconds(),
        store,
    };
    (status_code, Json(response)).into_response()
}
