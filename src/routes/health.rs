use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::app_state::AppState;
use crate::models::api::ApiResponse;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub version: String,
    pub checks: ReadinessChecks,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReadinessChecks {
    pub database: ComponentHealth,
    pub queue: ComponentHealth,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: String,
    pub latency_ms: Option<u64>,
}

impl ComponentHealth {
    fn from_result<E>(result: Result<(), E>, start: Instant) -> Self {
        match result {
            Ok(()) => Self {
                status: "ok".to_string(),
                latency_ms: Some(start.elapsed().as_millis() as u64),
            },
            Err(_) => Self {
                status: "error".to_string(),
                latency_ms: None,
            },
        }
    }

    fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// GET /health: liveness.
pub async fn health_check(State(state): State<AppState>) -> Json<ApiResponse<HealthResponse>> {
    Json(ApiResponse::ok(HealthResponse {
        status: "healthy".to_string(),
        service: state.settings.service_name.clone(),
        timestamp: Utc::now(),
    }))
}

/// GET /health/ready: readiness with dependency status.
pub async fn readiness(
    State(state): State<AppState>,
) -> (StatusCode, Json<ApiResponse<ReadinessResponse>>) {
    let db_start = Instant::now();
    let database = ComponentHealth::from_result(state.store.ping().await, db_start);

    let queue_start = Instant::now();
    let queue = ComponentHealth::from_result(state.queue.ping().await, queue_start);

    let all_healthy = database.is_ok() && queue.is_ok();
    let status_code = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let mut response = ApiResponse::ok(ReadinessResponse {
        status: if all_healthy { "ok" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: ReadinessChecks { database, queue },
    });
    response.success = all_healthy;

    (status_code, Json(response))
}
