use axum::{extract::State, http::StatusCode, Json};
use tracing::{debug, error};

use crate::api::AppState;
use crate::health::HealthStatus;

/// GET /health
pub async fn health(
    State(state): State<AppState>,
) -> Result<Json<HealthStatus>, (StatusCode, Json<HealthStatus>)> {
    let health_status = state.health_checker.check_health().await;

    if health_status.is_healthy() {
        debug!("health check passed");
        Ok(Json(health_status))
    } else {
        error!(checks = ?health_status.checks, "health check failed - service unhealthy");
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(health_status)))
    }
}

/// GET /health/ready - ready once both stores answer
pub async fn readiness(
    state: State<AppState>,
) -> Result<Json<HealthStatus>, (StatusCode, Json<HealthStatus>)> {
    health(state).await
}

/// GET /health/live
pub async fn liveness() -> &'static str {
    "OK"
}
