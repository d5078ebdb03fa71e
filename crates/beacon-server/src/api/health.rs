//! Liveness endpoint.
//!
//! Always answers 200 while the process is up; `status` turns `degraded`
//! when the radio is off or cannot be queried.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use beacon_core::SessionState;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::SharedState;

/// Overall health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// The radio is powered.
    Ok,
    /// The server is up but the radio is off or unreachable.
    Degraded,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "status": "ok",
    "version": "0.1.0",
    "session_state": "idle"
}))]
pub struct HealthResponse {
    /// Overall health.
    pub status: HealthStatus,

    /// Server version.
    #[schema(example = "0.1.0")]
    pub version: String,

    /// The radio role the session currently holds.
    pub session_state: SessionState,
}

/// Creates the health router, mounted at `/health`.
pub fn router() -> Router<SharedState> {
    Router::new().route("/", get(health_check))
}

/// Health check endpoint.
#[utoipa::path(
    get,
    path = "/health",
    tag = "system",
    operation_id = "healthCheck",
    summary = "Check service health",
    responses(
        (status = 200, description = "Server is up", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<SharedState>) -> Json<HealthResponse> {
    let service = state.service();
    let status = match service.is_bluetooth_enabled().await {
        Ok(true) => HealthStatus::Ok,
        Ok(false) | Err(_) => HealthStatus::Degraded,
    };
    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        session_state: service.session().state(),
    })
}
