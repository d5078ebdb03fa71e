//! System API endpoints.
//!
//! Provides an aggregate status view of the server and its radio.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use beacon_core::{Operation, SessionState};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::SharedState;

/// Creates the system router with all endpoints.
pub fn router() -> Router<SharedState> {
    Router::new().route("/status", get(get_status))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// System status response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "version": "0.1.0",
    "uptime_secs": 3600,
    "radio": "simulated",
    "bluetooth_enabled": true,
    "session_state": "advertising",
    "transitioning": null,
    "visible_devices": 0
}))]
pub struct SystemStatusResponse {
    /// Server version.
    #[schema(example = "0.1.0")]
    pub version: String,

    /// Server uptime in seconds.
    #[schema(example = 3600)]
    pub uptime_secs: u64,

    /// Which radio implementation is in use.
    #[schema(example = "simulated")]
    pub radio: String,

    /// Whether the radio is powered. `false` when it cannot be queried.
    #[schema(example = true)]
    pub bluetooth_enabled: bool,

    /// The radio role the session currently holds.
    pub session_state: SessionState,

    /// The operation waiting on the radio, if any.
    pub transitioning: Option<Operation>,

    /// Devices in the current scan results.
    #[schema(example = 0)]
    pub visible_devices: usize,
}

// ============================================================================
// Handlers
// ============================================================================

/// Get system status.
#[utoipa::path(
    get,
    path = "/api/system/status",
    tag = "system",
    operation_id = "getSystemStatus",
    summary = "Get system status",
    description = "Returns the current system status including version, uptime, \
        radio availability, and session state.",
    responses(
        (status = 200, description = "System status retrieved", body = SystemStatusResponse)
    )
)]
pub async fn get_status(State(state): State<SharedState>) -> Json<SystemStatusResponse> {
    let service = state.service();
    let snapshot = service.session().snapshot();

    let bluetooth_enabled = match service.is_bluetooth_enabled().await {
        Ok(enabled) => enabled,
        Err(e) => {
            tracing::warn!(error = %e, "Could not query radio power state");
            false
        }
    };

    Json(SystemStatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.uptime_secs(),
        radio: service.radio_kind().to_string(),
        bluetooth_enabled,
        session_state: snapshot.state,
        transitioning: snapshot.transitioning,
        visible_devices: service.get_scanned_devices().await.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_response_serialization() {
        let response = SystemStatusResponse {
            version: "0.1.0".to_string(),
            uptime_secs: 5,
            radio: "simulated".to_string(),
            bluetooth_enabled: true,
            session_state: SessionState::Scanning,
            transitioning: Some(Operation::StopScan),
            visible_devices: 2,
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"session_state\":\"scanning\""));
        assert!(json.contains("\"transitioning\":\"stop_scan\""));
    }
}
