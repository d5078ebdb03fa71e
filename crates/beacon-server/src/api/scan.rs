//! Scanning endpoints.

use std::time::Duration;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use beacon_core::{ScannedDevice, SessionSnapshot, SessionState};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::error::{ApiError, ApiResult};
use crate::state::SharedState;

/// Longest scan timeout accepted over HTTP.
const MAX_SCAN_TIMEOUT_SECS: u64 = 3600;

/// Creates the scan router, mounted at `/api/scan`.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/start", post(start_scan))
        .route("/stop", post(stop_scan))
        .route("/devices", get(get_scanned_devices))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Scan options.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({ "timeout_secs": 30 }))]
pub struct StartScanRequest {
    /// Stop the scan automatically after this many seconds. Without it the
    /// configured default applies.
    #[schema(example = 30, minimum = 1, maximum = 3600)]
    pub timeout_secs: Option<u64>,
}

/// Devices seen during the current scan.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "devices": [
        {"name": "Pixel 8", "address": "AA:BB:CC:DD:EE:FF", "rssi": -52}
    ],
    "scanning": true,
    "stale_after_secs": 30,
    "retrieved_at_utc": "2025-01-15T03:30:00Z"
}))]
pub struct ScanDevicesResponse {
    /// Devices seen within the staleness horizon, strongest signal first.
    pub devices: Vec<ScannedDevice>,

    /// Whether a scan is running.
    #[schema(example = true)]
    pub scanning: bool,

    /// Devices not heard from for this long are left out.
    #[schema(example = 30)]
    pub stale_after_secs: u64,

    /// When this list was assembled.
    #[schema(example = "2025-01-15T03:30:00Z")]
    pub retrieved_at_utc: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// Start scanning.
#[utoipa::path(
    post,
    path = "/api/scan/start",
    tag = "scan",
    operation_id = "startScanning",
    summary = "Start scanning",
    description = "Starts a scan from the idle state and clears the results of \
        the previous one. A timeout stops the scan on its own; that stop is an \
        ordinary transition back to idle.",
    request_body(content = StartScanRequest, description = "Scan options"),
    responses(
        (status = 200, description = "Scan started", body = SessionSnapshot),
        (status = 400, description = "Timeout out of range", body = super::error::ErrorResponse),
        (status = 403, description = "Scan permissions missing", body = super::error::ErrorResponse),
        (status = 409, description = "Not idle, or another operation is in flight", body = super::error::ErrorResponse),
        (status = 502, description = "Radio refused", body = super::error::ErrorResponse),
        (status = 503, description = "Radio is off", body = super::error::ErrorResponse)
    )
)]
pub async fn start_scan(
    State(state): State<SharedState>,
    request: Option<Json<StartScanRequest>>,
) -> ApiResult<Json<SessionSnapshot>> {
    let request = request.map(|Json(request)| request).unwrap_or_default();
    let timeout = match request.timeout_secs {
        Some(secs) if secs == 0 || secs > MAX_SCAN_TIMEOUT_SECS => {
            return Err(ApiError::BadRequest {
                error_code: "invalid_timeout".to_string(),
                message: format!("timeout_secs must be between 1 and {MAX_SCAN_TIMEOUT_SECS}"),
            });
        }
        secs => secs.map(Duration::from_secs),
    };

    state.service().start_scanning(timeout).await?;
    Ok(Json(state.service().session().snapshot()))
}

/// Stop scanning.
#[utoipa::path(
    post,
    path = "/api/scan/stop",
    tag = "scan",
    operation_id = "stopScanning",
    summary = "Stop scanning",
    description = "Idempotent: succeeds without effect unless scanning. Clears \
        the device list.",
    responses(
        (status = 200, description = "Scan stopped", body = SessionSnapshot),
        (status = 409, description = "Another operation is in flight", body = super::error::ErrorResponse),
        (status = 502, description = "Radio refused", body = super::error::ErrorResponse)
    )
)]
pub async fn stop_scan(State(state): State<SharedState>) -> ApiResult<Json<SessionSnapshot>> {
    state.service().stop_scanning().await?;
    Ok(Json(state.service().session().snapshot()))
}

/// Get devices seen during the current scan.
#[utoipa::path(
    get,
    path = "/api/scan/devices",
    tag = "scan",
    operation_id = "getScannedDevices",
    summary = "List scanned devices",
    responses(
        (status = 200, description = "Device list", body = ScanDevicesResponse)
    )
)]
pub async fn get_scanned_devices(State(state): State<SharedState>) -> Json<ScanDevicesResponse> {
    let service = state.service();
    Json(ScanDevicesResponse {
        devices: service.get_scanned_devices().await,
        scanning: service.session().state() == SessionState::Scanning,
        stale_after_secs: service.session().aggregator().stale_after().as_secs(),
        retrieved_at_utc: Utc::now().to_rfc3339(),
    })
}
