//! Bluetooth radio and permission endpoints.
//!
//! The host reports runtime permission results here; the session checks
//! them before anything reaches the radio.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use beacon_core::PermissionSet;
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use crate::api::error::ApiResult;
use crate::state::SharedState;

/// Creates the bluetooth router, mounted at `/api/bluetooth`.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(get_bluetooth_status))
        .route("/enable", post(request_enable))
}

/// Creates the permissions router, mounted at `/api/permissions`.
pub fn permissions_router() -> Router<SharedState> {
    Router::new().route("/", get(get_permissions).put(update_permissions))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Radio status response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "enabled": true,
    "radio": "simulated",
    "has_permission_subsystem": false
}))]
pub struct BluetoothStatusResponse {
    /// Whether the radio is powered.
    #[schema(example = true)]
    pub enabled: bool,

    /// Which radio implementation is in use.
    #[schema(example = "simulated")]
    pub radio: String,

    /// Whether the host gates Bluetooth behind runtime permissions.
    #[schema(example = false)]
    pub has_permission_subsystem: bool,
}

/// Result of an enable request.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({ "enabled": true }))]
pub struct EnableResponse {
    /// Whether the radio is powered after the request.
    #[schema(example = true)]
    pub enabled: bool,
}

/// Permission results as seen by the server.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "reported": {"BLUETOOTH_SCAN": "granted", "BLUETOOTH_CONNECT": "denied"},
    "effective": {"BLUETOOTH_SCAN": "granted", "BLUETOOTH_CONNECT": "denied"},
    "has_permission_subsystem": true
}))]
pub struct PermissionsResponse {
    /// Results as reported by the host. Kinds never reported are not determined.
    #[schema(value_type = Object)]
    pub reported: PermissionSet,

    /// Results operations are checked against. Everything is granted on
    /// hosts without a permission subsystem.
    #[schema(value_type = Object)]
    pub effective: PermissionSet,

    /// Whether the host gates Bluetooth behind runtime permissions.
    pub has_permission_subsystem: bool,
}

/// Permission results reported by the host.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[schema(example = json!({
    "permissions": {"BLUETOOTH_ADVERTISE": "granted", "BLUETOOTH_CONNECT": "granted"}
}))]
pub struct UpdatePermissionsRequest {
    /// Permission kind to status; merged over earlier reports.
    #[schema(value_type = Object)]
    pub permissions: PermissionSet,
}

// ============================================================================
// Handlers
// ============================================================================

/// Check whether the radio is powered.
#[utoipa::path(
    get,
    path = "/api/bluetooth",
    tag = "bluetooth",
    operation_id = "isBluetoothEnabled",
    summary = "Check radio power state",
    responses(
        (status = 200, description = "Radio status retrieved", body = BluetoothStatusResponse),
        (status = 503, description = "Radio unavailable", body = super::error::ErrorResponse)
    )
)]
pub async fn get_bluetooth_status(
    State(state): State<SharedState>,
) -> ApiResult<Json<BluetoothStatusResponse>> {
    let service = state.service();
    Ok(Json(BluetoothStatusResponse {
        enabled: service.is_bluetooth_enabled().await?,
        radio: service.radio_kind().to_string(),
        has_permission_subsystem: service.has_permission_subsystem(),
    }))
}

/// Ask the host to power the radio on.
#[utoipa::path(
    post,
    path = "/api/bluetooth/enable",
    tag = "bluetooth",
    operation_id = "requestBluetoothEnable",
    summary = "Request radio power-on",
    description = "Requires BLUETOOTH_CONNECT on hosts with a permission subsystem.",
    responses(
        (status = 200, description = "Request completed", body = EnableResponse),
        (status = 403, description = "BLUETOOTH_CONNECT not granted", body = super::error::ErrorResponse)
    )
)]
pub async fn request_enable(State(state): State<SharedState>) -> ApiResult<Json<EnableResponse>> {
    let enabled = state.service().request_bluetooth_enable().await?;
    Ok(Json(EnableResponse { enabled }))
}

/// Get reported and effective permission results.
#[utoipa::path(
    get,
    path = "/api/permissions",
    tag = "bluetooth",
    operation_id = "getPermissions",
    summary = "Get permission results",
    responses(
        (status = 200, description = "Permission results", body = PermissionsResponse)
    )
)]
pub async fn get_permissions(State(state): State<SharedState>) -> Json<PermissionsResponse> {
    let service = state.service();
    Json(PermissionsResponse {
        reported: service.permissions().await,
        effective: service.effective_permissions().await,
        has_permission_subsystem: service.has_permission_subsystem(),
    })
}

/// Report permission results from the host.
#[utoipa::path(
    put,
    path = "/api/permissions",
    tag = "bluetooth",
    operation_id = "updatePermissions",
    summary = "Report permission results",
    description = "Merges the given results over earlier reports. Kinds not \
        mentioned keep their previous status.",
    request_body = UpdatePermissionsRequest,
    responses(
        (status = 200, description = "Permission results recorded", body = PermissionsResponse),
        (status = 422, description = "Unknown permission kind or status")
    )
)]
pub async fn update_permissions(
    State(state): State<SharedState>,
    Json(request): Json<UpdatePermissionsRequest>,
) -> Json<PermissionsResponse> {
    let service = state.service();
    let reported = service.record_permissions(request.permissions).await;
    info!(?reported, "Permission results updated");
    Json(PermissionsResponse {
        reported,
        effective: service.effective_permissions().await,
        has_permission_subsystem: service.has_permission_subsystem(),
    })
}
