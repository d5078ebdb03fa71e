//! OpenAPI specification generation for the beacon API.
//!
//! The specification is served at `/api/openapi.json`, rendered by Swagger UI
//! at `/swagger-ui`, and written to disk by the `gen-openapi` binary for
//! client generation.

use axum::Json;
use utoipa::OpenApi;

use beacon_core::{
    AdvertiseRequest, AdvertisementData, AdvertisementPayload, AdvertisingInterval,
    AdvertisingParameters, Operation, Permission, PermissionStatus, ScanInfo, ScannedDevice,
    SessionSnapshot, SessionState, TxPowerLevel,
};

use super::advertising::{AdvertisingResponse, UpdateDataRequest};
use super::bluetooth::{
    BluetoothStatusResponse, EnableResponse, PermissionsResponse, UpdatePermissionsRequest,
};
use super::error::ErrorResponse;
use super::health::{HealthResponse, HealthStatus};
use super::scan::{ScanDevicesResponse, StartScanRequest};
use super::system::SystemStatusResponse;

/// Serve the OpenAPI specification as JSON.
pub async fn get_openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Returns the OpenAPI specification as a pretty-printed string.
///
/// # Errors
///
/// Returns an error if the document cannot be serialized.
pub fn get_openapi_json() -> Result<String, serde_json::Error> {
    ApiDoc::openapi().to_pretty_json()
}

/// Main OpenAPI document structure for beacon.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "beacon API",
        version = "0.1.0",
        description = r#"
# beacon API

beacon owns a Bluetooth Low Energy radio and lets one caller at a time use it
either to advertise a payload or to scan for nearby peers.

## Session model

The session is always in exactly one state: `idle`, `advertising` or
`scanning`. Advertising and scanning share the radio and exclude each other.

- Start operations are only legal from `idle`; anything else returns **409**.
- Stop operations are idempotent and succeed without effect in other states.
- While an operation waits on the radio, competing calls return **409** with
  `details.busy = true`. Retry once the session settles.

Preconditions are checked in a fixed order: session state, then permissions
(**403**), then radio power (**503**).

## Permissions

On hosts with a runtime permission subsystem, report results through
`PUT /api/permissions` before starting anything. Other hosts treat every
permission as granted.
"#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "/", description = "Local beacon server")
    ),
    tags(
        (
            name = "system",
            description = "Health checks and system status"
        ),
        (
            name = "bluetooth",
            description = "Radio power state and runtime permission results"
        ),
        (
            name = "advertising",
            description = "Broadcasting a payload and updating it in place"
        ),
        (
            name = "scan",
            description = "Discovering nearby peers"
        ),
        (
            name = "session",
            description = "Observing the session state"
        )
    ),
    paths(
        // Health endpoints
        super::health::health_check,
        // Bluetooth endpoints
        super::bluetooth::get_bluetooth_status,
        super::bluetooth::request_enable,
        super::bluetooth::get_permissions,
        super::bluetooth::update_permissions,
        // Advertising endpoints
        super::advertising::get_advertising,
        super::advertising::start_advertising,
        super::advertising::stop_advertising,
        super::advertising::update_advertising_data,
        // Scan endpoints
        super::scan::start_scan,
        super::scan::stop_scan,
        super::scan::get_scanned_devices,
        // Session endpoints
        super::session::get_session,
        super::session::session_events,
        // System endpoints
        super::system::get_status,
    ),
    components(
        schemas(
            // Error types
            ErrorResponse,
            // Health types
            HealthResponse,
            HealthStatus,
            // Bluetooth types
            BluetoothStatusResponse,
            EnableResponse,
            PermissionsResponse,
            UpdatePermissionsRequest,
            Permission,
            PermissionStatus,
            // Advertising types
            AdvertiseRequest,
            AdvertisementPayload,
            AdvertisementData,
            AdvertisingParameters,
            AdvertisingInterval,
            TxPowerLevel,
            AdvertisingResponse,
            UpdateDataRequest,
            // Scan types
            StartScanRequest,
            ScanDevicesResponse,
            ScannedDevice,
            // Session types
            SessionSnapshot,
            SessionState,
            ScanInfo,
            Operation,
            // System types
            SystemStatusResponse,
        )
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_spec_generation() {
        let spec = ApiDoc::openapi();
        assert_eq!(spec.info.title, "beacon API");
        assert!(spec.paths.paths.contains_key("/api/advertising/start"));
        assert!(spec.paths.paths.contains_key("/api/scan/devices"));
    }

    #[test]
    fn test_openapi_json_serialization() {
        let json = get_openapi_json().unwrap();
        assert!(json.contains("\"openapi\":"));
        assert!(json.contains("\"beacon API\""));
        assert!(json.contains("startAdvertising"));
    }
}
