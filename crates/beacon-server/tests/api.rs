//! HTTP-level tests of the beacon API against the simulated radio.

use std::io::Write;
use std::sync::Arc;

use axum::http::StatusCode;
use axum_test::TestServer;
use beacon_core::{Config, DiscoveryEvent, SimulatedRadio};
use beacon_server::api::create_router;
use beacon_server::state::AppState;
use serde_json::{json, Value};
use tokio_test::assert_ok;
use uuid::Uuid;

fn server_with(config: Config) -> (TestServer, Arc<SimulatedRadio>) {
    let radio = Arc::new(SimulatedRadio::from_config(&config.simulation));
    let state = AppState::with_radio(radio.clone(), config).unwrap();
    (TestServer::new(create_router(state)).unwrap(), radio)
}

fn server() -> (TestServer, Arc<SimulatedRadio>) {
    server_with(Config::default())
}

#[tokio::test]
async fn test_health_reports_session_state() {
    let (server, _) = server();

    let response = server.get("/health").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["session_state"], "idle");
}

#[tokio::test]
async fn test_advertising_lifecycle() {
    let (server, radio) = server();

    let response = server.post("/api/advertising/start").await;
    response.assert_status_ok();
    let snapshot: Value = response.json();
    assert_eq!(snapshot["state"], "advertising");
    assert_eq!(snapshot["advertisement"]["device_name"], "beacon");

    let response = server
        .put("/api/advertising/data")
        .json(&json!({ "data_enabled": false }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["active"], true);
    assert_eq!(body["payload"]["data_enabled"], false);
    assert_eq!(body["data"]["manufacturer_data"], "a39501ff6e7800000102");

    server.post("/api/advertising/stop").await.assert_status_ok();
    server.post("/api/advertising/stop").await.assert_status_ok();
    assert!(radio.advertised().is_none());

    let body: Value = server.get("/api/advertising").await.json();
    assert_eq!(body["active"], false);
}

#[tokio::test]
async fn test_start_body_overrides_defaults() {
    let (server, radio) = server();
    let service = Uuid::new_v4();

    server
        .post("/api/advertising/start")
        .json(&json!({
            "device_name": "porch",
            "data_enabled": false,
            "service_uuids": [service]
        }))
        .await
        .assert_status_ok();

    let data = radio.advertised().unwrap();
    assert_eq!(data.local_name, "porch");
    assert!(data.service_uuids.contains(&service));
}

#[tokio::test]
async fn test_update_while_idle_conflicts() {
    let (server, _) = server();

    let response = server
        .put("/api/advertising/data")
        .json(&json!({ "data_enabled": true }))
        .await;
    response.assert_status(StatusCode::CONFLICT);
    let body: Value = response.json();
    assert_eq!(body["error"], "not_advertising");
}

#[tokio::test]
async fn test_scan_while_advertising_conflicts() {
    let (server, _) = server();
    server.post("/api/advertising/start").await.assert_status_ok();

    let response = server.post("/api/scan/start").await;
    response.assert_status(StatusCode::CONFLICT);
    let body: Value = response.json();
    assert_eq!(body["error"], "invalid_transition");
    assert_eq!(body["details"]["busy"], false);

    let body: Value = server.get("/api/session").await.json();
    assert_eq!(body["state"], "advertising");
}

#[tokio::test]
async fn test_empty_device_name_is_bad_request() {
    let (server, radio) = server();

    let response = server
        .post("/api/advertising/start")
        .json(&json!({ "device_name": "" }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(radio.call_count(), 0);
}

#[tokio::test]
async fn test_powered_off_radio_is_unavailable() {
    let mut config = Config::default();
    config.simulation.powered = false;
    let (server, _) = server_with(config);

    let body: Value = server.get("/api/bluetooth").await.json();
    assert_eq!(body["enabled"], false);
    assert_eq!(body["radio"], "simulated");
    let body: Value = server.get("/health").await.json();
    assert_eq!(body["status"], "degraded");

    let response = server.post("/api/scan/start").await;
    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);

    let body: Value = server.post("/api/bluetooth/enable").await.json();
    assert_eq!(body["enabled"], true);
    server.post("/api/scan/start").await.assert_status_ok();
}

#[tokio::test]
async fn test_adapter_failure_is_bad_gateway() {
    let (server, radio) = server();
    radio.fail_next(beacon_core::Operation::StartAdvertising, "ADVERTISING_START_FAILED");

    let response = server.post("/api/advertising/start").await;
    response.assert_status(StatusCode::BAD_GATEWAY);
    let body: Value = response.json();
    assert_eq!(body["error"], "adapter_failure");
}

#[tokio::test]
async fn test_permission_flow_from_config_file() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(b"[platform]\nhas_permission_subsystem = true\n")
        .unwrap();
    let config = assert_ok!(Config::load_from(Some(file.path())));
    let (server, _) = server_with(config);

    let response = server.post("/api/advertising/start").await;
    response.assert_status(StatusCode::FORBIDDEN);
    let body: Value = response.json();
    assert_eq!(
        body["details"]["missing"],
        json!(["BLUETOOTH_ADVERTISE", "BLUETOOTH_CONNECT"])
    );

    let response = server
        .put("/api/permissions")
        .json(&json!({
            "permissions": {
                "BLUETOOTH_ADVERTISE": "granted",
                "BLUETOOTH_CONNECT": "granted"
            }
        }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["effective"]["BLUETOOTH_CONNECT"], "granted");
    assert_eq!(body["has_permission_subsystem"], true);

    server.post("/api/advertising/start").await.assert_status_ok();
}

#[tokio::test]
async fn test_unknown_permission_kind_is_rejected() {
    let (server, _) = server();

    let response = server
        .put("/api/permissions")
        .json(&json!({ "permissions": { "CAMERA": "granted" } }))
        .await;
    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_scan_lists_devices_by_signal_strength() {
    let (server, radio) = server();

    let response = server
        .post("/api/scan/start")
        .json(&json!({ "timeout_secs": 60 }))
        .await;
    response.assert_status_ok();
    let snapshot: Value = response.json();
    assert_eq!(snapshot["scan"]["timeout_secs"], 60);

    assert!(radio.inject(DiscoveryEvent::now("aa:bb", None, -70)));
    assert!(radio.inject(DiscoveryEvent::now("cc:dd", Some("Tag".to_string()), -40)));

    let mut devices = Value::Null;
    for _ in 0..100 {
        let body: Value = server.get("/api/scan/devices").await.json();
        if body["devices"].as_array().is_some_and(|d| d.len() == 2) {
            devices = body["devices"].clone();
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(
        devices,
        json!([
            { "name": "Tag", "address": "CC:DD", "rssi": -40 },
            { "name": null, "address": "AA:BB", "rssi": -70 }
        ])
    );

    server.post("/api/scan/stop").await.assert_status_ok();
    let body: Value = server.get("/api/scan/devices").await.json();
    assert_eq!(body["scanning"], false);
    assert_eq!(body["devices"], json!([]));
}

#[tokio::test]
async fn test_scan_timeout_out_of_range() {
    let (server, _) = server();

    let response = server
        .post("/api/scan/start")
        .json(&json!({ "timeout_secs": 0 }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"], "invalid_timeout");
}

#[tokio::test]
async fn test_system_status() {
    let (server, _) = server();
    server.post("/api/advertising/start").await.assert_status_ok();

    let body: Value = server.get("/api/system/status").await.json();
    assert_eq!(body["radio"], "simulated");
    assert_eq!(body["bluetooth_enabled"], true);
    assert_eq!(body["session_state"], "advertising");
    assert_eq!(body["transitioning"], Value::Null);
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let (server, _) = server();

    let body: Value = server.get("/api/openapi.json").await.json();
    assert_eq!(body["info"]["title"], "beacon API");
    assert!(body["paths"]["/api/scan/start"].is_object());
}
