//! The command surface a UI layer talks to.
//!
//! [`BeaconService`] is a thin pass-through to the [`SessionManager`]. It
//! owns the permission results reported by the host and fills in configured
//! defaults for anything the caller leaves out.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::advertising::AdvertisementPayload;
use crate::config::Config;
use crate::error::Result;
use crate::radio::RadioAdapter;
use crate::session::SessionManager;
use crate::types::{PermissionSet, ScannedDevice};

/// Options for starting an advertisement. Unset fields take configured defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct AdvertiseRequest {
    /// Local name to broadcast.
    #[schema(example = "beacon")]
    pub device_name: Option<String>,

    /// Whether to start with the "on" frame. Defaults to `true`.
    #[schema(example = true)]
    pub data_enabled: Option<bool>,

    /// Service UUIDs to list.
    pub service_uuids: Option<Vec<Uuid>>,
}

/// The facade over the session manager.
///
/// Cheap to clone; clones share one session and one permission set.
#[derive(Clone)]
pub struct BeaconService {
    session: SessionManager,
    permissions: Arc<RwLock<PermissionSet>>,
    has_permission_subsystem: bool,
    device_name: String,
    service_uuids: Vec<Uuid>,
    default_scan_timeout: Option<Duration>,
}

impl BeaconService {
    /// Build the service around `radio`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when an advertising frame is not valid hex.
    pub fn new(radio: Arc<dyn RadioAdapter>, config: &Config) -> Result<Self> {
        Ok(Self {
            session: SessionManager::from_config(radio, config)?,
            permissions: Arc::new(RwLock::new(PermissionSet::new())),
            has_permission_subsystem: config.platform.has_permission_subsystem,
            device_name: config.advertising.device_name.clone(),
            service_uuids: config.advertising.service_uuids.clone(),
            default_scan_timeout: config.scan.default_timeout(),
        })
    }

    /// The underlying session.
    #[must_use]
    pub const fn session(&self) -> &SessionManager {
        &self.session
    }

    /// Short name of the radio implementation.
    #[must_use]
    pub fn radio_kind(&self) -> &'static str {
        self.session.radio().kind()
    }

    /// Whether the host gates Bluetooth behind runtime permissions.
    #[must_use]
    pub const fn has_permission_subsystem(&self) -> bool {
        self.has_permission_subsystem
    }

    /// Permission results as last reported by the host.
    pub async fn permissions(&self) -> PermissionSet {
        self.permissions.read().await.clone()
    }

    /// Merge newly reported permission results and return the full set.
    pub async fn record_permissions(&self, update: PermissionSet) -> PermissionSet {
        let mut permissions = self.permissions.write().await;
        permissions.merge(&update);
        debug!(?update, "Permission results recorded");
        permissions.clone()
    }

    /// The permissions operations are checked against.
    ///
    /// Hosts without a permission subsystem grant everything.
    pub async fn effective_permissions(&self) -> PermissionSet {
        if self.has_permission_subsystem {
            self.permissions().await
        } else {
            PermissionSet::pre_granted()
        }
    }

    /// Whether the radio is powered.
    ///
    /// # Errors
    ///
    /// Returns an error if the adapter cannot report its power state.
    pub async fn is_bluetooth_enabled(&self) -> Result<bool> {
        self.session.is_radio_enabled().await
    }

    /// Ask the host to power the radio on.
    ///
    /// # Errors
    ///
    /// Returns `PermissionDenied` without `BLUETOOTH_CONNECT`.
    #[instrument(skip(self))]
    pub async fn request_bluetooth_enable(&self) -> Result<bool> {
        let permissions = self.effective_permissions().await;
        self.session.request_radio_enable(&permissions).await
    }

    /// Start advertising.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidTransition`, `PermissionDenied`,
    /// `RadioUnavailable`, `InvalidPayload` or `AdapterFailure`.
    #[instrument(skip(self))]
    pub async fn start_advertising(&self, request: AdvertiseRequest) -> Result<()> {
        let payload = self.payload_for(request);
        let permissions = self.effective_permissions().await;
        self.session.request_advertise(payload, &permissions).await
    }

    /// Stop advertising. Idempotent.
    ///
    /// # Errors
    ///
    /// Fails while another transition is in flight, or if the radio refuses.
    #[instrument(skip(self))]
    pub async fn stop_advertising(&self) -> Result<()> {
        self.session.stop_advertise().await
    }

    /// Switch the advertised data frame on or off.
    ///
    /// # Errors
    ///
    /// Fails with `NotAdvertising` outside a live advertisement.
    #[instrument(skip(self))]
    pub async fn update_advertising_data(&self, data_enabled: bool) -> Result<()> {
        self.session.update_advertising_data(data_enabled).await
    }

    /// Start scanning. Without a `timeout` the configured default applies.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidTransition`, `PermissionDenied`,
    /// `RadioUnavailable` or `AdapterFailure`.
    #[instrument(skip(self))]
    pub async fn start_scanning(&self, timeout: Option<Duration>) -> Result<()> {
        let permissions = self.effective_permissions().await;
        self.session
            .request_scan(&permissions, timeout.or(self.default_scan_timeout))
            .await
    }

    /// Stop scanning. Idempotent.
    ///
    /// # Errors
    ///
    /// Fails while another transition is in flight, or if the radio refuses.
    #[instrument(skip(self))]
    pub async fn stop_scanning(&self) -> Result<()> {
        self.session.stop_scan().await
    }

    /// Devices seen recently, strongest signal first.
    pub async fn get_scanned_devices(&self) -> Vec<ScannedDevice> {
        self.session
            .current_devices()
            .await
            .into_iter()
            .map(ScannedDevice::from)
            .collect()
    }

    fn payload_for(&self, request: AdvertiseRequest) -> AdvertisementPayload {
        AdvertisementPayload {
            device_name: request
                .device_name
                .unwrap_or_else(|| self.device_name.clone()),
            data_enabled: request.data_enabled.unwrap_or(true),
            service_uuids: request
                .service_uuids
                .unwrap_or_else(|| self.service_uuids.clone())
                .into_iter()
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BeaconError;
    use crate::radio::SimulatedRadio;
    use crate::types::{Permission, PermissionStatus, SessionState};

    fn service(config: &Config) -> (BeaconService, Arc<SimulatedRadio>) {
        let radio = Arc::new(SimulatedRadio::new());
        (BeaconService::new(radio.clone(), config).unwrap(), radio)
    }

    fn gated() -> Config {
        let mut config = Config::default();
        config.platform.has_permission_subsystem = true;
        config
    }

    #[tokio::test]
    async fn test_defaults_fill_advertise_request() {
        let mut config = Config::default();
        config.advertising.device_name = "porch".to_string();
        config.advertising.service_uuids = vec![Uuid::nil()];
        let (service, radio) = service(&config);

        service
            .start_advertising(AdvertiseRequest::default())
            .await
            .unwrap();

        let payload = service.session().payload().unwrap();
        assert_eq!(payload.device_name, "porch");
        assert!(payload.data_enabled);
        assert!(payload.service_uuids.contains(&Uuid::nil()));
        assert_eq!(radio.advertised().unwrap().local_name, "porch");
    }

    #[tokio::test]
    async fn test_no_permission_subsystem_grants_everything() {
        let (service, _) = service(&Config::default());
        assert!(service.effective_permissions().await.all_granted());
        assert_eq!(service.permissions().await.missing(&Permission::ALL).len(), 5);
    }

    #[tokio::test]
    async fn test_permission_gate_uses_recorded_results() {
        let (service, radio) = service(&gated());

        let err = service
            .start_advertising(AdvertiseRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BeaconError::PermissionDenied { .. }));
        assert_eq!(radio.call_count(), 0);

        service
            .record_permissions(
                PermissionSet::new()
                    .with(Permission::BluetoothAdvertise, PermissionStatus::Granted)
                    .with(Permission::BluetoothConnect, PermissionStatus::Granted),
            )
            .await;
        service
            .start_advertising(AdvertiseRequest::default())
            .await
            .unwrap();
        assert_eq!(service.session().state(), SessionState::Advertising);
    }

    #[tokio::test]
    async fn test_enable_requires_connect_permission() {
        let (service, radio) = service(&gated());
        radio.set_enabled(false);

        let err = service.request_bluetooth_enable().await.unwrap_err();
        assert!(matches!(
            err,
            BeaconError::PermissionDenied { ref missing } if missing == &[Permission::BluetoothConnect]
        ));

        service
            .record_permissions(
                PermissionSet::new().with(Permission::BluetoothConnect, PermissionStatus::Granted),
            )
            .await;
        assert!(service.request_bluetooth_enable().await.unwrap());
        assert!(service.is_bluetooth_enabled().await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_configured_scan_timeout_applies() {
        let mut config = Config::default();
        config.scan.default_timeout_secs = Some(10);
        let (service, _) = service(&config);

        service.start_scanning(None).await.unwrap();
        let scan = service.session().snapshot().scan.unwrap();
        assert_eq!(scan.timeout_secs, Some(10));

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(service.session().state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_scanned_devices_are_projected() {
        let (service, radio) = service(&Config::default());
        service.start_scanning(None).await.unwrap();

        assert!(radio.inject(crate::types::DiscoveryEvent::now(
            "aa:bb:cc:dd:ee:ff",
            Some("Tag".to_string()),
            -42
        )));
        for _ in 0..100 {
            if !service.get_scanned_devices().await.is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }

        let devices = service.get_scanned_devices().await;
        assert_eq!(
            devices,
            vec![ScannedDevice {
                name: Some("Tag".to_string()),
                address: "AA:BB:CC:DD:EE:FF".to_string(),
                rssi: -42,
            }]
        );
    }
}
