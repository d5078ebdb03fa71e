//! Shared types and OpenAPI schemas.
//!
//! Most of these cross the boundary to the HTTP layer, so they carry
//! `serde` and `utoipa` derives. Domain-specific types live next to their
//! owners (advertising payloads in [`crate::advertising`], scan state in
//! [`crate::scan`]).

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// The role the radio currently plays.
///
/// Advertising and scanning are mutually exclusive: they share one radio.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Neither advertising nor scanning.
    #[default]
    Idle,
    /// Broadcasting an advertisement payload.
    Advertising,
    /// Listening for peer advertisements.
    Scanning,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Advertising => "advertising",
            Self::Scanning => "scanning",
        })
    }
}

/// A session operation, used for error reporting and permission gating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Turn the radio on.
    EnableRadio,
    /// Begin advertising a payload.
    StartAdvertising,
    /// Change the payload of a live advertisement.
    UpdateAdvertisingData,
    /// End the advertising session.
    StopAdvertising,
    /// Begin scanning for peers.
    StartScan,
    /// End the scan session.
    StopScan,
}

impl Operation {
    /// Permissions that must be granted before this operation may reach the radio.
    #[must_use]
    pub const fn required_permissions(self) -> &'static [Permission] {
        match self {
            Self::EnableRadio => &[Permission::BluetoothConnect],
            Self::StartAdvertising => &[
                Permission::BluetoothAdvertise,
                Permission::BluetoothConnect,
            ],
            Self::StartScan => &[
                Permission::BluetoothScan,
                Permission::BluetoothConnect,
                Permission::AccessFineLocation,
            ],
            Self::UpdateAdvertisingData | Self::StopAdvertising | Self::StopScan => &[],
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::EnableRadio => "enable radio",
            Self::StartAdvertising => "start advertising",
            Self::UpdateAdvertisingData => "update advertising data",
            Self::StopAdvertising => "stop advertising",
            Self::StartScan => "start scan",
            Self::StopScan => "stop scan",
        })
    }
}

/// A runtime permission the host platform may gate Bluetooth use behind.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Permission {
    /// Discover nearby devices.
    BluetoothScan,
    /// Talk to the Bluetooth stack at all.
    BluetoothConnect,
    /// Broadcast advertisements.
    BluetoothAdvertise,
    /// Precise location, required for scanning on older platforms.
    AccessFineLocation,
    /// Approximate location.
    AccessCoarseLocation,
}

impl Permission {
    /// Every permission kind, in request order.
    pub const ALL: [Self; 5] = [
        Self::BluetoothScan,
        Self::BluetoothConnect,
        Self::AccessFineLocation,
        Self::BluetoothAdvertise,
        Self::AccessCoarseLocation,
    ];

    /// The platform name of this permission.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BluetoothScan => "BLUETOOTH_SCAN",
            Self::BluetoothConnect => "BLUETOOTH_CONNECT",
            Self::BluetoothAdvertise => "BLUETOOTH_ADVERTISE",
            Self::AccessFineLocation => "ACCESS_FINE_LOCATION",
            Self::AccessCoarseLocation => "ACCESS_COARSE_LOCATION",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a permission request.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum PermissionStatus {
    /// The user allowed it.
    Granted,
    /// The user refused it.
    Denied,
    /// Never asked.
    #[default]
    NotDetermined,
}

/// Permission results as last reported by the host platform.
///
/// A permission missing from the set counts as
/// [`PermissionStatus::NotDetermined`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet(BTreeMap<Permission, PermissionStatus>);

impl PermissionSet {
    /// An empty set: nothing determined yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every permission granted.
    ///
    /// Used for platforms without a runtime permission subsystem.
    #[must_use]
    pub fn pre_granted() -> Self {
        Permission::ALL
            .into_iter()
            .map(|permission| (permission, PermissionStatus::Granted))
            .collect()
    }

    /// Builder-style variant of [`PermissionSet::set`].
    #[must_use]
    pub fn with(mut self, permission: Permission, status: PermissionStatus) -> Self {
        self.set(permission, status);
        self
    }

    /// Record the status of one permission.
    pub fn set(&mut self, permission: Permission, status: PermissionStatus) {
        self.0.insert(permission, status);
    }

    /// Status of one permission.
    #[must_use]
    pub fn status(&self, permission: Permission) -> PermissionStatus {
        self.0.get(&permission).copied().unwrap_or_default()
    }

    /// Overlay another set on top of this one.
    pub fn merge(&mut self, other: &Self) {
        for (permission, status) in other.iter() {
            self.set(permission, status);
        }
    }

    /// The subset of `required` that is not granted, in the given order.
    #[must_use]
    pub fn missing(&self, required: &[Permission]) -> Vec<Permission> {
        required
            .iter()
            .copied()
            .filter(|permission| self.status(*permission) != PermissionStatus::Granted)
            .collect()
    }

    /// Whether every permission kind is granted.
    #[must_use]
    pub fn all_granted(&self) -> bool {
        self.missing(&Permission::ALL).is_empty()
    }

    /// Iterate over recorded statuses.
    pub fn iter(&self) -> impl Iterator<Item = (Permission, PermissionStatus)> + '_ {
        self.0.iter().map(|(permission, status)| (*permission, *status))
    }
}

impl FromIterator<(Permission, PermissionStatus)> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = (Permission, PermissionStatus)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A raw sighting reported by the radio while scanning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryEvent {
    /// Device address, e.g. `AA:BB:CC:DD:EE:FF`.
    pub address: String,
    /// Advertised local name, if any.
    pub name: Option<String>,
    /// Received signal strength in dBm.
    pub rssi: i16,
    /// When the advertisement was received.
    pub seen_at: DateTime<Utc>,
}

impl DiscoveryEvent {
    /// A sighting stamped with the current time.
    pub fn now(address: impl Into<String>, name: Option<String>, rssi: i16) -> Self {
        Self {
            address: address.into(),
            name,
            rssi,
            seen_at: Utc::now(),
        }
    }
}

/// A peer as tracked by the scan aggregator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "address": "AA:BB:CC:DD:EE:FF",
    "name": "Pixel 8",
    "rssi": -52,
    "last_seen": "2025-01-15T03:30:00Z"
}))]
pub struct DiscoveredDevice {
    /// Device address, normalized to upper case.
    #[schema(example = "AA:BB:CC:DD:EE:FF")]
    pub address: String,

    /// First non-empty name the device advertised.
    #[schema(example = "Pixel 8")]
    pub name: Option<String>,

    /// Most recent signal strength in dBm.
    #[schema(example = -52)]
    pub rssi: i16,

    /// Time of the most recent sighting.
    pub last_seen: DateTime<Utc>,
}

/// The view of a discovered device handed to UI callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "name": "Pixel 8",
    "address": "AA:BB:CC:DD:EE:FF",
    "rssi": -52
}))]
pub struct ScannedDevice {
    /// Advertised name, if known.
    #[schema(example = "Pixel 8")]
    pub name: Option<String>,

    /// Device address.
    #[schema(example = "AA:BB:CC:DD:EE:FF")]
    pub address: String,

    /// Signal strength in dBm.
    #[schema(example = -52)]
    pub rssi: i16,
}

impl From<DiscoveredDevice> for ScannedDevice {
    fn from(device: DiscoveredDevice) -> Self {
        Self {
            name: device.name,
            address: device.address,
            rssi: device.rssi,
        }
    }
}
