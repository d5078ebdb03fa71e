//! Aggregation of discovery events into the current device list.
//!
//! The radio reports every advertisement it hears. The aggregator folds those
//! sightings into one entry per address and answers "which devices are
//! nearby right now", dropping entries that have not been heard within the
//! staleness horizon.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::trace;

use crate::types::{DiscoveredDevice, DiscoveryEvent};

/// Default staleness horizon.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(30);

/// What a recorded event did to the device table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// First sighting of this address.
    Inserted,
    /// Signal strength and last-seen time were refreshed.
    Updated,
    /// The event was older than the latest sighting; only a missing name
    /// could be filled in.
    OutOfOrder,
}

/// Folds discovery events into one entry per device address.
pub struct ScanAggregator {
    devices: RwLock<HashMap<String, DiscoveredDevice>>,
    stale_after: Duration,
}

impl ScanAggregator {
    /// Create an empty aggregator with the given staleness horizon.
    #[must_use]
    pub fn new(stale_after: Duration) -> Self {
        Self {
            devices: RwLock::new(HashMap::new()),
            stale_after,
        }
    }

    /// The staleness horizon.
    #[must_use]
    pub const fn stale_after(&self) -> Duration {
        self.stale_after
    }

    /// Fold one sighting into the table.
    ///
    /// Addresses are matched case-insensitively. The first non-empty name a
    /// device advertises is kept.
    pub async fn record(&self, event: DiscoveryEvent) -> RecordOutcome {
        let address = normalize_address(&event.address);
        let name = event.name.filter(|name| !name.trim().is_empty());

        let mut devices = self.devices.write().await;
        let outcome = match devices.get_mut(&address) {
            None => {
                devices.insert(
                    address.clone(),
                    DiscoveredDevice {
                        address: address.clone(),
                        name,
                        rssi: event.rssi,
                        last_seen: event.seen_at,
                    },
                );
                RecordOutcome::Inserted
            }
            Some(device) => {
                if device.name.is_none() {
                    device.name = name;
                }
                if event.seen_at < device.last_seen {
                    RecordOutcome::OutOfOrder
                } else {
                    device.rssi = event.rssi;
                    device.last_seen = event.seen_at;
                    RecordOutcome::Updated
                }
            }
        };
        trace!(%address, rssi = event.rssi, ?outcome, "Recorded sighting");
        outcome
    }

    /// Devices seen within the staleness horizon, strongest signal first.
    pub async fn current_devices(&self) -> Vec<DiscoveredDevice> {
        self.current_devices_at(Utc::now()).await
    }

    /// Devices seen within the staleness horizon of `now`, strongest
    /// signal first. Ties are ordered by address.
    pub async fn current_devices_at(&self, now: DateTime<Utc>) -> Vec<DiscoveredDevice> {
        let devices = self.devices.read().await;
        let mut current: Vec<DiscoveredDevice> = devices
            .values()
            .filter(|device| !self.is_stale(device, now))
            .cloned()
            .collect();
        current.sort_by(|a, b| b.rssi.cmp(&a.rssi).then_with(|| a.address.cmp(&b.address)));
        current
    }

    /// Look up one device regardless of staleness.
    pub async fn get(&self, address: &str) -> Option<DiscoveredDevice> {
        self.devices
            .read()
            .await
            .get(&normalize_address(address))
            .cloned()
    }

    /// Number of tracked devices, stale ones included.
    pub async fn len(&self) -> usize {
        self.devices.read().await.len()
    }

    /// Whether no device is tracked.
    pub async fn is_empty(&self) -> bool {
        self.devices.read().await.is_empty()
    }

    /// Forget every device.
    pub async fn clear(&self) {
        self.devices.write().await.clear();
    }

    /// Forget every device without waiting. Returns false if the map is
    /// busy and nothing was cleared.
    pub fn try_clear(&self) -> bool {
        match self.devices.try_write() {
            Ok(mut devices) => {
                devices.clear();
                true
            }
            Err(_) => false,
        }
    }

    fn is_stale(&self, device: &DiscoveredDevice, now: DateTime<Utc>) -> bool {
        // A sighting stamped in the future is fresh.
        (now - device.last_seen)
            .to_std()
            .is_ok_and(|age| age > self.stale_after)
    }
}

impl Default for ScanAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_STALE_AFTER)
    }
}

fn normalize_address(address: &str) -> String {
    address.trim().to_ascii_uppercase()
}
