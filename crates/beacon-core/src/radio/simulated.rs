//! In-memory radio used when no platform stack is wired in.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::{RadioAdapter, RadioError, RadioResult};
use crate::advertising::AdvertisementData;
use crate::config::{SimulatedPeer, SimulationConfig};
use crate::types::{DiscoveryEvent, Operation};

/// One call made against a [`SimulatedRadio`], in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioCall {
    /// `request_enable`
    RequestEnable,
    /// `start_advertising` with the data it was given.
    StartAdvertising(AdvertisementData),
    /// `update_advertising` with the data it was given.
    UpdateAdvertising(AdvertisementData),
    /// `stop_advertising`
    StopAdvertising,
    /// `start_scan`
    StartScan,
    /// `stop_scan`
    StopScan,
}

/// A radio that lives entirely in memory.
///
/// While scanning it replays its configured peers at a fixed interval, and
/// tests can push extra sightings with [`SimulatedRadio::inject`]. Every
/// adapter call is recorded and can be delayed or made to fail.
pub struct SimulatedRadio {
    state: Mutex<SimState>,
    peers: Vec<SimulatedPeer>,
    sighting_interval: Duration,
}

struct SimState {
    powered: bool,
    advertising: Option<AdvertisementData>,
    scan: Option<ActiveScan>,
    calls: Vec<RadioCall>,
    failures: HashMap<Operation, String>,
    latency: Duration,
    ack_latency: Duration,
}

struct ActiveScan {
    events: mpsc::Sender<DiscoveryEvent>,
    replay: Option<JoinHandle<()>>,
}

impl Drop for ActiveScan {
    fn drop(&mut self) {
        if let Some(replay) = self.replay.take() {
            replay.abort();
        }
    }
}

impl SimulatedRadio {
    /// A powered radio with no simulated peers.
    #[must_use]
    pub fn new() -> Self {
        Self::with_peers(Vec::new(), Duration::from_secs(1))
    }

    /// A powered radio that replays `peers` every `sighting_interval` while scanning.
    #[must_use]
    pub fn with_peers(peers: Vec<SimulatedPeer>, sighting_interval: Duration) -> Self {
        Self {
            state: Mutex::new(SimState {
                powered: true,
                advertising: None,
                scan: None,
                calls: Vec::new(),
                failures: HashMap::new(),
                latency: Duration::ZERO,
                ack_latency: Duration::ZERO,
            }),
            peers,
            sighting_interval,
        }
    }

    /// Build from the `[simulation]` configuration section.
    #[must_use]
    pub fn from_config(config: &SimulationConfig) -> Self {
        let radio = Self::with_peers(
            config.peers.clone(),
            Duration::from_millis(config.sighting_interval_ms),
        );
        radio.set_enabled(config.powered);
        radio
    }

    /// Delay every adapter call by `latency`, as slow hardware would.
    #[must_use]
    pub fn with_latency(self, latency: Duration) -> Self {
        self.lock().latency = latency;
        self
    }

    /// Delay the confirmation of every call by `latency` after its effect
    /// has been applied, as stacks that report completion through a later
    /// callback do.
    #[must_use]
    pub fn with_ack_latency(self, latency: Duration) -> Self {
        self.lock().ack_latency = latency;
        self
    }

    /// Power the radio on or off.
    pub fn set_enabled(&self, powered: bool) {
        self.lock().powered = powered;
    }

    /// Make the next call of `operation` fail with `message`.
    pub fn fail_next(&self, operation: Operation, message: impl Into<String>) {
        self.lock().failures.insert(operation, message.into());
    }

    /// Whether the radio is powered.
    #[must_use]
    pub fn is_powered(&self) -> bool {
        self.lock().powered
    }

    /// The advertisement currently on air.
    #[must_use]
    pub fn advertised(&self) -> Option<AdvertisementData> {
        self.lock().advertising.clone()
    }

    /// Whether a scan is running.
    #[must_use]
    pub fn is_scanning(&self) -> bool {
        self.lock().scan.is_some()
    }

    /// Every call received so far.
    #[must_use]
    pub fn calls(&self) -> Vec<RadioCall> {
        self.lock().calls.clone()
    }

    /// Number of calls received so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    /// Push a sighting into the running scan.
    ///
    /// Returns `false` when no scan is running or the event buffer is full.
    pub fn inject(&self, event: DiscoveryEvent) -> bool {
        let state = self.lock();
        state
            .scan
            .as_ref()
            .is_some_and(|scan| scan.events.try_send(event).is_ok())
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn settle(&self) {
        let latency = self.lock().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    async fn acknowledge(&self) {
        let latency = self.lock().ack_latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    /// Record the call, then apply any scripted failure and the power check.
    fn begin(&self, call: RadioCall, operation: Operation) -> RadioResult<MutexGuard<'_, SimState>> {
        let mut state = self.lock();
        state.calls.push(call);
        if let Some(message) = state.failures.remove(&operation) {
            return Err(RadioError::Rejected { operation, message });
        }
        if !state.powered && operation != Operation::EnableRadio {
            return Err(RadioError::PoweredOff);
        }
        Ok(state)
    }

    fn spawn_replay(&self, events: &mpsc::Sender<DiscoveryEvent>) -> Option<JoinHandle<()>> {
        if self.peers.is_empty() || self.sighting_interval.is_zero() {
            return None;
        }
        let peers = self.peers.clone();
        let interval = self.sighting_interval;
        let events = events.clone();
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                for peer in &peers {
                    let event = DiscoveryEvent::now(peer.address.clone(), peer.name.clone(), peer.rssi);
                    if events.send(event).await.is_err() {
                        return;
                    }
                }
                trace!(peers = peers.len(), "Replayed simulated sightings");
            }
        }))
    }
}

impl Default for SimulatedRadio {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RadioAdapter for SimulatedRadio {
    fn kind(&self) -> &'static str {
        "simulated"
    }

    async fn is_enabled(&self) -> RadioResult<bool> {
        Ok(self.is_powered())
    }

    async fn request_enable(&self) -> RadioResult<bool> {
        self.settle().await;
        let mut state = self.begin(RadioCall::RequestEnable, Operation::EnableRadio)?;
        state.powered = true;
        Ok(true)
    }

    async fn start_advertising(&self, data: &AdvertisementData) -> RadioResult<()> {
        self.settle().await;
        {
            let mut state = self.begin(
                RadioCall::StartAdvertising(data.clone()),
                Operation::StartAdvertising,
            )?;
            if state.advertising.is_some() {
                return Err(RadioError::Rejected {
                    operation: Operation::StartAdvertising,
                    message: "an advertising set is already registered".to_string(),
                });
            }
            let (size, max) = (data.encoded_len(), data.parameters.max_data_len());
            if size > max {
                return Err(RadioError::DataTooLarge { size, max });
            }
            state.advertising = Some(data.clone());
        }
        debug!(local_name = %data.local_name, "Simulated advertising started");
        self.acknowledge().await;
        Ok(())
    }

    async fn update_advertising(&self, data: &AdvertisementData) -> RadioResult<()> {
        self.settle().await;
        {
            let mut state = self.begin(
                RadioCall::UpdateAdvertising(data.clone()),
                Operation::UpdateAdvertisingData,
            )?;
            let Some(live) = state.advertising.as_mut() else {
                return Err(RadioError::Rejected {
                    operation: Operation::UpdateAdvertisingData,
                    message: "no advertising set is registered".to_string(),
                });
            };
            *live = data.clone();
        }
        self.acknowledge().await;
        Ok(())
    }

    async fn stop_advertising(&self) -> RadioResult<()> {
        self.settle().await;
        self.begin(RadioCall::StopAdvertising, Operation::StopAdvertising)?
            .advertising = None;
        self.acknowledge().await;
        Ok(())
    }

    async fn start_scan(&self, events: mpsc::Sender<DiscoveryEvent>) -> RadioResult<()> {
        self.settle().await;
        let replay = {
            let state = self.begin(RadioCall::StartScan, Operation::StartScan)?;
            if state.scan.is_some() {
                return Err(RadioError::Rejected {
                    operation: Operation::StartScan,
                    message: "a scan is already running".to_string(),
                });
            }
            drop(state);
            self.spawn_replay(&events)
        };
        self.lock().scan = Some(ActiveScan { events, replay });
        self.acknowledge().await;
        Ok(())
    }

    async fn stop_scan(&self) -> RadioResult<()> {
        self.settle().await;
        drop(self.begin(RadioCall::StopScan, Operation::StopScan)?.scan.take());
        self.acknowledge().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advertising::AdvertisingParameters;

    fn sample_data() -> AdvertisementData {
        AdvertisementData {
            local_name: "beacon".to_string(),
            service_uuids: std::collections::BTreeSet::new(),
            manufacturer_id: 0x5450,
            manufacturer_data: vec![0xA3, 0x95, 0x01],
            parameters: AdvertisingParameters::default(),
        }
    }

    #[tokio::test]
    async fn test_calls_are_recorded_in_order() {
        let radio = SimulatedRadio::new();
        radio.start_advertising(&sample_data()).await.unwrap();
        radio.stop_advertising().await.unwrap();

        assert_eq!(
            radio.calls(),
            vec![
                RadioCall::StartAdvertising(sample_data()),
                RadioCall::StopAdvertising,
            ]
        );
        assert!(radio.advertised().is_none());
    }

    #[tokio::test]
    async fn test_powered_off_radio_rejects_advertising() {
        let radio = SimulatedRadio::new();
        radio.set_enabled(false);

        let err = radio.start_advertising(&sample_data()).await.unwrap_err();
        assert!(matches!(err, RadioError::PoweredOff));
        assert!(!radio.is_enabled().await.unwrap());

        assert!(radio.request_enable().await.unwrap());
        assert!(radio.is_enabled().await.unwrap());
    }

    #[tokio::test]
    async fn test_scripted_failure_fires_once() {
        let radio = SimulatedRadio::new();
        radio.fail_next(Operation::StartAdvertising, "status 18");

        let err = radio.start_advertising(&sample_data()).await.unwrap_err();
        assert!(matches!(err, RadioError::Rejected { .. }));
        radio.start_advertising(&sample_data()).await.unwrap();
    }

    #[tokio::test]
    async fn test_update_requires_live_advertisement() {
        let radio = SimulatedRadio::new();
        let err = radio.update_advertising(&sample_data()).await.unwrap_err();
        assert!(matches!(
            err,
            RadioError::Rejected {
                operation: Operation::UpdateAdvertisingData,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_oversized_legacy_advertisement_rejected() {
        let radio = SimulatedRadio::new();
        let mut data = sample_data();
        data.parameters.legacy_mode = true;
        data.manufacturer_data = vec![0; 40];

        let err = radio.start_advertising(&data).await.unwrap_err();
        assert!(matches!(err, RadioError::DataTooLarge { max: 31, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_effect_lands_before_acknowledgement() {
        let radio = SimulatedRadio::new().with_ack_latency(Duration::from_secs(5));

        let attempt =
            tokio::time::timeout(Duration::from_secs(1), radio.start_advertising(&sample_data()))
                .await;

        assert!(attempt.is_err());
        assert_eq!(radio.advertised(), Some(sample_data()));
    }

    #[tokio::test]
    async fn test_inject_only_while_scanning() {
        let radio = SimulatedRadio::new();
        assert!(!radio.inject(DiscoveryEvent::now("AA:BB", None, -40)));

        let (tx, mut rx) = mpsc::channel(4);
        radio.start_scan(tx).await.unwrap();
        assert!(radio.inject(DiscoveryEvent::now("AA:BB", None, -40)));
        assert_eq!(rx.recv().await.unwrap().address, "AA:BB");

        radio.stop_scan().await.unwrap();
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_configured_peers_are_replayed() {
        let peers = vec![SimulatedPeer {
            address: "11:22:33:44:55:66".to_string(),
            name: Some("Tag".to_string()),
            rssi: -61,
        }];
        let radio = SimulatedRadio::with_peers(peers, Duration::from_millis(500));

        let (tx, mut rx) = mpsc::channel(8);
        radio.start_scan(tx).await.unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.address, "11:22:33:44:55:66");
        let second = rx.recv().await.unwrap();
        assert_eq!(second.rssi, -61);

        radio.stop_scan().await.unwrap();
    }
}
