//! The session state machine.
//!
//! [`SessionManager`] is the single owner of the radio role. It enforces the
//! transition table
//!
//! | state       | advertise     | stop advertise | scan       | stop scan |
//! |-------------|---------------|----------------|------------|-----------|
//! | Idle        | → Advertising | no-op          | → Scanning | no-op     |
//! | Advertising | error         | → Idle         | error      | no-op     |
//! | Scanning    | error         | no-op          | error      | → Idle    |
//!
//! and checks preconditions in a fixed order: state, then permissions, then
//! radio availability. Illegal requests never reach the adapter.
//!
//! ## Locking
//!
//! Session state sits behind a short-lived mutex that is never held across
//! an adapter call. While a transition waits on the radio the phase reads
//! [`Phase::Transitioning`], so competing callers get a busy
//! [`BeaconError::InvalidTransition`] instead of blocking. Adapter calls
//! themselves are serialized through a FIFO lane.
//!
//! If a caller drops a transition future before the adapter call goes out,
//! the phase rolls back. Once the call has gone out the radio may already
//! have acted on it, so the session drops to idle and remembers the role as
//! unsettled; the next stop or start for either role sends the radio a stop
//! first.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use crate::advertising::{AdvertisementController, AdvertisementData, AdvertisementPayload};
use crate::config::Config;
use crate::error::{BeaconError, Result};
use crate::radio::RadioAdapter;
use crate::scan::ScanAggregator;
use crate::types::{DiscoveredDevice, DiscoveryEvent, Operation, PermissionSet, SessionState};

const DEFAULT_EVENT_BUFFER: usize = 256;

/// Delay before retrying a timed-out scan whose stop the radio refused.
const SCAN_STOP_RETRY: Duration = Duration::from_secs(5);

/// The session state plus the in-flight marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Neither advertising nor scanning.
    Idle,
    /// Advertising is live.
    Advertising,
    /// A scan is running.
    Scanning,
    /// `operation` is waiting on the radio; the session was in `from`.
    Transitioning {
        /// State before the operation began.
        from: SessionState,
        /// The operation in flight.
        operation: Operation,
    },
}

impl Phase {
    /// The settled state this phase reports to callers.
    #[must_use]
    pub const fn state(self) -> SessionState {
        match self {
            Self::Idle => SessionState::Idle,
            Self::Advertising => SessionState::Advertising,
            Self::Scanning => SessionState::Scanning,
            Self::Transitioning { from, .. } => from,
        }
    }

    /// The operation in flight, if any.
    #[must_use]
    pub const fn pending_operation(self) -> Option<Operation> {
        match self {
            Self::Transitioning { operation, .. } => Some(operation),
            _ => None,
        }
    }
}

impl From<SessionState> for Phase {
    fn from(state: SessionState) -> Self {
        match state {
            SessionState::Idle => Self::Idle,
            SessionState::Advertising => Self::Advertising,
            SessionState::Scanning => Self::Scanning,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transitioning { operation, .. } => write!(f, "{operation} is in progress"),
            settled => write!(f, "{}", settled.state()),
        }
    }
}

/// Details of the running scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ScanInfo {
    /// Sequence number of the scan session.
    pub id: u64,
    /// When the radio started scanning.
    pub started_at: DateTime<Utc>,
    /// Timeout after which the scan stops itself.
    pub timeout_secs: Option<u64>,
}

/// A point-in-time view of the session, as published to subscribers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct SessionSnapshot {
    /// The settled state.
    pub state: SessionState,
    /// The operation waiting on the radio, if any.
    pub transitioning: Option<Operation>,
    /// The payload on air while advertising.
    pub advertisement: Option<AdvertisementPayload>,
    /// The running scan.
    pub scan: Option<ScanInfo>,
}

/// A running scan and the tasks that serve it.
struct ScanSession {
    id: u64,
    started_at: DateTime<Utc>,
    timeout: Option<Duration>,
    pump: Option<JoinHandle<()>>,
    timer: Option<JoinHandle<()>>,
}

impl ScanSession {
    fn info(&self) -> ScanInfo {
        ScanInfo {
            id: self.id,
            started_at: self.started_at,
            timeout_secs: self.timeout.map(|timeout| timeout.as_secs()),
        }
    }

    /// Stop the timer and wait for the event pump to wind down, so no
    /// sighting lands in the aggregator after this returns.
    async fn shutdown(mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        if let Some(pump) = self.pump.take() {
            pump.abort();
            let _ = pump.await;
        }
    }
}

impl Drop for ScanSession {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

struct SessionInner {
    phase: Phase,
    advertising: AdvertisementController,
    scan: Option<ScanSession>,
    next_scan_id: u64,
    /// A role the radio may still hold after an abandoned transition.
    unsettled: Option<SessionState>,
}

impl SessionInner {
    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.phase.state(),
            transitioning: self.phase.pending_operation(),
            advertisement: self.advertising.payload().cloned(),
            scan: self.scan.as_ref().map(ScanSession::info),
        }
    }
}

struct Shared {
    radio: Arc<dyn RadioAdapter>,
    state: Mutex<SessionInner>,
    radio_lane: tokio::sync::Mutex<()>,
    aggregator: Arc<ScanAggregator>,
    snapshots: watch::Sender<SessionSnapshot>,
    event_buffer: usize,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, inner: &SessionInner) {
        self.snapshots.send_replace(inner.snapshot());
    }

    /// Mark `operation` as in flight.
    fn begin(&self, inner: &mut SessionInner, operation: Operation) -> Pending<'_> {
        let from = inner.phase.state();
        inner.phase = Phase::Transitioning { from, operation };
        self.publish(inner);
        debug!(%operation, %from, "Transition started");
        Pending {
            shared: self,
            operation,
            fallback: from,
            armed: true,
            issued: false,
        }
    }
}

/// The in-flight marker of one transition.
///
/// Dropping it without [`Pending::complete`] puts the phase back to the
/// fallback state, unless the adapter call was already issued. In that case
/// the radio's role is unknown: the phase drops to idle and the role is
/// recorded as unsettled.
struct Pending<'a> {
    shared: &'a Shared,
    operation: Operation,
    fallback: SessionState,
    armed: bool,
    issued: bool,
}

impl Pending<'_> {
    /// Mark that the adapter call is about to go out.
    fn issue(&mut self) {
        self.issued = true;
    }

    /// The radio confirmed; an abandoned transition now lands in `state`.
    fn confirmed(&mut self, state: SessionState) {
        self.issued = false;
        self.fallback = state;
    }

    /// Apply the outcome and clear the marker.
    fn complete(mut self, apply: impl FnOnce(&mut SessionInner)) {
        self.armed = false;
        let mut inner = self.shared.lock();
        apply(&mut inner);
        self.shared.publish(&inner);
    }
}

impl Drop for Pending<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut inner = self.shared.lock();
        if inner.phase.pending_operation().is_none() {
            return;
        }
        let operation = self.operation;
        if self.issued {
            let role = match operation {
                Operation::StartAdvertising | Operation::StopAdvertising => {
                    inner.advertising.clear();
                    Some(SessionState::Advertising)
                }
                Operation::StartScan | Operation::StopScan => {
                    inner.scan = None;
                    self.shared.aggregator.try_clear();
                    Some(SessionState::Scanning)
                }
                _ => None,
            };
            warn!(%operation, ?role, "Transition abandoned after reaching the radio");
            inner.unsettled = role.or(inner.unsettled);
            inner.phase = Phase::Idle;
        } else {
            debug!(%operation, fallback = %self.fallback, "Transition abandoned");
            inner.phase = self.fallback.into();
        }
        self.shared.publish(&inner);
    }
}

/// Owns the radio role and drives the [`RadioAdapter`].
///
/// Cheap to clone; clones share one session.
#[derive(Clone)]
pub struct SessionManager {
    shared: Arc<Shared>,
}

impl SessionManager {
    /// A session with default advertising frames and scan settings.
    #[must_use]
    pub fn new(radio: Arc<dyn RadioAdapter>) -> Self {
        Self::with_parts(
            radio,
            AdvertisementController::default(),
            Arc::new(ScanAggregator::default()),
            DEFAULT_EVENT_BUFFER,
        )
    }

    /// A session configured from the `[advertising]` and `[scan]` sections.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when an advertising frame is not valid hex.
    pub fn from_config(radio: Arc<dyn RadioAdapter>, config: &Config) -> Result<Self> {
        Ok(Self::with_parts(
            radio,
            AdvertisementController::from_config(&config.advertising)?,
            Arc::new(ScanAggregator::new(config.scan.stale_after())),
            config.scan.event_buffer.max(1),
        ))
    }

    fn with_parts(
        radio: Arc<dyn RadioAdapter>,
        advertising: AdvertisementController,
        aggregator: Arc<ScanAggregator>,
        event_buffer: usize,
    ) -> Self {
        let (snapshots, _) = watch::channel(SessionSnapshot::default());
        Self {
            shared: Arc::new(Shared {
                radio,
                state: Mutex::new(SessionInner {
                    phase: Phase::Idle,
                    advertising,
                    scan: None,
                    next_scan_id: 0,
                    unsettled: None,
                }),
                radio_lane: tokio::sync::Mutex::new(()),
                aggregator,
                snapshots,
                event_buffer,
            }),
        }
    }

    /// The settled session state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.shared.lock().phase.state()
    }

    /// The phase, including any transition in flight.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.shared.lock().phase
    }

    /// The current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.shared.lock().snapshot()
    }

    /// Watch the session; a new snapshot is published on every change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.shared.snapshots.subscribe()
    }

    /// The payload on air, if advertising.
    #[must_use]
    pub fn payload(&self) -> Option<AdvertisementPayload> {
        self.shared.lock().advertising.payload().cloned()
    }

    /// The advertisement on air, exactly as handed to the radio.
    #[must_use]
    pub fn advertisement_data(&self) -> Option<AdvertisementData> {
        let inner = self.shared.lock();
        inner
            .advertising
            .payload()
            .map(|payload| inner.advertising.render(payload))
    }

    /// The scan aggregator.
    #[must_use]
    pub fn aggregator(&self) -> &ScanAggregator {
        &self.shared.aggregator
    }

    /// The radio this session drives.
    #[must_use]
    pub fn radio(&self) -> &Arc<dyn RadioAdapter> {
        &self.shared.radio
    }

    /// Devices seen within the staleness horizon, strongest signal first.
    pub async fn current_devices(&self) -> Vec<DiscoveredDevice> {
        self.shared.aggregator.current_devices().await
    }

    /// Whether the radio is powered.
    ///
    /// # Errors
    ///
    /// Returns an error if the adapter cannot report its power state.
    pub async fn is_radio_enabled(&self) -> Result<bool> {
        Ok(self.shared.radio.is_enabled().await?)
    }

    /// Ask the platform to power the radio on.
    ///
    /// # Errors
    ///
    /// Returns [`BeaconError::PermissionDenied`] without `BLUETOOTH_CONNECT`,
    /// or the adapter's failure.
    pub async fn request_radio_enable(&self, permissions: &PermissionSet) -> Result<bool> {
        ensure_permissions(Operation::EnableRadio, permissions)?;
        let _lane = self.shared.radio_lane.lock().await;
        let enabled = self.shared.radio.request_enable().await?;
        info!(enabled, "Radio enable requested");
        Ok(enabled)
    }

    /// Start advertising `payload`.
    ///
    /// # Errors
    ///
    /// - [`BeaconError::InvalidPayload`] if the payload cannot be broadcast,
    ///   including an advertisement too large for the advertising mode
    /// - [`BeaconError::InvalidTransition`] unless the session is idle
    /// - [`BeaconError::PermissionDenied`] if advertise permissions are missing
    /// - [`BeaconError::RadioUnavailable`] if the radio is off
    /// - [`BeaconError::AdapterFailure`] if the radio refuses
    pub async fn request_advertise(
        &self,
        payload: AdvertisementPayload,
        permissions: &PermissionSet,
    ) -> Result<()> {
        payload.validate()?;
        let data = self.shared.lock().advertising.render(&payload);
        data.ensure_fits()?;
        let mut pending = self.begin_from_idle(Operation::StartAdvertising, permissions)?;

        let _lane = self.shared.radio_lane.lock().await;
        self.ensure_radio_enabled().await?;
        self.settle_abandoned().await;

        pending.issue();
        if let Err(e) = self.shared.radio.start_advertising(&data).await {
            warn!(error = %e, "Radio refused to start advertising");
            pending.confirmed(SessionState::Idle);
            return Err(e.into());
        }

        info!(
            device_name = %payload.device_name,
            data_enabled = payload.data_enabled,
            services = payload.service_uuids.len(),
            "Advertising started"
        );
        pending.complete(|inner| {
            inner.advertising.activate(payload);
            inner.phase = Phase::Advertising;
        });
        Ok(())
    }

    /// Stop advertising. A no-op unless advertising, or unless an abandoned
    /// transition may have left an advertisement on air.
    ///
    /// When configured, the off frame is pushed in place before the
    /// advertisement is torn down.
    ///
    /// # Errors
    ///
    /// Returns a busy [`BeaconError::InvalidTransition`] while another
    /// transition is in flight, or the adapter's failure.
    pub async fn stop_advertise(&self) -> Result<()> {
        let mut pending = {
            let mut inner = self.shared.lock();
            let phase = inner.phase;
            match phase {
                Phase::Idle if inner.unsettled == Some(SessionState::Advertising) => {
                    self.shared.begin(&mut inner, Operation::StopAdvertising)
                }
                Phase::Idle | Phase::Scanning => return Ok(()),
                Phase::Transitioning { .. } => {
                    return Err(BeaconError::InvalidTransition {
                        operation: Operation::StopAdvertising,
                        state: phase,
                    })
                }
                Phase::Advertising => self.shared.begin(&mut inner, Operation::StopAdvertising),
            }
        };

        let _lane = self.shared.radio_lane.lock().await;
        // Stopping from idle only settles an abandoned advertisement.
        if pending.fallback == SessionState::Idle {
            self.settle_abandoned().await;
            pending.complete(|inner| inner.phase = Phase::Idle);
            return Ok(());
        }

        let off_frame = {
            let mut inner = self.shared.lock();
            let off_frame = inner.advertising.off_frame_for_stop();
            if off_frame.is_some() {
                inner.advertising.set_on_air(None);
            }
            off_frame
        };
        pending.issue();
        let off_frame_sent = match off_frame {
            Some(data) => match self.shared.radio.update_advertising(&data).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(error = %e, "Could not push the off frame before stopping");
                    false
                }
            },
            None => false,
        };

        if let Err(e) = self.shared.radio.stop_advertising().await {
            warn!(error = %e, "Radio refused to stop advertising");
            pending.confirmed(SessionState::Advertising);
            if off_frame_sent {
                self.restore_advertisement().await;
            }
            return Err(e.into());
        }

        info!("Advertising stopped");
        pending.complete(|inner| {
            inner.advertising.clear();
            inner.phase = Phase::Idle;
        });
        Ok(())
    }

    /// Switch the data frame of the live advertisement on or off, in place.
    ///
    /// Repeating the value the radio last confirmed does not touch the radio;
    /// after an update that never confirmed, the frame is always resent.
    /// Updates queue
    /// behind each other in call order, so the radio ends on the last value
    /// requested. A concurrent stop wins: an update that has not reached the
    /// radio by then is rejected.
    ///
    /// # Errors
    ///
    /// Returns [`BeaconError::NotAdvertising`] outside a live advertisement,
    /// or the adapter's failure.
    pub async fn update_advertising_data(&self, data_enabled: bool) -> Result<()> {
        let epoch = {
            let inner = self.shared.lock();
            if inner.phase != Phase::Advertising {
                return Err(BeaconError::NotAdvertising);
            }
            inner.advertising.epoch().ok_or(BeaconError::NotAdvertising)?
        };

        let _lane = self.shared.radio_lane.lock().await;

        let planned = {
            let mut inner = self.shared.lock();
            if inner.phase != Phase::Advertising {
                debug!(data_enabled, "Advertising ended before the update reached the radio");
                return Err(BeaconError::NotAdvertising);
            }
            inner.advertising.plan_update(epoch, data_enabled)?
        };
        let Some(data) = planned else {
            debug!(data_enabled, "Advertising data already in requested state");
            return Ok(());
        };

        self.shared.radio.update_advertising(&data).await?;

        let mut inner = self.shared.lock();
        inner.advertising.commit_update(epoch, data_enabled);
        self.shared.publish(&inner);
        info!(data_enabled, "Advertising data updated");
        Ok(())
    }

    /// Start scanning, clearing the results of any previous scan.
    ///
    /// With a `timeout` the scan stops itself once it elapses; that stop is
    /// an ordinary transition to idle.
    ///
    /// # Errors
    ///
    /// - [`BeaconError::InvalidTransition`] unless the session is idle
    /// - [`BeaconError::PermissionDenied`] if scan permissions are missing
    /// - [`BeaconError::RadioUnavailable`] if the radio is off
    /// - [`BeaconError::AdapterFailure`] if the radio refuses
    pub async fn request_scan(
        &self,
        permissions: &PermissionSet,
        timeout: Option<Duration>,
    ) -> Result<()> {
        let mut pending = self.begin_from_idle(Operation::StartScan, permissions)?;

        let _lane = self.shared.radio_lane.lock().await;
        self.ensure_radio_enabled().await?;
        self.settle_abandoned().await;

        self.shared.aggregator.clear().await;
        let (events, receiver) = mpsc::channel(self.shared.event_buffer);
        pending.issue();
        if let Err(e) = self.shared.radio.start_scan(events).await {
            warn!(error = %e, "Radio refused to start scanning");
            pending.confirmed(SessionState::Idle);
            return Err(e.into());
        }

        let pump = spawn_event_pump(receiver, Arc::clone(&self.shared.aggregator));
        let weak = Arc::downgrade(&self.shared);
        pending.complete(|inner| {
            inner.next_scan_id += 1;
            let id = inner.next_scan_id;
            inner.scan = Some(ScanSession {
                id,
                started_at: Utc::now(),
                timeout,
                pump: Some(pump),
                timer: timeout.map(|timeout| spawn_scan_timer(weak, id, timeout)),
            });
            inner.phase = Phase::Scanning;
            info!(scan_id = id, timeout_secs = timeout.map(|t| t.as_secs()), "Scan started");
        });
        Ok(())
    }

    /// Stop scanning and clear the results. A no-op unless scanning, or
    /// unless an abandoned transition may have left the radio scanning.
    ///
    /// # Errors
    ///
    /// Returns a busy [`BeaconError::InvalidTransition`] while another
    /// transition is in flight, or the adapter's failure.
    pub async fn stop_scan(&self) -> Result<()> {
        let mut pending = {
            let mut inner = self.shared.lock();
            let phase = inner.phase;
            match phase {
                Phase::Idle if inner.unsettled == Some(SessionState::Scanning) => {
                    self.shared.begin(&mut inner, Operation::StopScan)
                }
                Phase::Idle | Phase::Advertising => return Ok(()),
                Phase::Transitioning { .. } => {
                    return Err(BeaconError::InvalidTransition {
                        operation: Operation::StopScan,
                        state: phase,
                    })
                }
                Phase::Scanning => self.shared.begin(&mut inner, Operation::StopScan),
            }
        };

        let _lane = self.shared.radio_lane.lock().await;
        if pending.fallback == SessionState::Idle {
            self.settle_abandoned().await;
            pending.complete(|inner| inner.phase = Phase::Idle);
            return Ok(());
        }

        pending.issue();
        if let Err(e) = self.shared.radio.stop_scan().await {
            warn!(error = %e, "Radio refused to stop scanning");
            pending.confirmed(SessionState::Scanning);
            return Err(e.into());
        }
        pending.confirmed(SessionState::Idle);

        let session = self.shared.lock().scan.take();
        if let Some(session) = session {
            session.shutdown().await;
        }
        self.shared.aggregator.clear().await;

        info!("Scan stopped");
        pending.complete(|inner| inner.phase = Phase::Idle);
        Ok(())
    }

    /// Stop the scan `id` because its timeout elapsed.
    async fn expire_scan(&self, id: u64) {
        {
            let mut inner = self.shared.lock();
            if inner.phase != Phase::Scanning {
                return;
            }
            let Some(scan) = inner.scan.as_mut().filter(|scan| scan.id == id) else {
                return;
            };
            // Detach rather than abort: this task is the timer.
            drop(scan.timer.take());
        }

        info!(scan_id = id, "Scan timeout elapsed");
        if let Err(e) = self.stop_scan().await {
            warn!(
                scan_id = id,
                error = %e,
                retry_secs = SCAN_STOP_RETRY.as_secs(),
                "Failed to stop scan after timeout"
            );
            // A concurrent stop that succeeds aborts the new timer with the session.
            let weak = Arc::downgrade(&self.shared);
            let mut inner = self.shared.lock();
            if let Some(scan) = inner.scan.as_mut().filter(|scan| scan.id == id) {
                scan.timer = Some(spawn_scan_timer(weak, id, SCAN_STOP_RETRY));
            }
        }
    }

    fn begin_from_idle(
        &self,
        operation: Operation,
        permissions: &PermissionSet,
    ) -> Result<Pending<'_>> {
        let mut inner = self.shared.lock();
        if inner.phase != Phase::Idle {
            return Err(BeaconError::InvalidTransition {
                operation,
                state: inner.phase,
            });
        }
        ensure_permissions(operation, permissions)?;
        Ok(self.shared.begin(&mut inner, operation))
    }

    async fn ensure_radio_enabled(&self) -> Result<()> {
        if self.shared.radio.is_enabled().await? {
            Ok(())
        } else {
            Err(BeaconError::RadioUnavailable)
        }
    }

    /// Put the live payload back on air after a failed stop.
    async fn restore_advertisement(&self) {
        let Some(data) = self.advertisement_data() else {
            return;
        };
        match self.shared.radio.update_advertising(&data).await {
            Ok(()) => {
                let mut inner = self.shared.lock();
                let data_enabled = inner.advertising.payload().map(|p| p.data_enabled);
                inner.advertising.set_on_air(data_enabled);
            }
            Err(e) => warn!(error = %e, "Could not restore the advertisement after a failed stop"),
        }
    }

    /// Send the radio a stop for any role an abandoned transition left
    /// behind. Call with the radio lane held.
    async fn settle_abandoned(&self) {
        let Some(role) = self.shared.lock().unsettled else {
            return;
        };
        let outcome = match role {
            SessionState::Advertising => self.shared.radio.stop_advertising().await,
            SessionState::Scanning => self.shared.radio.stop_scan().await,
            SessionState::Idle => Ok(()),
        };
        match outcome {
            Ok(()) => debug!(%role, "Abandoned role settled"),
            // Most often the radio never took the role up.
            Err(e) => warn!(%role, error = %e, "Stop for an abandoned role failed"),
        }
        self.shared.lock().unsettled = None;
    }
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("radio", &self.shared.radio.kind())
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

fn ensure_permissions(operation: Operation, permissions: &PermissionSet) -> Result<()> {
    let missing = permissions.missing(operation.required_permissions());
    if missing.is_empty() {
        Ok(())
    } else {
        debug!(%operation, ?missing, "Permissions missing");
        Err(BeaconError::PermissionDenied { missing })
    }
}

fn spawn_event_pump(
    mut events: mpsc::Receiver<DiscoveryEvent>,
    aggregator: Arc<ScanAggregator>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            aggregator.record(event).await;
        }
        debug!("Discovery event stream closed");
    })
}

fn spawn_scan_timer(shared: Weak<Shared>, id: u64, timeout: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        if let Some(shared) = shared.upgrade() {
            SessionManager { shared }.expire_scan(id).await;
        }
    })
}
