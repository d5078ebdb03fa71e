//! The radio adapter seam.
//!
//! The session manager never talks to a Bluetooth stack directly. It drives
//! an implementation of [`RadioAdapter`], which wraps whatever the platform
//! offers: raw start/stop advertising, in-place advertisement updates,
//! start/stop scanning, and a discovery event feed.
//!
//! Platform bindings are out of scope for this crate. [`SimulatedRadio`]
//! is the in-memory implementation used by the server and the tests.

mod simulated;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::advertising::AdvertisementData;
use crate::types::{DiscoveryEvent, Operation};

pub use simulated::{RadioCall, SimulatedRadio};

/// Errors reported by a radio adapter.
#[derive(Debug, Error)]
pub enum RadioError {
    /// The adapter exists but is powered off.
    #[error("Bluetooth adapter is powered off")]
    PoweredOff,

    /// The advertisement does not fit the adapter's advertising data limit.
    #[error("Advertising data too large: {size} bytes (max: {max})")]
    DataTooLarge {
        /// Encoded size of the rejected advertisement.
        size: usize,
        /// Largest size the adapter accepts.
        max: usize,
    },

    /// The adapter tried and failed.
    #[error("Adapter rejected {operation}: {message}")]
    Rejected {
        /// The failed operation.
        operation: Operation,
        /// Adapter-supplied detail.
        message: String,
    },
}

/// Result type for adapter calls.
pub type RadioResult<T> = std::result::Result<T, RadioError>;

/// Primitive operations of a platform Bluetooth stack.
///
/// Implementations may block on hardware for a while; the session manager
/// serializes calls so at most one is in flight at a time.
#[async_trait]
pub trait RadioAdapter: Send + Sync {
    /// Short name of the implementation, for status reporting.
    fn kind(&self) -> &'static str;

    /// Whether the radio is powered and usable.
    async fn is_enabled(&self) -> RadioResult<bool>;

    /// Ask the platform to power the radio on. Returns the resulting power state.
    async fn request_enable(&self) -> RadioResult<bool>;

    /// Begin broadcasting `data`.
    async fn start_advertising(&self, data: &AdvertisementData) -> RadioResult<()>;

    /// Replace the payload of the live advertisement without restarting it.
    async fn update_advertising(&self, data: &AdvertisementData) -> RadioResult<()>;

    /// Stop broadcasting.
    async fn stop_advertising(&self) -> RadioResult<()>;

    /// Begin scanning; sightings are pushed into `events` until [`stop_scan`].
    ///
    /// [`stop_scan`]: RadioAdapter::stop_scan
    async fn start_scan(&self, events: mpsc::Sender<DiscoveryEvent>) -> RadioResult<()>;

    /// Stop scanning and release the event sender.
    async fn stop_scan(&self) -> RadioResult<()>;
}
