//! # beacon-core
//!
//! Core session logic for beacon, a Bluetooth Low Energy peripheral/central
//! session manager.
//!
//! This crate provides:
//! - A session state machine that owns the radio role (idle, advertising or scanning)
//! - Live, in-place updates of the advertised payload
//! - Deduplicated, freshness-bounded aggregation of scan results
//! - A command facade for UI callers, with permission gating
//! - Layered configuration loading and validation
//!
//! ## Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`radio`] - The radio adapter trait and the simulated radio
//! - [`session`] - The session state machine and its observation channel
//! - [`advertising`] - Advertisement payloads, frames and the live controller
//! - [`scan`] - Discovery event aggregation
//! - [`facade`] - The command surface UI callers talk to
//! - [`config`] - Application configuration loading and validation
//! - [`error`] - Unified error types for the crate
//! - [`types`] - Shared types and OpenAPI schemas

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod advertising;
pub mod config;
pub mod error;
pub mod facade;
pub mod radio;
pub mod scan;
pub mod session;
pub mod types;

// Re-export primary types for convenience
pub use advertising::{
    AdvertisementController, AdvertisementData, AdvertisementPayload, AdvertisingInterval,
    AdvertisingParameters, FrameTemplate, TxPowerLevel,
};
pub use config::{
    is_valid_mac_address, AdvertisingConfig, Config, ConfigError, ConfigResult, PlatformConfig,
    ScanConfig, ServerConfig, SimulatedPeer, SimulationConfig,
};
pub use error::{BeaconError, Result};
pub use facade::{AdvertiseRequest, BeaconService};
pub use radio::{RadioAdapter, RadioCall, RadioError, RadioResult, SimulatedRadio};
pub use scan::{RecordOutcome, ScanAggregator};
pub use session::{Phase, ScanInfo, SessionManager, SessionSnapshot};
pub use types::{
    DiscoveredDevice, DiscoveryEvent, Operation, Permission, PermissionSet, PermissionStatus,
    ScannedDevice, SessionState,
};
