//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Instant;

use beacon_core::{BeaconService, Config, RadioAdapter, SimulatedRadio};

/// Shared application state handle.
pub type SharedState = AppState;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    service: BeaconService,
    config: Config,
    started_at: Instant,
}

impl AppState {
    /// Create application state around an already-built service.
    #[must_use]
    pub fn new(service: BeaconService, config: Config) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                service,
                config,
                started_at: Instant::now(),
            }),
        }
    }

    /// Create application state driving `radio`.
    ///
    /// # Errors
    ///
    /// Returns an error if the advertising configuration cannot be used.
    pub fn with_radio(radio: Arc<dyn RadioAdapter>, config: Config) -> anyhow::Result<Self> {
        let service = BeaconService::new(radio, &config)?;
        Ok(Self::new(service, config))
    }

    /// Create application state with the simulated radio described by `[simulation]`.
    ///
    /// # Errors
    ///
    /// Returns an error if the advertising configuration cannot be used.
    pub fn simulated(config: Config) -> anyhow::Result<Self> {
        let radio = Arc::new(SimulatedRadio::from_config(&config.simulation));
        Self::with_radio(radio, config)
    }

    /// The command facade.
    #[must_use]
    pub fn service(&self) -> &BeaconService {
        &self.inner.service
    }

    /// The configuration the server was started with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Seconds since the state was created.
    #[must_use]
    pub fn uptime_secs(&self) -> u64 {
        self.inner.started_at.elapsed().as_secs()
    }
}
