//! Advertisement payloads and the controller that keeps them on air.
//!
//! The controller owns the payload of the live advertising session and
//! renders it into the [`AdvertisementData`] the radio broadcasts: the local
//! name, service UUIDs, and a manufacturer-specific frame whose bytes encode
//! whether data is switched on or off.
//!
//! Updates are applied in place on the radio, never as a stop/start cycle,
//! so peers keep seeing the same advertising set.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::{AdvertisingConfig, ConfigError};
use crate::error::{BeaconError, Result};

/// Company identifier placed in the manufacturer-specific data.
pub const DEFAULT_MANUFACTURER_ID: u16 = 0x5450;

/// Frame broadcast while data is switched on.
pub const DEFAULT_ON_FRAME: &str = "A39501FFA5AF00000101";

/// Frame broadcast while data is switched off.
pub const DEFAULT_OFF_FRAME: &str = "A39501FF6E7800000102";

/// Longest local name, in bytes, that fits an advertising data structure.
/// Whether the whole advertisement fits is checked on the rendered data.
pub const MAX_DEVICE_NAME_LEN: usize = 29;

/// Longest manufacturer frame accepted from configuration.
pub const MAX_FRAME_LEN: usize = 24;

const LEGACY_MAX_DATA_LEN: usize = 31;
const EXTENDED_MAX_DATA_LEN: usize = 251;

/// What the caller wants broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "device_name": "beacon",
    "data_enabled": true,
    "service_uuids": ["cb7d58a6-854e-4ffa-872e-251a1b02e164"]
}))]
pub struct AdvertisementPayload {
    /// Local name included in the advertisement.
    #[schema(example = "beacon")]
    pub device_name: String,

    /// Whether the "on" frame is broadcast.
    #[schema(example = true)]
    pub data_enabled: bool,

    /// Service UUIDs listed in the advertisement.
    pub service_uuids: BTreeSet<Uuid>,
}

impl AdvertisementPayload {
    /// A payload with data switched on and no service UUIDs.
    pub fn new(device_name: impl Into<String>) -> Self {
        Self {
            device_name: device_name.into(),
            data_enabled: true,
            service_uuids: BTreeSet::new(),
        }
    }

    /// Set the initial data state.
    #[must_use]
    pub fn with_data_enabled(mut self, data_enabled: bool) -> Self {
        self.data_enabled = data_enabled;
        self
    }

    /// Add a service UUID.
    #[must_use]
    pub fn with_service(mut self, uuid: Uuid) -> Self {
        self.service_uuids.insert(uuid);
        self
    }

    /// Check the payload can be broadcast.
    ///
    /// # Errors
    ///
    /// Returns [`BeaconError::InvalidPayload`] for an empty or oversized name.
    pub fn validate(&self) -> Result<()> {
        if self.device_name.trim().is_empty() {
            return Err(BeaconError::InvalidPayload(
                "device name cannot be empty".to_string(),
            ));
        }
        if self.device_name.len() > MAX_DEVICE_NAME_LEN {
            return Err(BeaconError::InvalidPayload(format!(
                "device name is {} bytes, at most {MAX_DEVICE_NAME_LEN} fit an advertisement",
                self.device_name.len()
            )));
        }
        Ok(())
    }
}

/// How often the advertisement is repeated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AdvertisingInterval {
    /// About every 100 ms; fastest discovery.
    #[default]
    Low,
    /// About every 250 ms.
    Medium,
    /// About every second; lowest power draw.
    High,
}

impl AdvertisingInterval {
    /// Nominal interval in milliseconds.
    #[must_use]
    pub const fn as_millis(self) -> u64 {
        match self {
            Self::Low => 100,
            Self::Medium => 250,
            Self::High => 1000,
        }
    }
}

/// Transmit power of the advertisement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TxPowerLevel {
    /// About -21 dBm.
    UltraLow,
    /// About -15 dBm.
    Low,
    /// About -7 dBm.
    #[default]
    Medium,
    /// About +1 dBm.
    High,
}

impl TxPowerLevel {
    /// Nominal transmit power in dBm.
    #[must_use]
    pub const fn as_dbm(self) -> i8 {
        match self {
            Self::UltraLow => -21,
            Self::Low => -15,
            Self::Medium => -7,
            Self::High => 1,
        }
    }
}

/// Radio parameters of the advertising set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct AdvertisingParameters {
    /// Whether peers may connect. Broadcast-only by default.
    pub connectable: bool,
    /// Legacy (31-byte) advertising instead of extended advertising.
    pub legacy_mode: bool,
    /// Repeat interval.
    pub interval: AdvertisingInterval,
    /// Transmit power.
    pub tx_power: TxPowerLevel,
}

impl Default for AdvertisingParameters {
    fn default() -> Self {
        Self {
            connectable: false,
            legacy_mode: false,
            interval: AdvertisingInterval::Low,
            tx_power: TxPowerLevel::Medium,
        }
    }
}

impl AdvertisingParameters {
    /// Largest advertising data the chosen mode carries.
    #[must_use]
    pub const fn max_data_len(&self) -> usize {
        if self.legacy_mode {
            LEGACY_MAX_DATA_LEN
        } else {
            EXTENDED_MAX_DATA_LEN
        }
    }
}

/// The advertisement exactly as handed to the radio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct AdvertisementData {
    /// Local name.
    pub local_name: String,
    /// 128-bit service UUIDs.
    pub service_uuids: BTreeSet<Uuid>,
    /// Company identifier of the manufacturer-specific data.
    pub manufacturer_id: u16,
    /// Manufacturer-specific bytes.
    #[serde(with = "hex::serde")]
    #[schema(value_type = String, example = "A39501FFA5AF00000101")]
    pub manufacturer_data: Vec<u8>,
    /// Radio parameters.
    pub parameters: AdvertisingParameters,
}

impl AdvertisementData {
    /// Size of the encoded AD structures: flags, local name, manufacturer
    /// data and the complete list of 128-bit service UUIDs.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        let flags = 3;
        let name = 2 + self.local_name.len();
        let manufacturer = 2 + 2 + self.manufacturer_data.len();
        let services = if self.service_uuids.is_empty() {
            0
        } else {
            2 + 16 * self.service_uuids.len()
        };
        flags + name + manufacturer + services
    }

    /// Check the encoded advertisement fits the advertising mode.
    ///
    /// # Errors
    ///
    /// Returns [`BeaconError::InvalidPayload`] when it is too large.
    pub fn ensure_fits(&self) -> Result<()> {
        let (size, max) = (self.encoded_len(), self.parameters.max_data_len());
        if size > max {
            let mode = if self.parameters.legacy_mode { "legacy" } else { "extended" };
            return Err(BeaconError::InvalidPayload(format!(
                "advertisement needs {size} bytes, {mode} advertising carries at most {max}"
            )));
        }
        Ok(())
    }
}

/// Manufacturer frames for the on and off states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameTemplate {
    manufacturer_id: u16,
    on_frame: Vec<u8>,
    off_frame: Vec<u8>,
}

impl FrameTemplate {
    /// Build from raw bytes.
    #[must_use]
    pub const fn new(manufacturer_id: u16, on_frame: Vec<u8>, off_frame: Vec<u8>) -> Self {
        Self {
            manufacturer_id,
            on_frame,
            off_frame,
        }
    }

    /// Decode the hex frames of the `[advertising]` section.
    ///
    /// # Errors
    ///
    /// Returns a validation error when a frame is not valid hex.
    pub fn from_config(config: &AdvertisingConfig) -> std::result::Result<Self, ConfigError> {
        let decode = |field: &str, value: &str| {
            hex::decode(value).map_err(|e| ConfigError::ValidationError {
                field: field.to_string(),
                message: format!("not a valid hex frame: {e}"),
            })
        };
        Ok(Self::new(
            config.manufacturer_id,
            decode("advertising.on_frame", &config.on_frame)?,
            decode("advertising.off_frame", &config.off_frame)?,
        ))
    }

    /// Company identifier.
    #[must_use]
    pub const fn manufacturer_id(&self) -> u16 {
        self.manufacturer_id
    }

    /// The frame for a data state.
    #[must_use]
    pub fn frame(&self, data_enabled: bool) -> &[u8] {
        if data_enabled {
            &self.on_frame
        } else {
            &self.off_frame
        }
    }
}

impl Default for FrameTemplate {
    fn default() -> Self {
        // The default frames are compile-time hex literals.
        Self::new(
            DEFAULT_MANUFACTURER_ID,
            hex::decode(DEFAULT_ON_FRAME).unwrap_or_default(),
            hex::decode(DEFAULT_OFF_FRAME).unwrap_or_default(),
        )
    }
}

struct ActiveAdvertisement {
    payload: AdvertisementPayload,
    epoch: u64,
    /// The data state the radio is known to broadcast. `None` while an
    /// update is unconfirmed.
    on_air: Option<bool>,
}

/// Owns the payload of the live advertising session.
///
/// Every activation gets a fresh epoch. An update planned against one
/// epoch is refused once that session has ended, even if a new session
/// has started since.
pub struct AdvertisementController {
    template: FrameTemplate,
    parameters: AdvertisingParameters,
    send_off_frame_on_stop: bool,
    active: Option<ActiveAdvertisement>,
    epoch: u64,
}

impl AdvertisementController {
    /// Create a controller with no active advertisement.
    #[must_use]
    pub const fn new(
        template: FrameTemplate,
        parameters: AdvertisingParameters,
        send_off_frame_on_stop: bool,
    ) -> Self {
        Self {
            template,
            parameters,
            send_off_frame_on_stop,
            active: None,
            epoch: 0,
        }
    }

    /// Build from the `[advertising]` section.
    ///
    /// # Errors
    ///
    /// Returns a validation error when a frame is not valid hex.
    pub fn from_config(config: &AdvertisingConfig) -> std::result::Result<Self, ConfigError> {
        Ok(Self::new(
            FrameTemplate::from_config(config)?,
            config.parameters,
            config.send_off_frame_on_stop,
        ))
    }

    /// Render a payload into radio data.
    #[must_use]
    pub fn render(&self, payload: &AdvertisementPayload) -> AdvertisementData {
        AdvertisementData {
            local_name: payload.device_name.clone(),
            service_uuids: payload.service_uuids.clone(),
            manufacturer_id: self.template.manufacturer_id(),
            manufacturer_data: self.template.frame(payload.data_enabled).to_vec(),
            parameters: self.parameters,
        }
    }

    /// The payload on air, if any.
    #[must_use]
    pub fn payload(&self) -> Option<&AdvertisementPayload> {
        self.active.as_ref().map(|active| &active.payload)
    }

    /// Epoch of the live session, if any.
    #[must_use]
    pub fn epoch(&self) -> Option<u64> {
        self.active.as_ref().map(|active| active.epoch)
    }

    /// Take ownership of a payload that just went on air.
    pub(crate) fn activate(&mut self, payload: AdvertisementPayload) -> u64 {
        self.epoch += 1;
        self.active = Some(ActiveAdvertisement {
            on_air: Some(payload.data_enabled),
            payload,
            epoch: self.epoch,
        });
        self.epoch
    }

    /// Drop the payload once advertising has stopped.
    pub(crate) fn clear(&mut self) -> Option<AdvertisementPayload> {
        self.active.take().map(|active| active.payload)
    }

    /// Work out what an update to `data_enabled` must send to the radio.
    ///
    /// Returns `Ok(None)` when the radio is known to broadcast that value
    /// already. Otherwise the on-air state is marked unknown until
    /// [`commit_update`](Self::commit_update) confirms it.
    pub(crate) fn plan_update(
        &mut self,
        epoch: u64,
        data_enabled: bool,
    ) -> Result<Option<AdvertisementData>> {
        let active = self
            .active
            .as_mut()
            .filter(|active| active.epoch == epoch)
            .ok_or(BeaconError::NotAdvertising)?;
        if active.on_air == Some(data_enabled) {
            return Ok(None);
        }
        active.on_air = None;
        let next = AdvertisementPayload {
            data_enabled,
            ..active.payload.clone()
        };
        Ok(Some(self.render(&next)))
    }

    /// Record an update the radio has accepted.
    pub(crate) fn commit_update(&mut self, epoch: u64, data_enabled: bool) {
        if let Some(active) = self.active.as_mut().filter(|active| active.epoch == epoch) {
            active.payload.data_enabled = data_enabled;
            active.on_air = Some(data_enabled);
        }
    }

    /// Record what the radio broadcasts after an in-place push outside the
    /// update path. `None` means it is unknown.
    pub(crate) fn set_on_air(&mut self, on_air: Option<bool>) {
        if let Some(active) = self.active.as_mut() {
            active.on_air = on_air;
        }
    }

    /// Whether the radio is known to broadcast the payload's data state.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.active
            .as_ref()
            .map_or(true, |active| active.on_air == Some(active.payload.data_enabled))
    }

    /// The off frame to push before stopping, when configured and the radio
    /// may be broadcasting the on frame.
    #[must_use]
    pub fn off_frame_for_stop(&self) -> Option<AdvertisementData> {
        let active = self.active.as_ref()?;
        if !self.send_off_frame_on_stop || active.on_air == Some(false) {
            return None;
        }
        Some(self.render(&AdvertisementPayload {
            data_enabled: false,
            ..active.payload.clone()
        }))
    }
}

impl Default for AdvertisementController {
    fn default() -> Self {
        Self::new(
            FrameTemplate::default(),
            AdvertisingParameters::default(),
            true,
        )
    }
}
