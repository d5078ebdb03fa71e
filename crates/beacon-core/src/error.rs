//! Unified error types for the beacon core library.
//!
//! [`BeaconError`] covers every failure a caller of the session manager can
//! observe. Module-specific errors ([`ConfigError`](crate::config::ConfigError),
//! [`RadioError`](crate::radio::RadioError)) convert into it.
//!
//! # Design Principles
//!
//! - **Specific variants**: Each error variant captures exactly one failure mode
//! - **Local detection**: Illegal transitions are reported without touching the radio
//! - **HTTP-ready**: Error types include HTTP status codes and error codes
//!
//! # Example
//!
//! ```rust
//! use beacon_core::error::{BeaconError, Result};
//!
//! fn require_advertising(advertising: bool) -> Result<()> {
//!     if !advertising {
//!         return Err(BeaconError::NotAdvertising);
//!     }
//!     Ok(())
//! }
//! # assert!(require_advertising(false).is_err());
//! ```

use thiserror::Error;

use crate::session::Phase;
use crate::types::{Operation, Permission};

/// The unified error type for all beacon operations.
#[derive(Debug, Error)]
pub enum BeaconError {
    // =========================================================================
    // SESSION ERRORS
    // =========================================================================
    /// The operation is not legal in the current session phase.
    #[error("Cannot {operation} while {state}")]
    InvalidTransition {
        /// What the caller tried to do.
        operation: Operation,
        /// The phase the session was in.
        state: Phase,
    },

    /// A payload update was attempted outside an active advertising session.
    #[error("Not advertising. Start advertising before updating its data.")]
    NotAdvertising,

    /// Required runtime permissions have not been granted.
    #[error("Permission denied: {} not granted", format_permissions(.missing))]
    PermissionDenied {
        /// Permissions that were not granted, in request order.
        missing: Vec<Permission>,
    },

    // =========================================================================
    // RADIO ERRORS
    // =========================================================================
    /// The radio is powered off or absent.
    #[error("Bluetooth radio is unavailable. Enable Bluetooth and try again.")]
    RadioUnavailable,

    /// The radio accepted the call but reported failure.
    #[error("Radio failed to {operation}: {message}")]
    AdapterFailure {
        /// The operation the radio failed.
        operation: Operation,
        /// Adapter-supplied detail.
        message: String,
    },

    // =========================================================================
    // INPUT ERRORS
    // =========================================================================
    /// The advertisement payload cannot be broadcast as given.
    #[error("Invalid advertisement payload: {0}")]
    InvalidPayload(String),

    // =========================================================================
    // CONFIGURATION ERRORS
    // =========================================================================
    /// The configuration sources could not be read or parsed.
    #[error("Failed to parse configuration: {0}")]
    ConfigParseError(String),

    /// The configuration was parsed but contains invalid values.
    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),

    /// A low-level I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A specialized [`Result`] type for beacon operations.
pub type Result<T> = std::result::Result<T, BeaconError>;

fn format_permissions(permissions: &[Permission]) -> String {
    permissions
        .iter()
        .map(|permission| permission.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

impl BeaconError {
    /// Returns `true` if the error comes from the session state machine.
    #[inline]
    #[must_use]
    pub const fn is_session_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidTransition { .. } | Self::NotAdvertising | Self::PermissionDenied { .. }
        )
    }

    /// Returns `true` if the error comes from the radio.
    #[inline]
    #[must_use]
    pub const fn is_radio_error(&self) -> bool {
        matches!(self, Self::RadioUnavailable | Self::AdapterFailure { .. })
    }

    /// Returns `true` if the error is related to configuration.
    #[inline]
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigParseError(_) | Self::ConfigValidationError(_)
        )
    }

    /// Returns `true` if another operation was mid-flight when this one arrived.
    ///
    /// Such rejections clear up once the other operation completes.
    #[inline]
    #[must_use]
    pub const fn is_busy(&self) -> bool {
        matches!(
            self,
            Self::InvalidTransition {
                state: Phase::Transitioning { .. },
                ..
            }
        )
    }

    /// Returns an HTTP-appropriate status code for this error.
    #[inline]
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::InvalidPayload(_) => 400,
            Self::PermissionDenied { .. } => 403,
            Self::InvalidTransition { .. } | Self::NotAdvertising => 409,
            Self::ConfigParseError(_) | Self::ConfigValidationError(_) => 422,
            Self::IoError(_) => 500,
            Self::AdapterFailure { .. } => 502,
            Self::RadioUnavailable => 503,
        }
    }

    /// Returns a machine-readable error code for API responses.
    #[inline]
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::NotAdvertising => "NOT_ADVERTISING",
            Self::PermissionDenied { .. } => "PERMISSION_DENIED",
            Self::RadioUnavailable => "RADIO_UNAVAILABLE",
            Self::AdapterFailure { .. } => "ADAPTER_FAILURE",
            Self::InvalidPayload(_) => "INVALID_PAYLOAD",
            Self::ConfigParseError(_) => "CONFIG_PARSE_ERROR",
            Self::ConfigValidationError(_) => "CONFIG_VALIDATION_ERROR",
            Self::IoError(_) => "IO_ERROR",
        }
    }
}

// =============================================================================
// CONVERSIONS FROM MODULE-SPECIFIC ERRORS
// =============================================================================

impl From<crate::config::ConfigError> for BeaconError {
    fn from(err: crate::config::ConfigError) -> Self {
        use crate::config::ConfigError;
        match err {
            ConfigError::Load(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::ValidationError { field, message } => {
                Self::ConfigValidationError(format!("{field}: {message}"))
            }
            ConfigError::MultipleValidationErrors(errors) => {
                let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
                Self::ConfigValidationError(messages.join("; "))
            }
        }
    }
}

impl From<crate::radio::RadioError> for BeaconError {
    fn from(err: crate::radio::RadioError) -> Self {
        use crate::radio::RadioError;
        match err {
            RadioError::PoweredOff => Self::RadioUnavailable,
            RadioError::DataTooLarge { size, max } => Self::InvalidPayload(format!(
                "advertisement data is {size} bytes, adapter accepts at most {max}"
            )),
            RadioError::Rejected { operation, message } => {
                Self::AdapterFailure { operation, message }
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
