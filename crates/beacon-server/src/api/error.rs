//! HTTP error mapping.
//!
//! Every [`BeaconError`] becomes an [`ApiError`] with the status the core
//! assigns it. Conflicts carry `details.busy`, so clients can tell a retry
//! from a wrong state. Permission failures list `details.missing`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use beacon_core::BeaconError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type.
///
/// One variant per status the API answers with. Most are built from a
/// [`BeaconError`]; handlers raise `BadRequest` for their own validation.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// 400 Bad Request - Invalid input from client.
    #[error("Bad Request: {message}")]
    BadRequest {
        /// Lowercase code such as `not_advertising`.
        error_code: String,
        /// Display text of the underlying error.
        message: String,
    },

    /// 403 Forbidden - Required runtime permissions are missing.
    #[error("Forbidden: {message}")]
    Forbidden {
        error_code: String,
        message: String,
        /// Permissions that were not granted.
        missing: Vec<String>,
    },

    /// 409 Conflict - Operation is not legal in the current session state.
    #[error("Conflict: {message}")]
    Conflict {
        error_code: String,
        message: String,
        /// Whether another operation was in flight; retrying later may succeed.
        busy: bool,
    },

    /// 422 Unprocessable Entity - Configuration is unusable.
    #[error("Unprocessable Entity: {message}")]
    Unprocessable {
        error_code: String,
        message: String,
    },

    /// 500 Internal Server Error - Unexpected server-side error.
    #[error("Internal Error: {message}")]
    InternalError {
        error_code: String,
        message: String,
        /// Extra context for the log.
        details: Option<String>,
    },

    /// 502 Bad Gateway - The radio accepted the call but failed it.
    #[error("Bad Gateway: {message}")]
    BadGateway {
        error_code: String,
        message: String,
    },

    /// 503 Service Unavailable - The Bluetooth radio is off or absent.
    #[error("Service Unavailable: {message}")]
    ServiceUnavailable {
        error_code: String,
        message: String,
    },
}

/// Standard JSON error response body.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "invalid_transition",
    "message": "Cannot start scan while advertising",
    "details": {"busy": false}
}))]
pub struct ErrorResponse {
    /// Machine-readable error code (e.g., "not_advertising").
    #[schema(example = "invalid_transition")]
    pub error: String,

    /// Human-readable error message.
    #[schema(example = "Cannot start scan while advertising")]
    pub message: String,

    /// Optional additional details for debugging.
    #[schema(nullable)]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// The HTTP status this error is answered with.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::Unprocessable { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::InternalError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BadGateway { .. } => StatusCode::BAD_GATEWAY,
            Self::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn into_body(self) -> ErrorResponse {
        let (error, message, details) = match self {
            Self::Forbidden {
                error_code,
                message,
                missing,
            } => (error_code, message, Some(serde_json::json!({ "missing": missing }))),
            Self::Conflict {
                error_code,
                message,
                busy,
            } => (error_code, message, Some(serde_json::json!({ "busy": busy }))),
            Self::InternalError {
                error_code,
                message,
                details,
            } => (error_code, message, details.map(serde_json::Value::String)),
            Self::BadRequest {
                error_code,
                message,
            }
            | Self::Unprocessable {
                error_code,
                message,
            }
            | Self::BadGateway {
                error_code,
                message,
            }
            | Self::ServiceUnavailable {
                error_code,
                message,
            } => (error_code, message, None),
        };
        ErrorResponse {
            error,
            message,
            details,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error = %self, "Request failed");
        }
        (status, Json(self.into_body())).into_response()
    }
}

/// Convert from beacon_core errors.
impl From<BeaconError> for ApiError {
    fn from(err: BeaconError) -> Self {
        let error_code = err.error_code().to_ascii_lowercase();
        let message = err.to_string();

        match err {
            BeaconError::InvalidPayload(_) => Self::BadRequest {
                error_code,
                message,
            },
            BeaconError::PermissionDenied { ref missing } => Self::Forbidden {
                missing: missing.iter().map(ToString::to_string).collect(),
                error_code,
                message,
            },
            BeaconError::InvalidTransition { .. } | BeaconError::NotAdvertising => {
                Self::Conflict {
                    busy: err.is_busy(),
                    error_code,
                    message,
                }
            }
            BeaconError::ConfigParseError(_) | BeaconError::ConfigValidationError(_) => {
                Self::Unprocessable {
                    error_code,
                    message,
                }
            }
            BeaconError::AdapterFailure { .. } => Self::BadGateway {
                error_code,
                message,
            },
            BeaconError::RadioUnavailable => Self::ServiceUnavailable {
                error_code,
                message,
            },
            BeaconError::IoError(_) => Self::InternalError {
                error_code,
                message,
                details: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_core::{Operation, Permission, Phase, SessionState};

    fn status_of(err: BeaconError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn test_invalid_payload_is_bad_request() {
        let err = ApiError::from(BeaconError::InvalidPayload("device name is empty".into()));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(err.to_string().contains("device name is empty"));
    }

    #[test]
    fn test_status_matches_core_mapping() {
        let errors = [
            BeaconError::InvalidPayload("empty".into()),
            BeaconError::PermissionDenied {
                missing: vec![Permission::BluetoothScan],
            },
            BeaconError::NotAdvertising,
            BeaconError::RadioUnavailable,
            BeaconError::AdapterFailure {
                operation: Operation::StartAdvertising,
                message: "status 1".into(),
            },
            BeaconError::ConfigValidationError("bad".into()),
        ];
        for err in errors {
            let expected = err.http_status_code();
            assert_eq!(status_of(err).as_u16(), expected);
        }
    }

    #[test]
    fn test_busy_conflict_is_flagged() {
        let err = ApiError::from(BeaconError::InvalidTransition {
            operation: Operation::StopScan,
            state: Phase::Transitioning {
                from: SessionState::Scanning,
                operation: Operation::StopScan,
            },
        });
        assert!(matches!(err, ApiError::Conflict { busy: true, ref error_code, .. } if error_code == "invalid_transition"));
    }

    #[test]
    fn test_forbidden_lists_missing_permissions() {
        let err = ApiError::from(BeaconError::PermissionDenied {
            missing: vec![Permission::BluetoothAdvertise],
        });
        match err {
            ApiError::Forbidden { missing, .. } => assert_eq!(missing, ["BLUETOOTH_ADVERTISE"]),
            other => panic!("expected Forbidden, got {other:?}"),
        }
    }

    #[test]
    fn test_body_omits_details_for_plain_errors() {
        let body = ApiError::from(BeaconError::RadioUnavailable).into_body();
        assert_eq!(body.error, "radio_unavailable");
        let json = serde_json::to_value(&body).unwrap();
        assert!(json["details"].is_null());
    }
}
