//! Advertising endpoints.

use axum::extract::State;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use beacon_core::{AdvertiseRequest, AdvertisementData, AdvertisementPayload, SessionSnapshot};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::error::ApiResult;
use crate::state::SharedState;

/// Creates the advertising router, mounted at `/api/advertising`.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(get_advertising))
        .route("/start", post(start_advertising))
        .route("/stop", post(stop_advertising))
        .route("/data", put(update_advertising_data))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// The live advertisement, if any.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AdvertisingResponse {
    /// Whether an advertisement is on air.
    #[schema(example = true)]
    pub active: bool,

    /// What the caller asked to broadcast.
    pub payload: Option<AdvertisementPayload>,

    /// The advertisement exactly as handed to the radio.
    pub data: Option<AdvertisementData>,
}

/// New data state for the live advertisement.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({ "data_enabled": false }))]
pub struct UpdateDataRequest {
    /// Whether to broadcast the "on" frame.
    #[schema(example = false)]
    pub data_enabled: bool,
}

// ============================================================================
// Handlers
// ============================================================================

/// Get the live advertisement.
#[utoipa::path(
    get,
    path = "/api/advertising",
    tag = "advertising",
    operation_id = "getAdvertising",
    summary = "Get the live advertisement",
    responses(
        (status = 200, description = "Advertisement retrieved", body = AdvertisingResponse)
    )
)]
pub async fn get_advertising(State(state): State<SharedState>) -> Json<AdvertisingResponse> {
    let session = state.service().session();
    let payload = session.payload();
    Json(AdvertisingResponse {
        active: payload.is_some(),
        payload,
        data: session.advertisement_data(),
    })
}

/// Start advertising.
#[utoipa::path(
    post,
    path = "/api/advertising/start",
    tag = "advertising",
    operation_id = "startAdvertising",
    summary = "Start advertising",
    description = "Starts broadcasting from the idle state. Fields left out of \
        the body take the configured defaults; the body itself may be omitted.",
    request_body(content = AdvertiseRequest, description = "Payload overrides"),
    responses(
        (status = 200, description = "Advertising started", body = SessionSnapshot),
        (status = 400, description = "Payload cannot be broadcast", body = super::error::ErrorResponse),
        (status = 403, description = "Advertise permissions missing", body = super::error::ErrorResponse),
        (status = 409, description = "Not idle, or another operation is in flight", body = super::error::ErrorResponse),
        (status = 502, description = "Radio refused", body = super::error::ErrorResponse),
        (status = 503, description = "Radio is off", body = super::error::ErrorResponse)
    )
)]
pub async fn start_advertising(
    State(state): State<SharedState>,
    request: Option<Json<AdvertiseRequest>>,
) -> ApiResult<Json<SessionSnapshot>> {
    let request = request.map(|Json(request)| request).unwrap_or_default();
    state.service().start_advertising(request).await?;
    Ok(Json(state.service().session().snapshot()))
}

/// Stop advertising.
#[utoipa::path(
    post,
    path = "/api/advertising/stop",
    tag = "advertising",
    operation_id = "stopAdvertising",
    summary = "Stop advertising",
    description = "Idempotent: succeeds without effect unless advertising.",
    responses(
        (status = 200, description = "Advertising stopped", body = SessionSnapshot),
        (status = 409, description = "Another operation is in flight", body = super::error::ErrorResponse),
        (status = 502, description = "Radio refused", body = super::error::ErrorResponse)
    )
)]
pub async fn stop_advertising(State(state): State<SharedState>) -> ApiResult<Json<SessionSnapshot>> {
    state.service().stop_advertising().await?;
    Ok(Json(state.service().session().snapshot()))
}

/// Switch the advertised data on or off.
#[utoipa::path(
    put,
    path = "/api/advertising/data",
    tag = "advertising",
    operation_id = "updateAdvertisingData",
    summary = "Update advertised data",
    description = "Swaps the manufacturer frame of the live advertisement in \
        place, without restarting it.",
    request_body = UpdateDataRequest,
    responses(
        (status = 200, description = "Advertisement updated", body = AdvertisingResponse),
        (status = 409, description = "Not advertising", body = super::error::ErrorResponse),
        (status = 502, description = "Radio refused", body = super::error::ErrorResponse)
    )
)]
pub async fn update_advertising_data(
    State(state): State<SharedState>,
    Json(request): Json<UpdateDataRequest>,
) -> ApiResult<Json<AdvertisingResponse>> {
    state
        .service()
        .update_advertising_data(request.data_enabled)
        .await?;
    Ok(get_advertising(State(state)).await)
}
