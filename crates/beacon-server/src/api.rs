//! HTTP API routes and handlers.
//!
//! This module contains all HTTP endpoint implementations organized by domain:
//! - `advertising` - Start, stop and update the advertisement
//! - `bluetooth` - Radio power state and permission results
//! - `health` - Service health checks
//! - `scan` - Start and stop scans, list discovered devices
//! - `session` - Session snapshot and change stream
//! - `system` - Aggregate status
//! - `error` - API error types
//! - `openapi` - OpenAPI specification generation

use axum::routing::get;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::state::SharedState;

pub mod advertising;
pub mod bluetooth;
pub mod error;
pub mod health;
pub mod openapi;
pub mod scan;
pub mod session;
pub mod system;

// Re-export commonly used types
pub use error::{ApiError, ApiResult, ErrorResponse};

// Re-export OpenAPI utilities for the gen-openapi binary
pub use openapi::{get_openapi_json, ApiDoc};

/// Creates the combined API router with all endpoints.
///
/// # Route Structure
///
/// ```text
/// /health                  - Health check
/// /swagger-ui              - Interactive API documentation
/// /api
/// ├── /bluetooth           - Radio power state, enable request
/// ├── /permissions         - Permission results reported by the host
/// ├── /advertising         - Advertisement status, start, stop, data
/// ├── /scan                - Scan start, stop, discovered devices
/// ├── /session             - Session snapshot and event stream
/// ├── /system              - System status
/// └── /openapi.json        - OpenAPI specification
/// ```
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .nest("/health", health::router())
        .nest(
            "/api",
            Router::new()
                .nest("/bluetooth", bluetooth::router())
                .nest("/permissions", bluetooth::permissions_router())
                .nest("/advertising", advertising::router())
                .nest("/scan", scan::router())
                .nest("/session", session::router())
                .nest("/system", system::router())
                .route("/openapi.json", get(openapi::get_openapi_spec)),
        )
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
