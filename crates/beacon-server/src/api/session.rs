//! Session observation endpoints.
//!
//! `GET /api/session` returns the current snapshot. `GET /api/session/events`
//! streams a new snapshot as a server-sent event on every change.

use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::{Json, Router};
use beacon_core::SessionSnapshot;
use futures::stream::{self, Stream};
use tracing::debug;

use crate::state::SharedState;

/// Creates the session router, mounted at `/api/session`.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(get_session))
        .route("/events", get(session_events))
}

/// Get the current session snapshot.
#[utoipa::path(
    get,
    path = "/api/session",
    tag = "session",
    operation_id = "getSession",
    summary = "Get session state",
    responses(
        (status = 200, description = "Current snapshot", body = SessionSnapshot)
    )
)]
pub async fn get_session(State(state): State<SharedState>) -> Json<SessionSnapshot> {
    Json(state.service().session().snapshot())
}

/// Stream session snapshots.
#[utoipa::path(
    get,
    path = "/api/session/events",
    tag = "session",
    operation_id = "streamSession",
    summary = "Stream session changes",
    description = "Server-sent events. The current snapshot is sent first, then \
        one `session` event per change. Intermediate snapshots may be skipped \
        when changes arrive faster than the client reads.",
    responses(
        (status = 200, description = "Event stream of SessionSnapshot JSON", body = String, content_type = "text/event-stream")
    )
)]
pub async fn session_events(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut updates = state.service().session().subscribe();
    updates.mark_changed();

    let events = stream::unfold(updates, |mut updates| async move {
        if updates.changed().await.is_err() {
            debug!("Session closed, ending event stream");
            return None;
        }
        let snapshot = updates.borrow_and_update().clone();
        let event = Event::default()
            .event("session")
            .json_data(&snapshot)
            .unwrap_or_else(|_| Event::default().event("session").comment("unserializable snapshot"));
        Some((Ok(event), updates))
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}
