//! HTTP handler for the live reload stream.
//!
//! Holds the request open and streams marker chunks until the client goes
//! away or the server shuts down.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};

use super::session::Session;
use crate::state::AppState;

/// Handle `GET /_live_reload`.
pub(crate) async fn live_reload_handler(State(state): State<Arc<AppState>>) -> Response {
    let Some(ref live_reload) = state.live_reload else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let session = Session::start(
        live_reload.registry(),
        state.shutdown.clone(),
        state.keep_alive,
    );
    if let Some(id) = session.listener_id() {
        tracing::debug!(listener = %id, "Live reload session opened");
    }

    (
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(session.into_stream()),
    )
        .into_response()
}
