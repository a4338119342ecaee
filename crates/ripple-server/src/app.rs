//! Router construction.
//!
//! Builds the axum router with all routes and middleware.

use std::path::Path;
use std::sync::Arc;

use axum::Router;
use axum::middleware;
use axum::routing::get;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::inject;
use crate::live_reload::{self, LIVE_RELOAD_PATH};
use crate::middleware::headers;
use crate::state::AppState;
use crate::static_files;

/// Create the application router.
///
/// # Arguments
///
/// * `state` - Shared application state
/// * `root_dir` - Directory of static files to serve
pub(crate) fn create_router(state: Arc<AppState>, root_dir: &Path) -> Router {
    let mut router = Router::new();

    // Long-lived stream for live reload
    if state.live_reload_enabled() {
        router = router.route(LIVE_RELOAD_PATH, get(live_reload::live_reload_handler));
    }

    // Static files
    router = router.merge(static_files::static_router(root_dir));

    // Inject the client script into served HTML
    if state.live_reload_enabled() {
        router = router.layer(middleware::from_fn(inject::inject_live_reload));
    }

    router
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(headers::content_type_options_layer())
                .layer(headers::frame_options_layer())
                .layer(headers::cache_control_layer()),
        )
        .with_state(state)
}
