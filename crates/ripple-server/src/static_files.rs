//! Static file serving.
//!
//! Serves the site's root directory, with `index.html` for directory paths.

use std::path::Path;
use std::sync::Arc;

use axum::Router;
use tower_http::services::ServeDir;

use crate::state::AppState;

/// Create router that serves `root_dir` for every unmatched path.
pub(crate) fn static_router(root_dir: &Path) -> Router<Arc<AppState>> {
    let serve_dir = ServeDir::new(root_dir).append_index_html_on_directories(true);
    Router::new().fallback_service(serve_dir)
}
