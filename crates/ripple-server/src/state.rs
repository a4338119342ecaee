//! Application state.
//!
//! Shared state for all request handlers.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::live_reload::ChangeNotifier;

/// Application state shared across all handlers.
pub(crate) struct AppState {
    /// Change notifier owning the listener registry (if live reload is enabled).
    pub(crate) live_reload: Option<ChangeNotifier>,
    /// Idle period after which a session writes a keep-alive marker.
    pub(crate) keep_alive: Duration,
    /// Cancelled when the server begins shutting down.
    pub(crate) shutdown: CancellationToken,
}

impl AppState {
    /// Check if live reload is enabled.
    #[must_use]
    pub(crate) fn live_reload_enabled(&self) -> bool {
        self.live_reload.is_some()
    }
}
