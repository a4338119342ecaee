//! Live reload.
//!
//! Filesystem changes flow through the [`ChangeNotifier`] into the
//! [`ListenerRegistry`], which wakes every open [`Session`]. Each session
//! streams a `reload` marker to its browser, and a `ping` marker whenever it
//! has been idle for the keep-alive period.

mod debouncer;
mod handler;
mod notifier;
mod registry;
mod session;

/// Path of the streaming endpoint polled by the injected client script.
pub const LIVE_RELOAD_PATH: &str = "/_live_reload";

pub(crate) use handler::live_reload_handler;
pub use notifier::{ChangeEvent, ChangeNotifier};
pub use registry::{
    BroadcastSummary, Delivery, ListenerHandle, ListenerId, ListenerRegistry, Subscription,
};
pub use session::{Marker, Session, SessionState};
