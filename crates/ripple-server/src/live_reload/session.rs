//! Streaming session for one live reload connection.
//!
//! A session registers with the [`ListenerRegistry`] and then alternates
//! between waiting and writing a marker until it closes:
//!
//! ```text
//! Registered ──► Waiting ⇄ Writing
//!                   │
//!                   └──► Closed
//! ```
//!
//! The registration is held by a [`Subscription`], so every way out of the
//! session (shutdown, removal from the registry, or the response body being
//! dropped after the client disconnects) releases it exactly once.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use futures::Stream;
use tokio_util::sync::CancellationToken;

use super::registry::{ListenerId, ListenerRegistry, Subscription};

/// Lifecycle state of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Registered, no wait started yet.
    Registered,
    /// Waiting for a signal, the keep-alive timer, or shutdown.
    Waiting,
    /// A marker was produced and is being written.
    Writing,
    /// Terminal. The registration has been released.
    Closed,
}

/// Chunk written to the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Marker {
    /// Watched files changed; the page should reload.
    Reload,
    /// Nothing happened during the last keep-alive period.
    KeepAlive,
}

impl Marker {
    /// Wire bytes for this marker.
    pub const fn as_bytes(self) -> &'static [u8] {
        match self {
            Self::Reload => b"reload\n",
            Self::KeepAlive => b"ping\n",
        }
    }
}

/// Server side of one long-lived live reload response.
pub struct Session {
    subscription: Option<Subscription>,
    state: SessionState,
    shutdown: CancellationToken,
    keep_alive: Duration,
}

impl Session {
    /// Register a new session.
    pub fn start(
        registry: &Arc<ListenerRegistry>,
        shutdown: CancellationToken,
        keep_alive: Duration,
    ) -> Self {
        Self {
            subscription: Some(registry.subscribe()),
            state: SessionState::Registered,
            shutdown,
            keep_alive,
        }
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Listener id, or `None` once closed.
    pub fn listener_id(&self) -> Option<ListenerId> {
        self.subscription.as_ref().map(Subscription::id)
    }

    /// Wait for the next marker to write.
    ///
    /// Returns `None` when the session closes: on shutdown, or when the
    /// listener was removed from the registry. Shutdown takes priority over a
    /// pending signal, so a closing server never writes another chunk.
    pub async fn next_marker(&mut self) -> Option<Marker> {
        let subscription = self.subscription.as_mut()?;
        self.state = SessionState::Waiting;

        let marker = tokio::select! {
            biased;
            () = self.shutdown.cancelled() => None,
            changed = subscription.changed() => changed.then_some(Marker::Reload),
            () = tokio::time::sleep(self.keep_alive) => Some(Marker::KeepAlive),
        };

        if marker.is_some() {
            self.state = SessionState::Writing;
        } else {
            self.close();
        }
        marker
    }

    /// Close the session and release its registration.
    pub fn close(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            tracing::debug!(listener = %subscription.id(), "Live reload session closed");
        }
        self.state = SessionState::Closed;
    }

    /// Turn the session into a response body stream of marker chunks.
    ///
    /// The stream ends when the session closes. Dropping the stream (for
    /// example when the client goes away and the write fails) drops the
    /// session and unregisters it.
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
        futures::stream::unfold(self, |mut session| async move {
            let marker = session.next_marker().await?;
            Some((Ok(Bytes::from_static(marker.as_bytes())), session))
        })
    }
}
