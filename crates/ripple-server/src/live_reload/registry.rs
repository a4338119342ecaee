//! Listener registry.
//!
//! Tracks one signal channel per connected live reload client and fans a
//! "something changed" wakeup out to all of them.
//!
//! The lock only guards insert, remove and snapshot. Signals are sent after
//! the lock is released with `try_send`, so a stalled client can never hold
//! up a broadcast or another client's registration.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Identifier of a registered listener, unique for the registry's lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of signalling a single listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// The listener has a pending wakeup.
    Delivered,
    /// The receiving side is gone; the client's session has ended.
    Closed,
}

/// Counts from a single broadcast, for logging.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BroadcastSummary {
    /// Listeners that received (or already had pending) a wakeup.
    pub delivered: usize,
    /// Listeners found closed and removed during the broadcast.
    pub pruned: usize,
}

/// Receiving end of a registered listener.
///
/// Dropping the handle closes the channel. The registry notices on the next
/// broadcast and removes the entry; use [`Subscription`] to unregister
/// eagerly instead.
#[derive(Debug)]
pub struct ListenerHandle {
    id: ListenerId,
    signals: mpsc::Receiver<()>,
}

impl ListenerHandle {
    /// Identifier used to unregister this listener.
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Wait for the next change signal.
    ///
    /// Returns `false` once the listener has been removed from the registry
    /// and no signal is pending.
    pub async fn changed(&mut self) -> bool {
        self.signals.recv().await.is_some()
    }
}

/// Sending end kept by the registry.
#[derive(Clone)]
struct Listener {
    id: ListenerId,
    sender: mpsc::Sender<()>,
}

impl Listener {
    /// Signal without blocking.
    ///
    /// A full channel already holds an unconsumed wakeup, which is all the
    /// receiver needs, so it counts as delivered.
    fn signal(&self) -> Delivery {
        match self.sender.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => Delivery::Delivered,
            Err(TrySendError::Closed(())) => Delivery::Closed,
        }
    }
}

/// Registry of live reload listeners.
///
/// Created once by the server and shared by `Arc` between the change
/// notifier and every streaming session.
pub struct ListenerRegistry {
    listeners: Mutex<Vec<Listener>>,
    next_id: AtomicU64,
}

impl ListenerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a new listener and return its receiving handle.
    pub fn register(&self) -> ListenerHandle {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, signals) = mpsc::channel(1);

        let count = {
            let mut listeners = self.lock();
            listeners.push(Listener { id, sender });
            listeners.len()
        };
        tracing::debug!(listener = %id, listeners = count, "Listener registered");

        ListenerHandle { id, signals }
    }

    /// Register a listener that unregisters itself when dropped.
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        Subscription {
            handle: self.register(),
            registry: Arc::clone(self),
        }
    }

    /// Remove a listener.
    ///
    /// Returns `false` if it was already gone. Removing twice is harmless,
    /// which matters because a broadcast may prune a listener at the same
    /// time its session is cleaning up.
    pub fn unregister(&self, id: ListenerId) -> bool {
        let (removed, count) = {
            let mut listeners = self.lock();
            let before = listeners.len();
            listeners.retain(|listener| listener.id != id);
            (listeners.len() != before, listeners.len())
        };

        if removed {
            tracing::debug!(listener = %id, listeners = count, "Listener unregistered");
        }
        removed
    }

    /// Signal every listener registered at the time of the call.
    ///
    /// Closed listeners are unregistered on the spot. Nothing is reported to
    /// the caller as an error.
    pub fn broadcast(&self) -> BroadcastSummary {
        let snapshot: Vec<Listener> = self.lock().clone();

        let mut summary = BroadcastSummary::default();
        for listener in &snapshot {
            match listener.signal() {
                Delivery::Delivered => summary.delivered += 1,
                // The session may have unregistered itself since the snapshot.
                Delivery::Closed => {
                    if self.unregister(listener.id) {
                        summary.pruned += 1;
                    }
                }
            }
        }

        tracing::debug!(
            delivered = summary.delivered,
            pruned = summary.pruned,
            "Broadcast complete"
        );
        summary
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no listener is registered.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Lock the listener list.
    ///
    /// Every critical section leaves the list consistent, so a poisoned lock
    /// is safe to keep using.
    fn lock(&self) -> MutexGuard<'_, Vec<Listener>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A registration that is released when dropped.
pub struct Subscription {
    handle: ListenerHandle,
    registry: Arc<ListenerRegistry>,
}

impl Subscription {
    /// Identifier of the underlying listener.
    pub fn id(&self) -> ListenerId {
        self.handle.id()
    }

    /// Wait for the next change signal. See [`ListenerHandle::changed`].
    pub async fn changed(&mut self) -> bool {
        self.handle.changed().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.registry.unregister(self.handle.id());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicBool;
    use std::thread;

    #[test]
    fn test_register_assigns_unique_ids() {
        let registry = ListenerRegistry::new();

        let a = registry.register();
        let b = registry.register();

        assert_ne!(a.id(), b.id());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let registry = ListenerRegistry::new();
        let kept = registry.register();
        let removed = registry.register();

        assert!(registry.unregister(removed.id()));
        assert!(!registry.unregister(removed.id()));

        assert_eq!(registry.len(), 1);
        assert!(registry.unregister(kept.id()));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_signals_every_listener() {
        let registry = ListenerRegistry::new();
        let mut first = registry.register();
        let mut second = registry.register();

        let summary = registry.broadcast();

        assert_eq!(
            summary,
            BroadcastSummary {
                delivered: 2,
                pruned: 0
            }
        );
        assert!(first.changed().await);
        assert!(second.changed().await);
    }

    #[tokio::test]
    async fn test_broadcast_prunes_only_closed_listener() {
        let registry = ListenerRegistry::new();
        let mut handles: Vec<ListenerHandle> = (0..5).map(|_| registry.register()).collect();

        // Listener 2's session ended without unregistering.
        let closed = handles.remove(2);
        let closed_id = closed.id();
        drop(closed);

        let summary = registry.broadcast();

        assert_eq!(summary.delivered, 4);
        assert_eq!(summary.pruned, 1);
        assert_eq!(registry.len(), 4);
        assert!(!registry.unregister(closed_id));
        for handle in &mut handles {
            assert!(handle.changed().await);
        }
    }

    #[test]
    fn test_pending_signals_coalesce() {
        let registry = ListenerRegistry::new();
        let mut handle = registry.register();

        registry.broadcast();
        let summary = registry.broadcast();

        assert_eq!(summary.delivered, 1);
        assert!(handle.signals.try_recv().is_ok());
        assert!(handle.signals.try_recv().is_err());
    }

    #[test]
    fn test_broadcast_with_no_listeners() {
        let registry = ListenerRegistry::new();
        assert_eq!(registry.broadcast(), BroadcastSummary::default());
    }

    #[tokio::test]
    async fn test_unregistered_handle_sees_closed_channel() {
        let registry = ListenerRegistry::new();
        let mut handle = registry.register();

        registry.unregister(handle.id());

        assert!(!handle.changed().await);
    }

    #[test]
    fn test_subscription_unregisters_on_drop() {
        let registry = Arc::new(ListenerRegistry::new());
        let subscription = registry.subscribe();
        let id = subscription.id();
        assert_eq!(registry.len(), 1);

        drop(subscription);

        assert!(registry.is_empty());
        assert!(!registry.unregister(id));
    }

    #[test]
    fn test_subscription_drop_after_prune() {
        let registry = Arc::new(ListenerRegistry::new());
        let subscription = registry.subscribe();

        // A broadcast-side prune followed by the owner's cleanup ends in the
        // same state as a single removal.
        assert!(registry.unregister(subscription.id()));
        drop(subscription);

        assert!(registry.is_empty());
    }

    #[test]
    fn test_concurrent_register_unregister_broadcast() {
        const THREADS: usize = 8;
        const ROUNDS: usize = 200;

        let registry = Arc::new(ListenerRegistry::new());

        let workers: Vec<_> = (0..THREADS)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    let mut kept = Vec::new();
                    for round in 0..ROUNDS {
                        let handle = registry.register();
                        if round % 2 == 0 {
                            assert!(registry.unregister(handle.id()));
                            assert!(!registry.unregister(handle.id()));
                        } else {
                            kept.push(handle);
                        }
                        registry.broadcast();
                    }
                    kept
                })
            })
            .collect();

        let kept: Vec<ListenerHandle> = workers
            .into_iter()
            .flat_map(|worker| worker.join().unwrap())
            .collect();

        let ids: HashSet<ListenerId> = kept.iter().map(ListenerHandle::id).collect();
        assert_eq!(ids.len(), THREADS * ROUNDS / 2);
        assert_eq!(registry.len(), THREADS * ROUNDS / 2);

        let summary = registry.broadcast();
        assert_eq!(summary.delivered, THREADS * ROUNDS / 2);
        assert_eq!(summary.pruned, 0);
    }

    #[test]
    fn test_session_cleanup_races_broadcast_prune() {
        const WORKERS: usize = 4;
        const BROADCASTERS: usize = 4;
        const ROUNDS: usize = 500;

        let registry = Arc::new(ListenerRegistry::new());
        let stop = Arc::new(AtomicBool::new(false));

        let broadcasters: Vec<_> = (0..BROADCASTERS)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let stop = Arc::clone(&stop);
                thread::spawn(move || {
                    let mut pruned = 0;
                    while !stop.load(Ordering::Relaxed) {
                        pruned += registry.broadcast().pruned;
                    }
                    pruned
                })
            })
            .collect();

        let workers: Vec<_> = (0..WORKERS)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    let mut removed_by_owner = 0;
                    for _ in 0..ROUNDS {
                        drop(registry.subscribe());

                        // Channel closes before the owner gets to unregister,
                        // so a broadcast may prune it first.
                        let handle = registry.register();
                        let id = handle.id();
                        drop(handle);
                        thread::yield_now();
                        if registry.unregister(id) {
                            removed_by_owner += 1;
                        }
                    }
                    removed_by_owner
                })
            })
            .collect();

        let removed_by_owner: usize = workers.into_iter().map(|w| w.join().unwrap()).sum();
        stop.store(true, Ordering::Relaxed);
        let pruned: usize = broadcasters.into_iter().map(|b| b.join().unwrap()).sum();

        assert!(registry.is_empty());
        assert_eq!(removed_by_owner + pruned, WORKERS * ROUNDS);
        assert_eq!(registry.broadcast(), BroadcastSummary::default());
    }
}
