//! Event batching for live reload.
//!
//! Coalesces raw filesystem events per path and hands them out as
//! [`ChangeEvent`] batches once a path has been quiet for the debounce
//! duration. Editors often emit several events per save; this keeps one
//! save to one batch. A path that keeps changing is still flushed once it
//! has been pending for [`MAX_WAIT_FACTOR`] debounce periods.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use super::notifier::ChangeEvent;

/// Longest a path may stay pending, in debounce periods.
pub(crate) const MAX_WAIT_FACTOR: u32 = 4;

/// Kind of filesystem change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ChangeKind {
    Added,
    Modified,
    Removed,
}

/// Pending change waiting for its deadline.
struct PendingChange {
    kind: ChangeKind,
    deadline: Instant,
    first_seen: Instant,
}

impl PendingChange {
    fn is_ready(&self, now: Instant, max_wait: Duration) -> bool {
        now >= self.deadline || now >= self.first_seen + max_wait
    }
}

/// Thread-safe event batcher.
pub(crate) struct EventDebouncer {
    pending: Mutex<HashMap<PathBuf, PendingChange>>,
    debounce_duration: Duration,
}

impl EventDebouncer {
    /// Create a new batcher with the specified debounce duration.
    pub(crate) fn new(debounce_duration: Duration) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            debounce_duration,
        }
    }

    /// Record a change, pushing the path's deadline out.
    ///
    /// The first-seen time is kept across coalesced events, which bounds how
    /// long a continuously written path can stay pending.
    pub(crate) fn record(&self, path: PathBuf, kind: ChangeKind) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        let deadline = now + self.debounce_duration;

        match pending.entry(path) {
            Entry::Vacant(entry) => {
                entry.insert(PendingChange {
                    kind,
                    deadline,
                    first_seen: now,
                });
            }
            Entry::Occupied(mut entry) => {
                if let Some(coalesced) = Self::coalesce(entry.get().kind, kind) {
                    let change = entry.get_mut();
                    change.kind = coalesced;
                    change.deadline = deadline;
                } else {
                    // Added then removed: nothing a client could have seen.
                    entry.remove();
                }
            }
        }
    }

    /// Coalesce two change kinds for the same path.
    ///
    /// Returns `None` if both changes cancel out.
    #[allow(clippy::match_same_arms)]
    fn coalesce(existing: ChangeKind, new: ChangeKind) -> Option<ChangeKind> {
        use ChangeKind::{Added, Modified, Removed};

        match (existing, new) {
            (Added, Added) => Some(Added),
            (Added, Modified) => Some(Added),
            (Added, Removed) => None,

            (Modified, Added) => Some(Added),
            (Modified, Modified) => Some(Modified),
            (Modified, Removed) => Some(Removed),

            (Removed, Added) => Some(Modified), // replaced
            (Removed, Modified) => Some(Removed),
            (Removed, Removed) => Some(Removed),
        }
    }

    /// Drain every change whose deadline or maximum wait has passed as one
    /// batch.
    ///
    /// Returns `None` when nothing is ready, so empty batches never reach
    /// the registry.
    pub(crate) fn drain_ready(&self) -> Option<ChangeEvent> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        let max_wait = self.debounce_duration * MAX_WAIT_FACTOR;

        let mut batch = ChangeEvent::default();
        pending.retain(|path, change| {
            if !change.is_ready(now, max_wait) {
                return true;
            }
            batch.insert(path.clone(), change.kind);
            false
        });

        (!batch.is_empty()).then_some(batch)
    }

    /// Number of paths waiting for their deadline.
    pub(crate) fn pending_len(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
