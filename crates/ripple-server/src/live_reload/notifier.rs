//! Change notifier.
//!
//! Watches the configured directories with `notify` and broadcasts a reload
//! signal to every registered listener once per batch of changes.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::debouncer::{ChangeKind, EventDebouncer};
use super::registry::{BroadcastSummary, ListenerRegistry};
use crate::error::ServerError;

/// A batch of filesystem changes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Paths whose content changed.
    pub modified: BTreeSet<PathBuf>,
    /// Paths that were created.
    pub added: BTreeSet<PathBuf>,
    /// Paths that were deleted.
    pub removed: BTreeSet<PathBuf>,
}

impl ChangeEvent {
    /// Total number of changed paths.
    pub fn len(&self) -> usize {
        self.modified.len() + self.added.len() + self.removed.len()
    }

    /// Whether the batch holds no change at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn insert(&mut self, path: PathBuf, kind: ChangeKind) {
        let set = match kind {
            ChangeKind::Added => &mut self.added,
            ChangeKind::Modified => &mut self.modified,
            ChangeKind::Removed => &mut self.removed,
        };
        set.insert(path);
    }
}

/// Default debounce duration in milliseconds.
const DEFAULT_DEBOUNCE_MS: u64 = 100;

/// How often ready batches are drained.
const DRAIN_INTERVAL: Duration = Duration::from_millis(50);

/// Capacity of the channel between the watcher thread and the runtime.
const EVENT_BUFFER: usize = 100;

/// Bridges filesystem changes to the listener registry.
pub struct ChangeNotifier {
    roots: Vec<PathBuf>,
    registry: Arc<ListenerRegistry>,
    watcher: Option<RecommendedWatcher>,
    debounce: Duration,
}

impl ChangeNotifier {
    /// Create a notifier for the given root directories.
    ///
    /// Nothing is watched until [`start`](Self::start) is called.
    #[must_use]
    pub fn new(roots: Vec<PathBuf>, registry: Arc<ListenerRegistry>) -> Self {
        Self {
            roots,
            registry,
            watcher: None,
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
        }
    }

    /// Set the debounce duration.
    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Registry that receives the broadcasts.
    pub fn registry(&self) -> &Arc<ListenerRegistry> {
        &self.registry
    }

    /// Directories being watched.
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Start watching.
    ///
    /// Every root is watched recursively. Two background tasks are spawned:
    /// one feeds raw watcher events into the batcher, the other drains ready
    /// batches and broadcasts. Both stop when `shutdown` is cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error if the watcher cannot be created or a root cannot be
    /// watched (for example because it does not exist).
    pub fn start(&mut self, shutdown: CancellationToken) -> Result<(), ServerError> {
        let (tx, mut rx) = mpsc::channel::<Event>(EVENT_BUFFER);

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                // The callback runs on the watcher's own thread
                Ok(event) => {
                    let _ = tx.blocking_send(event);
                }
                Err(err) => tracing::warn!(error = %err, "File watcher error"),
            }
        })?;

        for root in &self.roots {
            watcher
                .watch(root, RecursiveMode::Recursive)
                .map_err(|source| ServerError::Watch {
                    path: root.clone(),
                    source,
                })?;
            tracing::info!(path = %root.display(), "Watching for changes");
        }
        self.watcher = Some(watcher);

        let debouncer = Arc::new(EventDebouncer::new(self.debounce));

        let debouncer_for_record = Arc::clone(&debouncer);
        let shutdown_for_record = shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = shutdown_for_record.cancelled() => break,
                    event = rx.recv() => match event {
                        Some(event) => Self::record_event(&event, &debouncer_for_record),
                        None => break,
                    },
                }
            }
        });

        let registry = Arc::clone(&self.registry);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(DRAIN_INTERVAL);

            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        if let Some(batch) = debouncer.drain_ready() {
                            Self::handle_batch(&registry, &batch);
                            tracing::debug!(pending = debouncer.pending_len(), "Batch drained");
                        }
                    }
                }
            }
            tracing::debug!("Change notifier stopped");
        });

        Ok(())
    }

    /// Record a raw watcher event into the batcher.
    fn record_event(event: &Event, debouncer: &EventDebouncer) {
        let kind = match event.kind {
            EventKind::Create(_) => ChangeKind::Added,
            EventKind::Modify(_) => ChangeKind::Modified,
            EventKind::Remove(_) => ChangeKind::Removed,
            _ => return,
        };

        for path in &event.paths {
            debouncer.record(path.clone(), kind);
            tracing::trace!(path = %path.display(), ?kind, "Recorded filesystem event");
        }
    }

    /// Broadcast one reload signal for a batch of changes.
    ///
    /// Which paths changed is only logged; listeners just learn that
    /// something changed.
    pub fn handle_batch(registry: &ListenerRegistry, event: &ChangeEvent) -> BroadcastSummary {
        let start = Instant::now();
        let summary = registry.broadcast();

        tracing::info!(
            modified = ?event.modified,
            added = ?event.added,
            removed = ?event.removed,
            delivered = summary.delivered,
            pruned = summary.pruned,
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Changes detected"
        );
        summary
    }
}
