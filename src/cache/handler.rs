//! Applies watcher batches to the index.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::walk::walk_tree;
use crate::filter::GlobalIgnore;
use crate::server::metrics;
use crate::storage::{PathEntry, PathStore};
use crate::watcher::{EventBatch, EventKind, PathEvent};

/// Statistics for applied events.
#[derive(Debug, Default)]
pub struct ApplyStats {
    pub events_received: AtomicU64,
    pub events_ignored: AtomicU64,
    pub entries_added: AtomicU64,
    pub entries_deleted: AtomicU64,
    pub errors: AtomicU64,
}

impl ApplyStats {
    /// Create new stats tracker.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Get snapshot of current stats.
    #[must_use]
    pub fn snapshot(&self) -> ApplyStatsSnapshot {
        ApplyStatsSnapshot {
            events_received: self.events_received.load(Ordering::Relaxed),
            events_ignored: self.events_ignored.load(Ordering::Relaxed),
            entries_added: self.entries_added.load(Ordering::Relaxed),
            entries_deleted: self.entries_deleted.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of apply stats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyStatsSnapshot {
    pub events_received: u64,
    pub events_ignored: u64,
    pub entries_added: u64,
    pub entries_deleted: u64,
    pub errors: u64,
}

/// Writes normalized events into the store, in delivery order.
#[derive(Debug)]
pub struct EventApplier {
    store: PathStore,
    global: Arc<GlobalIgnore>,
    stats: Arc<ApplyStats>,
}

impl EventApplier {
    /// Create a new applier.
    #[must_use]
    pub fn new(store: PathStore, global: Arc<GlobalIgnore>, stats: Arc<ApplyStats>) -> Self {
        Self {
            store,
            global,
            stats,
        }
    }

    /// Apply one batch.
    ///
    /// Globally ignored paths are dropped. Adding a directory also indexes
    /// everything beneath it, which covers directories moved into the tree.
    /// Failures are logged and the rest of the batch continues.
    pub fn apply(&self, batch: &EventBatch, cancel: &CancellationToken) {
        for event in batch {
            self.stats.events_received.fetch_add(1, Ordering::Relaxed);
            metrics::EVENTS_RECEIVED
                .with_label_values(&[kind_label(event.kind)])
                .inc();
            self.apply_one(event, cancel);
        }

        tracing::debug!(events = batch.len(), "Applied event batch");
    }

    fn apply_one(&self, event: &PathEvent, cancel: &CancellationToken) {
        let Some(path) = event.path.to_str() else {
            tracing::debug!(path = %event.path.display(), "Skipping non UTF-8 path");
            self.stats.events_ignored.fetch_add(1, Ordering::Relaxed);
            return;
        };

        if self.global.is_match(path, event.is_dir) {
            self.stats.events_ignored.fetch_add(1, Ordering::Relaxed);
            metrics::EVENTS_IGNORED.inc();
            return;
        }

        let entry = PathEntry::new(path, event.is_dir);
        match event.kind {
            EventKind::Add if event.is_dir => {
                let walked = walk_tree(&event.path, &self.store, &self.global, cancel);
                self.stats
                    .entries_added
                    .fetch_add(walked.indexed(), Ordering::Relaxed);
                self.stats
                    .errors
                    .fetch_add(walked.errors, Ordering::Relaxed);
            }
            EventKind::Add => match self.store.add(&entry) {
                Ok(()) => {
                    self.stats.entries_added.fetch_add(1, Ordering::Relaxed);
                    metrics::ENTRIES_ADDED.inc();
                }
                Err(e) => {
                    tracing::warn!(path, error = %e, "Failed to add path");
                    self.stats.errors.fetch_add(1, Ordering::Relaxed);
                }
            },
            EventKind::Delete => match self.store.delete(&entry) {
                Ok(()) => {
                    self.stats.entries_deleted.fetch_add(1, Ordering::Relaxed);
                    metrics::ENTRIES_DELETED.inc();
                }
                Err(e) => {
                    tracing::warn!(path, error = %e, "Failed to delete path");
                    self.stats.errors.fetch_add(1, Ordering::Relaxed);
                }
            },
        }
    }

    /// Get current stats.
    #[must_use]
    pub fn stats(&self) -> Arc<ApplyStats> {
        Arc::clone(&self.stats)
    }
}

const fn kind_label(kind: EventKind) -> &'static str {
    match kind {
        EventKind::Add => "add",
        EventKind::Delete => "delete",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreMode;
    use crate::storage::FetchOptions;
    use std::fs;
    use tempfile::TempDir;

    fn applier(globals: &[&str]) -> EventApplier {
        let store = PathStore::in_memory(StoreMode::Sled).unwrap();
        let global =
            GlobalIgnore::from_lines(globals.iter().map(|s| (*s).to_string()).collect()).unwrap();
        EventApplier::new(store, Arc::new(global), ApplyStats::new())
    }

    fn names(applier: &EventApplier) -> Vec<String> {
        applier
            .store
            .fetch(&FetchOptions::all())
            .map(|entry| entry.unwrap().name)
            .collect()
    }

    #[test]
    fn test_apply_add_and_delete() {
        let applier = applier(&[]);
        let cancel = CancellationToken::new();

        let batch: EventBatch = [
            PathEvent::add("/w/a.txt", false),
            PathEvent::add("/w/b.txt", false),
            PathEvent::delete("/w/a.txt", false),
        ]
        .into_iter()
        .collect();
        applier.apply(&batch, &cancel);

        assert_eq!(names(&applier), vec!["/w/b.txt"]);

        let snapshot = applier.stats().snapshot();
        assert_eq!(snapshot.events_received, 3);
        assert_eq!(snapshot.entries_added, 2);
        assert_eq!(snapshot.entries_deleted, 1);
        assert_eq!(snapshot.errors, 0);
    }

    #[test]
    fn test_apply_drops_global_ignores() {
        let applier = applier(&[".git/"]);
        let batch: EventBatch = [
            PathEvent::add("/w/.git/index", false),
            PathEvent::add("/w/src.rs", false),
        ]
        .into_iter()
        .collect();
        applier.apply(&batch, &CancellationToken::new());

        assert_eq!(names(&applier), vec!["/w/src.rs"]);
        assert_eq!(applier.stats().snapshot().events_ignored, 1);
    }

    #[test]
    fn test_apply_dir_add_indexes_subtree() {
        let tmp = TempDir::new().unwrap();
        let moved = tmp.path().join("moved");
        fs::create_dir_all(moved.join("inner")).unwrap();
        fs::write(moved.join("inner/file.txt"), "x").unwrap();

        let applier = applier(&[]);
        let batch: EventBatch = std::iter::once(PathEvent::add(&moved, true)).collect();
        applier.apply(&batch, &CancellationToken::new());

        let root = moved.to_str().unwrap();
        let names = names(&applier);
        assert!(names.contains(&root.to_string()));
        assert!(names.contains(&format!("{root}/inner")));
        assert!(names.contains(&format!("{root}/inner/file.txt")));
        assert_eq!(applier.stats().snapshot().entries_added, 3);
    }

    #[test]
    fn test_apply_dir_delete_prunes_subtree() {
        let applier = applier(&[]);
        let batch: EventBatch = [
            PathEvent::add("/w/d/x.txt", false),
            PathEvent::add("/w/keep.txt", false),
            PathEvent::delete("/w/d", true),
        ]
        .into_iter()
        .collect();
        applier.apply(&batch, &CancellationToken::new());

        assert_eq!(names(&applier), vec!["/w/keep.txt"]);
    }
}
