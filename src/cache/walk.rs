//! Tree walker for the initial index build and for directories moved in.
//!
//! Walks a directory with `walkdir`, pruning globally ignored subtrees, and
//! upserts every remaining path. Hierarchical ignore files are not applied
//! here; they are registered as they are indexed and filtered at read time.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use crate::filter::GlobalIgnore;
use crate::server::metrics;
use crate::storage::{PathEntry, PathStore};
use crate::Result;

/// Entries visited between cancellation checks.
const CANCEL_CHECK_INTERVAL: u64 = 1024;

/// Walk statistics.
#[derive(Debug, Default)]
pub struct WalkStats {
    pub dirs_indexed: AtomicU64,
    pub files_indexed: AtomicU64,
    pub skipped: AtomicU64,
    pub errors: AtomicU64,
}

impl WalkStats {
    /// Create new stats.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a snapshot of current stats.
    #[must_use]
    pub fn snapshot(&self) -> WalkStatsSnapshot {
        WalkStatsSnapshot {
            dirs_indexed: self.dirs_indexed.load(Ordering::Relaxed),
            files_indexed: self.files_indexed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            cancelled: false,
        }
    }
}

/// Snapshot of walk stats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkStatsSnapshot {
    pub dirs_indexed: u64,
    pub files_indexed: u64,
    pub skipped: u64,
    pub errors: u64,
    /// The walk stopped early because shutdown was requested.
    pub cancelled: bool,
}

impl WalkStatsSnapshot {
    /// Entries written to the store.
    #[must_use]
    pub const fn indexed(&self) -> u64 {
        self.dirs_indexed + self.files_indexed
    }
}

/// Walk `root` and index it, the root itself included.
///
/// Globally ignored directories are pruned without descending. Paths that
/// are not valid UTF-8 are skipped. Per-entry errors are logged and counted.
pub fn walk_tree(
    root: &Path,
    store: &PathStore,
    global: &GlobalIgnore,
    cancel: &CancellationToken,
) -> WalkStatsSnapshot {
    let stats = WalkStats::new();
    let started = Instant::now();
    let mut visited: u64 = 0;
    let mut cancelled = false;

    tracing::debug!(path = %root.display(), "Starting tree walk");

    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 {
                return true;
            }
            let keep = entry
                .path()
                .to_str()
                .map_or(true, |path| !global.is_match(path, entry.file_type().is_dir()));
            if !keep {
                stats.skipped.fetch_add(1, Ordering::Relaxed);
            }
            keep
        });

    for entry in walker {
        visited += 1;
        if visited % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
            cancelled = true;
            break;
        }

        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!(error = %e, "Error walking directory");
                stats.errors.fetch_add(1, Ordering::Relaxed);
                continue;
            }
        };

        let Some(path) = entry.path().to_str() else {
            tracing::debug!(path = %entry.path().display(), "Skipping non UTF-8 path");
            stats.skipped.fetch_add(1, Ordering::Relaxed);
            continue;
        };

        let is_dir = entry.file_type().is_dir();
        match store.add(&PathEntry::new(path, is_dir)) {
            Ok(()) if is_dir => {
                stats.dirs_indexed.fetch_add(1, Ordering::Relaxed);
            }
            Ok(()) => {
                stats.files_indexed.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::warn!(path, error = %e, "Failed to index path");
                stats.errors.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    let mut snapshot = stats.snapshot();
    snapshot.cancelled = cancelled;
    metrics::ENTRIES_ADDED.inc_by(snapshot.indexed());

    tracing::debug!(
        path = %root.display(),
        dirs = snapshot.dirs_indexed,
        files = snapshot.files_indexed,
        skipped = snapshot.skipped,
        errors = snapshot.errors,
        cancelled,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Tree walk complete"
    );

    snapshot
}

/// Walk `root` on a blocking thread and record the walk duration.
///
/// # Errors
///
/// Returns an error if the blocking task panics or is aborted.
pub async fn walk_tree_async(
    root: &Path,
    store: &PathStore,
    global: &std::sync::Arc<GlobalIgnore>,
    cancel: &CancellationToken,
) -> Result<WalkStatsSnapshot> {
    let root = root.to_path_buf();
    let store = store.clone();
    let global = std::sync::Arc::clone(global);
    let cancel = cancel.clone();

    let timer = metrics::WALK_DURATION.start_timer();
    let snapshot = tokio::task::spawn_blocking(move || walk_tree(&root, &store, &global, &cancel))
        .await
        .map_err(|e| crate::Error::internal(format!("Walk task failed: {e}")))?;
    timer.observe_duration();

    Ok(snapshot)
}
