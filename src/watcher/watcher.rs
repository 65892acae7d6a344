//! Recursive filesystem watcher using notify-rs.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{select, Receiver, Sender};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::events::EventBatch;
use super::normalize::{normalize, path_kind};
use crate::error::WatcherError;
use crate::Result;

/// Window in which raw events are merged into one batch.
const DEFAULT_LATENCY: Duration = Duration::from_secs(1);

/// Batches buffered between the delivery thread and the consumer.
const DEFAULT_QUEUE_CAPACITY: usize = 100;

type RawEvent = notify::Result<notify::Event>;

/// File watcher configuration.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Coalescing window for raw events.
    pub latency: Duration,
    /// Capacity of the batch queue.
    pub queue_capacity: usize,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            latency: DEFAULT_LATENCY,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// State moved into the delivery thread by [`FsWatcher::start`].
struct Pending {
    raw_rx: Receiver<RawEvent>,
    batch_tx: mpsc::Sender<EventBatch>,
}

/// Recursive watcher over one root, delivering normalized batches.
pub struct FsWatcher {
    root: PathBuf,
    latency: Duration,
    watcher: Mutex<Option<RecommendedWatcher>>,
    pending: Mutex<Option<Pending>>,
    stop_tx: Mutex<Option<Sender<()>>>,
    batch_rx: mpsc::Receiver<EventBatch>,
    stopped: AtomicBool,
}

impl FsWatcher {
    /// Create a watcher for `root`. Nothing is watched until [`FsWatcher::start`].
    ///
    /// # Errors
    ///
    /// Returns an error if the platform watcher cannot be created.
    pub fn new(root: impl AsRef<Path>, config: &WatcherConfig) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let (raw_tx, raw_rx) = crossbeam_channel::unbounded::<RawEvent>();
        let (batch_tx, batch_rx) = mpsc::channel(config.queue_capacity.max(1));

        let watcher = notify::recommended_watcher(move |event: RawEvent| {
            let _ = raw_tx.send(event);
        })
        .map_err(|e| WatcherError::WatchFailed {
            path: root.display().to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            root,
            latency: config.latency,
            watcher: Mutex::new(Some(watcher)),
            pending: Mutex::new(Some(Pending { raw_rx, batch_tx })),
            stop_tx: Mutex::new(None),
            batch_rx,
            stopped: AtomicBool::new(false),
        })
    }

    /// Start watching the root recursively and spawn the delivery thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the root cannot be watched, or if the watcher was
    /// already started or stopped.
    pub fn start(&self) -> Result<()> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(WatcherError::Stopped.into());
        }

        let Some(pending) = self.pending.lock().take() else {
            return Err(WatcherError::WatchFailed {
                path: self.root.display().to_string(),
                reason: "watcher already started".to_string(),
            }
            .into());
        };

        {
            let mut guard = self.watcher.lock();
            let watcher = guard.as_mut().ok_or(WatcherError::Stopped)?;
            watcher
                .watch(&self.root, RecursiveMode::Recursive)
                .map_err(|e| WatcherError::WatchFailed {
                    path: self.root.display().to_string(),
                    reason: e.to_string(),
                })?;
        }

        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
        *self.stop_tx.lock() = Some(stop_tx);

        let latency = self.latency;
        thread::Builder::new()
            .name("fscache-watcher".to_string())
            .spawn(move || deliver(&pending.raw_rx, &stop_rx, &pending.batch_tx, latency))?;

        tracing::info!(path = %self.root.display(), "Watching directory");
        Ok(())
    }

    /// Stop watching. Safe to call more than once and from any thread.
    ///
    /// After this returns, [`FsWatcher::recv`] yields `None`.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        drop(self.watcher.lock().take());
        drop(self.stop_tx.lock().take());
        drop(self.pending.lock().take());
        tracing::info!(path = %self.root.display(), "Stopped watching directory");
    }

    /// Receive the next batch of events.
    ///
    /// Returns `None` once the watcher has been stopped.
    pub async fn recv(&mut self) -> Option<EventBatch> {
        if self.stopped.load(Ordering::SeqCst) {
            return None;
        }
        let batch = self.batch_rx.recv().await?;
        if self.stopped.load(Ordering::SeqCst) {
            return None;
        }
        Some(batch)
    }

    /// Whether [`FsWatcher::stop`] has been called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Drop for FsWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for FsWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsWatcher")
            .field("root", &self.root)
            .field("latency", &self.latency)
            .field("stopped", &self.is_stopped())
            .finish_non_exhaustive()
    }
}

/// Delivery loop: wait for a raw event, gather everything arriving within
/// `latency`, normalize and hand the batch to the consumer.
fn deliver(
    raw_rx: &Receiver<RawEvent>,
    stop_rx: &Receiver<()>,
    batch_tx: &mpsc::Sender<EventBatch>,
    latency: Duration,
) {
    loop {
        let first = select! {
            recv(stop_rx) -> _ => return,
            recv(raw_rx) -> msg => match msg {
                Ok(event) => event,
                Err(_) => return,
            },
        };

        let mut raw = vec![first];
        let deadline = Instant::now() + latency;
        loop {
            let timeout = deadline.saturating_duration_since(Instant::now());
            select! {
                recv(stop_rx) -> _ => return,
                recv(raw_rx) -> msg => match msg {
                    Ok(event) => raw.push(event),
                    Err(_) => break,
                },
                default(timeout) => break,
            }
        }

        let mut batch = EventBatch::new();
        for event in raw {
            match event {
                Ok(event) => batch.extend(normalize(&event, path_kind)),
                Err(e) => tracing::error!(error = %e, "Watch error"),
            }
        }

        if batch.is_empty() {
            continue;
        }

        tracing::debug!(events = batch.len(), "Delivering event batch");
        if batch_tx.blocking_send(batch).is_err() {
            return;
        }
    }
}
