//! The cache service: owns the watcher, the index and the socket, and runs
//! the control loop until shutdown.

use std::fmt;
use std::os::unix::net::UnixListener as StdUnixListener;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use tokio::net::UnixListener;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::handler::{ApplyStats, EventApplier};
use super::walk::walk_tree_async;
use crate::config::Config;
use crate::error::{ServerError, WatcherError};
use crate::filter::GlobalIgnore;
use crate::server::{self, metrics, StatusReport};
use crate::storage::PathStore;
use crate::watcher::FsWatcher;
use crate::Result;

/// Lifecycle of a cache instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Starting,
    Running,
    Closing,
    Closed,
}

impl CacheState {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Starting,
            1 => Self::Running,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }

    const fn as_u8(self) -> u8 {
        match self {
            Self::Starting => 0,
            Self::Running => 1,
            Self::Closing => 2,
            Self::Closed => 3,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for CacheState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared view of a running cache, handed to connection tasks.
///
/// Clone is cheap; every clone refers to the same instance.
#[derive(Debug, Clone)]
pub struct CacheHandle {
    root: Arc<PathBuf>,
    store: PathStore,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    restart: Arc<AtomicBool>,
    state: Arc<AtomicU8>,
    batch_size: usize,
}

impl CacheHandle {
    fn new(root: PathBuf, store: PathStore, batch_size: usize) -> Self {
        Self {
            root: Arc::new(root),
            store,
            batch_size,
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
            restart: Arc::new(AtomicBool::new(false)),
            state: Arc::new(AtomicU8::new(CacheState::Starting.as_u8())),
        }
    }

    /// Request shutdown. `restart` asks the caller of [`FsCache::run`] to
    /// start a fresh instance afterwards; once set it stays set.
    pub fn shutdown(&self, restart: bool) {
        if restart {
            self.restart.store(true, Ordering::SeqCst);
        }
        if !self.shutdown.is_cancelled() {
            tracing::warn!(restart, "Received stop, shutting down");
        }
        self.shutdown.cancel();
    }

    /// Whether shutdown has been requested.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Token cancelled when shutdown begins.
    #[must_use]
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Tracker that shutdown waits on before closing the store.
    #[must_use]
    pub fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }

    #[must_use]
    pub fn restart_requested(&self) -> bool {
        self.restart.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn state(&self) -> CacheState {
        CacheState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: CacheState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
        tracing::debug!(%state, "Cache state changed");
    }

    #[must_use]
    pub fn store(&self) -> &PathStore {
        &self.store
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Response batch size for requests that leave it unset.
    #[must_use]
    pub const fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Persist buffered index writes.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be flushed.
    pub fn flush(&self) -> Result<()> {
        self.store.flush()
    }

    /// Build a status report.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or metrics cannot be
    /// rendered.
    pub fn status(&self) -> Result<StatusReport> {
        let entries = u64::try_from(self.store.len()?).unwrap_or(u64::MAX);
        metrics::ENTRIES_TOTAL.set(i64::try_from(entries).unwrap_or(i64::MAX));

        Ok(StatusReport {
            root: self.root.display().to_string(),
            entries,
            state: self.state().to_string(),
            metrics: metrics::render()?,
        })
    }
}

/// A configured cache, ready to run.
pub struct FsCache {
    config: Config,
    listener: StdUnixListener,
    watcher: FsWatcher,
    global: Arc<GlobalIgnore>,
    handle: CacheHandle,
}

impl FsCache {
    /// Open the index, compile the global ignore list, create the watcher
    /// and bind the socket.
    ///
    /// A leftover socket file nobody is listening on is replaced.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or any of the
    /// resources cannot be set up.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        metrics::init_metrics();

        std::fs::create_dir_all(&config.data_dir)?;
        let store = PathStore::open(
            config.store_mode,
            config.database_path(),
            config.reset_on_start,
            &config.ignore_files,
        )?;
        let global = Arc::new(GlobalIgnore::new(&config.ignore_config())?);
        let watcher = FsWatcher::new(&config.root, &config.watcher_config())?;
        let listener = bind_socket(&config.socket_path)?;

        tracing::info!(
            root = %config.root.display(),
            socket = %config.socket_path.display(),
            store = %config.store_mode,
            "Cache created"
        );

        let handle = CacheHandle::new(config.root.clone(), store, config.batch_size);
        Ok(Self {
            config,
            listener,
            watcher,
            global,
            handle,
        })
    }

    /// Handle for stopping or inspecting the cache from elsewhere.
    #[must_use]
    pub fn handle(&self) -> CacheHandle {
        self.handle.clone()
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Serve queries, index the tree and follow changes until shutdown.
    ///
    /// Returns whether a restart was requested. Resources are released
    /// before returning, whether the loop ended normally or with an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the watcher cannot be started or its stream ends
    /// before shutdown.
    pub async fn run(self) -> Result<bool> {
        let Self {
            config,
            listener,
            mut watcher,
            global,
            handle,
        } = self;

        let listener = UnixListener::from_std(listener).map_err(|e| ServerError::BindFailed {
            address: config.socket_path.display().to_string(),
            reason: e.to_string(),
        })?;

        handle.tracker.spawn(server::serve(listener, handle.clone()));
        handle.tracker.spawn(watch_signals(handle.clone()));

        let outcome = control_loop(&config, &handle, &mut watcher, &global).await;
        if let Err(e) = &outcome {
            tracing::error!(error = %e, "Cache loop failed");
        }

        close(&config, &handle, watcher).await;
        outcome.map(|()| handle.restart_requested())
    }
}

impl fmt::Debug for FsCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FsCache")
            .field("root", &self.config.root)
            .field("socket", &self.config.socket_path)
            .field("state", &self.handle.state())
            .finish_non_exhaustive()
    }
}

async fn control_loop(
    config: &Config,
    handle: &CacheHandle,
    watcher: &mut FsWatcher,
    global: &Arc<GlobalIgnore>,
) -> Result<()> {
    watcher.start()?;

    let walk = walk_tree_async(&config.root, &handle.store, global, &handle.shutdown).await?;
    tracing::info!(
        root = %config.root.display(),
        dirs = walk.dirs_indexed,
        files = walk.files_indexed,
        skipped = walk.skipped,
        errors = walk.errors,
        "Initial walk complete"
    );
    if !handle.is_shutting_down() {
        handle.set_state(CacheState::Running);
    }

    let applier = Arc::new(EventApplier::new(
        handle.store.clone(),
        Arc::clone(global),
        ApplyStats::new(),
    ));

    let mut flush_tick = tokio::time::interval(config.flush_interval);
    flush_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = handle.shutdown.cancelled() => break,
            batch = watcher.recv() => {
                let Some(batch) = batch else {
                    if handle.is_shutting_down() {
                        break;
                    }
                    return Err(WatcherError::Stopped.into());
                };
                let applier = Arc::clone(&applier);
                let cancel = handle.shutdown.clone();
                tokio::task::spawn_blocking(move || applier.apply(&batch, &cancel))
                    .await
                    .map_err(|e| crate::Error::internal(format!("Apply task failed: {e}")))?;
            }
            _ = flush_tick.tick() => {
                if let Err(e) = handle.flush() {
                    tracing::error!(error = %e, "Error flushing index");
                }
            }
        }
    }

    let stats = applier.stats().snapshot();
    tracing::info!(
        received = stats.events_received,
        ignored = stats.events_ignored,
        added = stats.entries_added,
        deleted = stats.entries_deleted,
        errors = stats.errors,
        "Control loop stopped"
    );
    Ok(())
}

/// Stop accepting work, drain in-flight queries, then release the store
/// and the socket file.
async fn close(config: &Config, handle: &CacheHandle, watcher: FsWatcher) {
    handle.set_state(CacheState::Closing);
    handle.shutdown.cancel();
    watcher.stop();
    drop(watcher);

    handle.tracker.close();
    handle.tracker.wait().await;

    if let Err(e) = handle.store.close() {
        tracing::error!(error = %e, "Error closing index");
    }

    match std::fs::remove_file(&config.socket_path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(socket = %config.socket_path.display(), error = %e, "Failed to remove socket");
        }
    }

    handle.set_state(CacheState::Closed);
    tracing::info!("Cache closed");
}

async fn watch_signals(handle: CacheHandle) {
    tokio::select! {
        () = handle.shutdown.cancelled() => {}
        result = server::shutdown_signal() => match result {
            Ok(()) => handle.shutdown(false),
            Err(e) => tracing::warn!(error = %e, "Signal handlers unavailable"),
        },
    }
}

/// Bind the socket, replacing a stale socket file.
fn bind_socket(path: &Path) -> Result<StdUnixListener> {
    let bind_failed = |reason: String| ServerError::BindFailed {
        address: path.display().to_string(),
        reason,
    };

    if path.exists() {
        if std::os::unix::net::UnixStream::connect(path).is_ok() {
            return Err(bind_failed("another instance is listening".to_string()).into());
        }
        tracing::debug!(socket = %path.display(), "Removing stale socket");
        std::fs::remove_file(path).map_err(|e| bind_failed(e.to_string()))?;
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let listener = StdUnixListener::bind(path).map_err(|e| bind_failed(e.to_string()))?;
    listener
        .set_nonblocking(true)
        .map_err(|e| bind_failed(e.to_string()))?;
    Ok(listener)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreMode;
    use std::time::Duration;
    use tempfile::TempDir;

    fn test_config(tmp: &TempDir) -> Config {
        let root = tmp.path().join("root");
        std::fs::create_dir_all(&root).unwrap();
        Config {
            root,
            socket_path: tmp.path().join("fscache.socket"),
            data_dir: tmp.path().join("data"),
            pid_file: tmp.path().join("fscache.pid"),
            store_mode: StoreMode::Sqlite,
            latency: Duration::from_millis(50),
            probe_go_env: false,
            ..Config::default()
        }
    }

    #[test]
    fn test_state_round_trip() {
        for state in [
            CacheState::Starting,
            CacheState::Running,
            CacheState::Closing,
            CacheState::Closed,
        ] {
            assert_eq!(CacheState::from_u8(state.as_u8()), state);
        }
        assert_eq!(CacheState::Running.to_string(), "running");
    }

    #[test]
    fn test_shutdown_sets_restart_once() {
        let handle = CacheHandle::new(
            PathBuf::from("/"),
            PathStore::in_memory(StoreMode::Sled).unwrap(),
            10,
        );
        handle.shutdown(true);
        handle.shutdown(false);

        assert!(handle.is_shutting_down());
        assert!(handle.restart_requested());
    }

    #[tokio::test]
    async fn test_new_replaces_stale_socket() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(&tmp);
        std::fs::write(&config.socket_path, "").unwrap();

        let cache = FsCache::new(config).unwrap();
        assert_eq!(cache.handle().state(), CacheState::Starting);
    }

    #[tokio::test]
    async fn test_new_rejects_live_socket() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(&tmp);
        let _live = StdUnixListener::bind(&config.socket_path).unwrap();

        let err = FsCache::new(config).unwrap_err();
        assert!(err.to_string().contains("another instance"));
    }

    #[tokio::test]
    async fn test_run_until_shutdown() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(&tmp);
        std::fs::write(config.root.join("seed.txt"), "x").unwrap();
        let socket = config.socket_path.clone();

        let cache = FsCache::new(config).unwrap();
        let handle = cache.handle();
        let task = tokio::spawn(cache.run());

        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        while handle.state() != CacheState::Running {
            assert!(tokio::time::Instant::now() < deadline, "walk did not finish");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(handle.status().unwrap().state, "running");
        assert_eq!(handle.store().len().unwrap(), 2);

        handle.shutdown(true);
        let restart = task.await.unwrap().unwrap();

        assert!(restart);
        assert_eq!(handle.state(), CacheState::Closed);
        assert!(!socket.exists());
        assert!(handle.store().len().is_err());
    }
}
