//! File system watching.
//!
//! This module provides:
//! - A recursive watcher over one root using notify-rs
//! - Coalescing of raw notifications into batches
//! - Normalization into add/delete events with a directory flag

mod events;
mod normalize;
#[allow(clippy::module_inception)]
mod watcher;

pub use events::{EventBatch, EventKind, PathEvent};
pub use normalize::{normalize, path_kind};
pub use watcher::{FsWatcher, WatcherConfig};
