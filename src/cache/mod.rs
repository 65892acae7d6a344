//! The cache service.
//!
//! Ties the watcher, the global ignore list and the index together:
//! - [`FsCache`] sets everything up and runs the control loop
//! - [`CacheHandle`] lets connections and signal handlers stop it
//! - The initial walk and event application run on blocking threads

mod handler;
mod service;
mod walk;

pub use handler::{ApplyStats, ApplyStatsSnapshot, EventApplier};
pub use service::{CacheHandle, CacheState, FsCache};
pub use walk::{walk_tree, walk_tree_async, WalkStats, WalkStatsSnapshot};
