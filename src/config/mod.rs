//! Configuration management for fscache.
//!
//! Supports configuration from:
//! - Command-line arguments (highest priority)
//! - Environment variables (`FSCACHE_*`)
//! - Built-in defaults rooted at the user's home directory

mod settings;

pub use settings::{Config, StoreMode, DEFAULT_BATCH_SIZE, DEFAULT_FLUSH_INTERVAL};
