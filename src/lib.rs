//! fscache
//!
//! A daemon that keeps a live index of every path under a directory tree,
//! follows filesystem notifications to keep it current, and answers prefix
//! queries over a local socket.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod filter;
pub mod server;
pub mod storage;
pub mod watcher;

pub use cache::{CacheHandle, CacheState, FsCache};
pub use config::{Config, StoreMode};
pub use error::{Error, Result};
