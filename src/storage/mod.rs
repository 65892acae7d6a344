//! Ordered path index with two embedded backends.
//!
//! This module provides:
//! - [`IndexedStore`]: the backend abstraction over an ordered key space
//! - [`SledStore`] (default) and [`SqliteStore`] backends
//! - [`PathStore`]: ignore-file registration, subtree deletes and
//!   proximity-ordered prefix fetches on top of either backend

mod connection;
mod fetch;
mod index;
pub mod keys;
mod kv;
mod models;
mod schema;
mod sqlite;
mod store;

pub use connection::Database;
pub use fetch::{Fetch, FetchOptions};
pub use index::{PathStore, DEFAULT_IGNORE_FILES};
pub use kv::SledStore;
pub use models::{normalize_name, PathEntry};
pub use schema::{migrate, verify_schema, SCHEMA_VERSION};
pub use sqlite::SqliteStore;
pub use store::{EntryIter, IndexedStore};
