//! Backend abstraction over an ordered key space of path entries.

use std::fmt;

use super::keys::entry_key;
use super::models::PathEntry;
use crate::Result;

/// Lazy, ascending-key iterator over entries in a range.
pub type EntryIter = Box<dyn Iterator<Item = Result<PathEntry>> + Send>;

/// Ordered storage of path entries keyed by [`entry_key`].
///
/// Implementations must be safe to share between the control loop and
/// query threads. After [`IndexedStore::close`] every operation fails with
/// [`crate::error::StorageError::Closed`].
pub trait IndexedStore: Send + Sync + fmt::Debug {
    /// Insert or refresh an entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend write fails.
    fn add(&self, entry: &PathEntry) -> Result<()>;

    /// Remove the entry with the same name and kind, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend write fails.
    fn delete(&self, entry: &PathEntry) -> Result<()>;

    /// Remove every key in `[lower, upper)`, returning how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend write fails.
    fn delete_range(&self, lower: &[u8], upper: &[u8]) -> Result<usize>;

    /// Iterate over `[lower, upper)` in ascending key order.
    ///
    /// # Errors
    ///
    /// Returns an error if the scan cannot be started.
    fn scan(&self, lower: &[u8], upper: &[u8]) -> Result<EntryIter>;

    /// Number of indexed entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn len(&self) -> Result<usize>;

    /// Whether the index holds no entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Persist buffered writes.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be flushed.
    fn flush(&self) -> Result<()>;

    /// Flush and release the backend. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the final flush fails.
    fn close(&self) -> Result<()>;

    /// Look up a single entry by name and kind.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn get(&self, name: &str, is_dir: bool) -> Result<Option<PathEntry>> {
        let lower = entry_key(name, is_dir);
        let mut upper = lower.clone();
        upper.push(0);
        self.scan(&lower, &upper)?.next().transpose()
    }
}
