//! Ordered key-value backend for the path index, built on `sled`.

use std::path::Path;

use parking_lot::RwLock;
use sled::{Batch, Db};

use super::keys::entry_key;
use super::models::PathEntry;
use super::store::{EntryIter, IndexedStore};
use crate::error::StorageError;
use crate::Result;

/// Key recording the on-disk format of the store.
const FORMAT_KEY: &[u8] = b"meta:format";

/// Current on-disk format. Any other value wipes the store on open.
const FORMAT_VERSION: &[u8] = b"1";

/// Number of `meta:` keys kept alongside the entries.
const META_KEYS: usize = 1;

/// Store holding JSON-encoded [`PathEntry`] values under [`entry_key`]s.
#[derive(Debug)]
pub struct SledStore {
    db: RwLock<Option<Db>>,
}

impl SledStore {
    /// Open (or create) the store at `path`.
    ///
    /// The store is wiped when `reset` is set or when it was written in a
    /// different format.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn open(path: impl AsRef<Path>, reset: bool) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = sled::open(path)
            .map_err(|e| StorageError::Database(format!("failed to open sled store: {e}")))?;
        tracing::info!(path = %path.display(), reset, "Sled index opened");
        Self::init(db, reset)
    }

    /// Open a store that is deleted when dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| StorageError::Database(format!("failed to open sled store: {e}")))?;
        Self::init(db, false)
    }

    fn init(db: Db, reset: bool) -> Result<Self> {
        let format = db.get(FORMAT_KEY).map_err(StorageError::database)?;
        let current = format.as_deref() == Some(FORMAT_VERSION);

        if reset || !current {
            if !db.is_empty() {
                tracing::warn!(
                    entries = db.len(),
                    reset,
                    "Discarding persisted index"
                );
            }
            db.clear().map_err(StorageError::database)?;
            db.insert(FORMAT_KEY, FORMAT_VERSION)
                .map_err(StorageError::database)?;
        }

        Ok(Self {
            db: RwLock::new(Some(db)),
        })
    }

    fn db(&self) -> Result<Db> {
        self.db
            .read()
            .clone()
            .ok_or_else(|| StorageError::Closed.into())
    }
}

impl IndexedStore for SledStore {
    fn add(&self, entry: &PathEntry) -> Result<()> {
        let key = entry_key(&entry.name, entry.is_dir);
        let value = serde_json::to_vec(entry).map_err(|e| StorageError::encoding(&key, e))?;
        self.db()?
            .insert(key, value)
            .map_err(StorageError::database)?;
        Ok(())
    }

    fn delete(&self, entry: &PathEntry) -> Result<()> {
        self.db()?
            .remove(entry_key(&entry.name, entry.is_dir))
            .map_err(StorageError::database)?;
        Ok(())
    }

    fn delete_range(&self, lower: &[u8], upper: &[u8]) -> Result<usize> {
        if lower >= upper {
            return Ok(0);
        }

        let db = self.db()?;
        let mut batch = Batch::default();
        let mut removed = 0;
        for key in db.range(lower..upper).keys() {
            batch.remove(key.map_err(StorageError::database)?);
            removed += 1;
        }

        db.apply_batch(batch).map_err(StorageError::database)?;
        Ok(removed)
    }

    fn scan(&self, lower: &[u8], upper: &[u8]) -> Result<EntryIter> {
        let db = self.db()?;
        if lower >= upper {
            return Ok(Box::new(std::iter::empty()));
        }

        let iter = db
            .range(lower.to_vec()..upper.to_vec())
            .map(|item| -> Result<PathEntry> {
                let (key, value) = item.map_err(StorageError::database)?;
                let entry = serde_json::from_slice(&value)
                    .map_err(|e| StorageError::encoding(&key, e))?;
                Ok(entry)
            });
        Ok(Box::new(iter))
    }

    fn len(&self) -> Result<usize> {
        Ok(self.db()?.len().saturating_sub(META_KEYS))
    }

    fn flush(&self) -> Result<()> {
        self.db()?.flush().map_err(StorageError::database)?;
        Ok(())
    }

    fn close(&self) -> Result<()> {
        let Some(db) = self.db.write().take() else {
            return Ok(());
        };

        db.flush().map_err(StorageError::database)?;
        tracing::debug!("Sled index closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::keys::KeySpace;
    use tempfile::TempDir;

    fn names(store: &SledStore, space: KeySpace) -> Vec<String> {
        let (lower, upper) = space.scope("");
        store
            .scan(&lower, &upper)
            .unwrap()
            .map(|entry| entry.unwrap().name)
            .collect()
    }

    #[test]
    fn test_add_is_upsert() {
        let store = SledStore::temporary().unwrap();
        let first = PathEntry::file("/a/b.txt");
        store.add(&first).unwrap();

        let mut second = first.clone();
        second.updated_at = first.updated_at + chrono::Duration::seconds(5);
        store.add(&second).unwrap();

        assert_eq!(store.len().unwrap(), 1);
        assert_eq!(store.get("/a/b.txt", false).unwrap(), Some(second));
    }

    #[test]
    fn test_kinds_are_separate() {
        let store = SledStore::temporary().unwrap();
        store.add(&PathEntry::dir("/a")).unwrap();
        store.add(&PathEntry::file("/a")).unwrap();

        assert_eq!(names(&store, KeySpace::Dirs), vec!["/a"]);
        assert_eq!(names(&store, KeySpace::Files), vec!["/a"]);

        store.delete(&PathEntry::file("/a")).unwrap();
        assert!(names(&store, KeySpace::Files).is_empty());
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_delete_range() {
        let store = SledStore::temporary().unwrap();
        for name in ["/foo", "/foo/b", "/foo/b/c", "/foobar"] {
            store.add(&PathEntry::dir(name)).unwrap();
        }

        let (lower, upper) = KeySpace::Dirs.subtree("/foo");
        assert_eq!(store.delete_range(&lower, &upper).unwrap(), 3);
        assert_eq!(names(&store, KeySpace::Dirs), vec!["/foobar"]);
    }

    #[test]
    fn test_reopen_keeps_or_resets() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index.sled");

        let store = SledStore::open(&path, false).unwrap();
        store.add(&PathEntry::dir("/keep")).unwrap();
        store.close().unwrap();
        drop(store);

        let store = SledStore::open(&path, false).unwrap();
        assert_eq!(store.len().unwrap(), 1);
        store.close().unwrap();
        drop(store);

        let store = SledStore::open(&path, true).unwrap();
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_format_mismatch_wipes() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index.sled");

        {
            let db = sled::open(&path).unwrap();
            db.insert(FORMAT_KEY, b"0".to_vec()).unwrap();
            db.insert(b"file:/stale".to_vec(), b"{}".to_vec()).unwrap();
            db.flush().unwrap();
        }

        let store = SledStore::open(&path, false).unwrap();
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_operations_after_close_fail() {
        let store = SledStore::temporary().unwrap();
        store.close().unwrap();
        store.close().unwrap();

        let err = store.add(&PathEntry::file("/x")).unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Storage(StorageError::Closed)
        ));
    }
}
