//! The path index: a backend plus ignore-file bookkeeping and fetch.

use std::path::Path;
use std::sync::Arc;

use super::fetch::{Fetch, FetchOptions};
use super::keys::KeySpace;
use super::kv::SledStore;
use super::models::PathEntry;
use super::sqlite::SqliteStore;
use super::store::IndexedStore;
use crate::config::StoreMode;
use crate::filter::IgnoreCache;
use crate::Result;

/// Default names treated as per-directory ignore files.
pub const DEFAULT_IGNORE_FILES: &[&str] = &[".gitignore", ".ignore"];

/// Path index shared by the control loop and query threads.
///
/// Clone is cheap; clones share the backend and ignore cache.
#[derive(Debug, Clone)]
pub struct PathStore {
    backend: Arc<dyn IndexedStore>,
    ignores: Arc<IgnoreCache>,
    ignore_files: Arc<[String]>,
}

impl PathStore {
    /// Wrap an existing backend.
    pub fn new(backend: Arc<dyn IndexedStore>, ignore_files: &[String]) -> Self {
        Self {
            backend,
            ignores: Arc::new(IgnoreCache::new()),
            ignore_files: ignore_files.into(),
        }
    }

    /// Open the backend selected by `mode` at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be opened.
    pub fn open(
        mode: StoreMode,
        path: impl AsRef<Path>,
        reset: bool,
        ignore_files: &[String],
    ) -> Result<Self> {
        let backend: Arc<dyn IndexedStore> = match mode {
            StoreMode::Sled => Arc::new(SledStore::open(path, reset)?),
            StoreMode::Sqlite => Arc::new(SqliteStore::open(path, reset)?),
        };
        Ok(Self::new(backend, ignore_files))
    }

    /// Open a throwaway store, for tests and benchmarks.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be created.
    pub fn in_memory(mode: StoreMode) -> Result<Self> {
        let backend: Arc<dyn IndexedStore> = match mode {
            StoreMode::Sled => Arc::new(SledStore::temporary()?),
            StoreMode::Sqlite => Arc::new(SqliteStore::open_in_memory()?),
        };
        let ignore_files: Vec<String> = DEFAULT_IGNORE_FILES
            .iter()
            .map(|name| (*name).to_string())
            .collect();
        Ok(Self::new(backend, &ignore_files))
    }

    /// Insert or refresh an entry.
    ///
    /// Files named like an ignore file are also registered with the ignore
    /// cache; a registration failure is logged and does not fail the insert.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend write fails.
    pub fn add(&self, entry: &PathEntry) -> Result<()> {
        self.backend.add(entry)?;

        if !entry.is_dir && self.is_ignore_file(entry.base_name()) {
            if let Err(e) = self.ignores.add(&entry.name) {
                tracing::warn!(path = %entry.name, error = %e, "Failed to load ignore file");
            }
        }
        Ok(())
    }

    /// Remove an entry. Removing a directory also removes everything below it.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend write fails.
    pub fn delete(&self, entry: &PathEntry) -> Result<()> {
        self.backend.delete(entry)?;

        if entry.is_dir {
            let mut removed = 0;
            for space in [KeySpace::Dirs, KeySpace::Files] {
                let (lower, upper) = space.subtree(&entry.name);
                removed += self.backend.delete_range(&lower, &upper)?;
            }
            if removed > 0 {
                tracing::debug!(path = %entry.name, removed, "Pruned directory subtree");
            }
        }
        Ok(())
    }

    /// Start a fetch.
    #[must_use]
    pub fn fetch(&self, options: &FetchOptions) -> Fetch {
        Fetch::new(Arc::clone(&self.backend), Arc::clone(&self.ignores), options)
    }

    /// Persist buffered writes.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be flushed.
    pub fn flush(&self) -> Result<()> {
        self.backend.flush()
    }

    /// Close the backend. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the final flush fails.
    pub fn close(&self) -> Result<()> {
        self.backend.close()
    }

    /// Number of indexed entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    pub fn len(&self) -> Result<usize> {
        self.backend.len()
    }

    /// Whether the index is empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    pub fn is_empty(&self) -> Result<bool> {
        self.backend.is_empty()
    }

    /// The hierarchical ignore cache consulted by fetches.
    #[must_use]
    pub fn ignores(&self) -> &Arc<IgnoreCache> {
        &self.ignores
    }

    fn is_ignore_file(&self, base_name: &str) -> bool {
        self.ignore_files.iter().any(|name| name == base_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const MODES: [StoreMode; 2] = [StoreMode::Sled, StoreMode::Sqlite];

    fn names(store: &PathStore, options: &FetchOptions) -> Vec<String> {
        store
            .fetch(options)
            .map(|entry| entry.unwrap().name)
            .collect()
    }

    fn populate<D: AsRef<str>, F: AsRef<str>>(store: &PathStore, dirs: &[D], files: &[F]) {
        for dir in dirs {
            store.add(&PathEntry::dir(dir)).unwrap();
        }
        for file in files {
            store.add(&PathEntry::file(file)).unwrap();
        }
    }

    #[test]
    fn test_upsert_is_idempotent() {
        for mode in MODES {
            let store = PathStore::in_memory(mode).unwrap();
            store.add(&PathEntry::file("/a/b.txt")).unwrap();
            store.add(&PathEntry::file("/a/b.txt")).unwrap();

            assert_eq!(store.len().unwrap(), 1, "{mode}");
            assert_eq!(names(&store, &FetchOptions::all()), vec!["/a/b.txt"]);
        }
    }

    #[test]
    fn test_prefix_excludes_siblings() {
        for mode in MODES {
            let store = PathStore::in_memory(mode).unwrap();
            populate(
                &store,
                &["/foo", "/foo/bar", "/foo/bar/baz", "/foo/bar/qaz", "/foo/bar/baz-old"],
                &["/foo/bar/baz/1.txt", "/foo/bar/qaz/2.txt", "/foo/bar/baz.txt"],
            );

            let options = FetchOptions::all().with_prefix("/foo/bar/baz");
            assert_eq!(
                names(&store, &options),
                vec!["/foo/bar/baz", "/foo/bar/baz/1.txt"],
                "{mode}"
            );

            let options = FetchOptions::all().with_prefix("/foo/bar/baz/");
            assert_eq!(names(&store, &options).len(), 2, "{mode}");
        }
    }

    #[test]
    fn test_kind_filters() {
        for mode in MODES {
            let store = PathStore::in_memory(mode).unwrap();
            populate(&store, &["/p", "/p/src"], &["/p/src/main.rs", "/p/README"]);

            let dirs = names(&store, &FetchOptions::all().dirs_only());
            assert_eq!(dirs, vec!["/p", "/p/src"], "{mode}");

            let files = names(&store, &FetchOptions::all().files_only());
            assert_eq!(files, vec!["/p/README", "/p/src/main.rs"], "{mode}");
        }
    }

    #[test]
    fn test_limit_spans_key_spaces() {
        for mode in MODES {
            let store = PathStore::in_memory(mode).unwrap();
            populate(&store, &["/a", "/b"], &["/a/1", "/a/2", "/b/3"]);

            let listed = names(&store, &FetchOptions::all().with_limit(3));
            assert_eq!(listed, vec!["/a", "/b", "/a/1"], "{mode}");

            assert_eq!(names(&store, &FetchOptions::all().with_limit(0)).len(), 5);
            assert_eq!(names(&store, &FetchOptions::all().with_limit(-1)).len(), 5);
        }
    }

    #[test]
    fn test_delete_removes_from_results() {
        for mode in MODES {
            let store = PathStore::in_memory(mode).unwrap();
            populate(&store, &["/t"], &["/t/foo.txt", "/t/bar.txt"]);

            store.delete(&PathEntry::file("/t/foo.txt")).unwrap();

            let files = names(&store, &FetchOptions::all().files_only());
            assert_eq!(files, vec!["/t/bar.txt"], "{mode}");
        }
    }

    #[test]
    fn test_delete_dir_prunes_subtree() {
        for mode in MODES {
            let store = PathStore::in_memory(mode).unwrap();
            populate(
                &store,
                &["/w", "/w/old", "/w/old/deep", "/w/older"],
                &["/w/old/a", "/w/old/deep/b", "/w/older/c"],
            );

            store.delete(&PathEntry::dir("/w/old")).unwrap();

            assert_eq!(
                names(&store, &FetchOptions::all()),
                vec!["/w", "/w/older", "/w/older/c"],
                "{mode}"
            );
        }
    }

    #[test]
    fn test_proximity_ordering() {
        for mode in MODES {
            let store = PathStore::in_memory(mode).unwrap();
            populate(
                &store,
                &["/r", "/r/a", "/r/m", "/r/z"],
                &["/r/a/1", "/r/m/2", "/r/z/3"],
            );

            let options = FetchOptions::all().with_current_dir("/r/m");
            assert_eq!(
                names(&store, &options),
                vec!["/r/m", "/r/z", "/r/m/2", "/r/z/3", "/r", "/r/a", "/r/a/1"],
                "{mode}"
            );
        }
    }

    #[test]
    fn test_current_dir_outside_scope_is_ignored() {
        let store = PathStore::in_memory(StoreMode::Sled).unwrap();
        populate(&store, &["/r", "/r/a", "/s"], &["/r/a/1"]);

        let options = FetchOptions::all()
            .with_prefix("/r")
            .with_current_dir("/s");
        assert_eq!(names(&store, &options), vec!["/r", "/r/a", "/r/a/1"]);
    }

    #[test]
    fn test_hierarchical_ignore_precedence() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().to_str().unwrap().to_string();
        let bar = tmp.path().join("foo/bar");
        fs::create_dir_all(&bar).unwrap();
        fs::write(bar.join(".gitignore"), "*.ignored\n").unwrap();

        for mode in MODES {
            let store = PathStore::in_memory(mode).unwrap();
            let base = format!("{root}/foo/bar");
            populate(
                &store,
                &[base.clone()],
                &[
                    format!("{base}/.gitignore"),
                    format!("{base}/x.ignored"),
                    format!("{base}/x.not-ignored"),
                ],
            );

            let files = names(&store, &FetchOptions::all().with_prefix(&base).files_only());
            assert_eq!(
                files,
                vec![format!("{base}/.gitignore"), format!("{base}/x.not-ignored")],
                "{mode}"
            );
        }
    }

    #[test]
    fn test_ignored_directory_subtree_skipped() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().to_str().unwrap().to_string();
        fs::write(tmp.path().join(".gitignore"), "target/\n").unwrap();

        for mode in MODES {
            let store = PathStore::in_memory(mode).unwrap();
            let target = format!("{root}/target");
            let mut files = vec![format!("{root}/.gitignore"), format!("{root}/src.rs")];
            files.extend((0..50).map(|i| format!("{target}/debug/{i}.o")));
            populate(
                &store,
                &[
                    root.clone(),
                    target.clone(),
                    format!("{target}/debug"),
                    format!("{root}/targets"),
                ],
                &files,
            );

            let listed = names(&store, &FetchOptions::all().with_prefix(&root));
            assert_eq!(
                listed,
                vec![
                    root.clone(),
                    format!("{root}/targets"),
                    format!("{root}/.gitignore"),
                    format!("{root}/src.rs"),
                ],
                "{mode}"
            );
        }
    }

    #[test]
    fn test_fetch_after_close_yields_error_once() {
        let store = PathStore::in_memory(StoreMode::Sqlite).unwrap();
        store.add(&PathEntry::file("/x")).unwrap();
        store.close().unwrap();

        let results: Vec<_> = store.fetch(&FetchOptions::all()).collect();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_err());
    }
}
