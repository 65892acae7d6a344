//! Prefix-range fetch over the path index.
//!
//! A fetch walks one or two sub-ranges per key space. Scope checks and
//! ignored subtrees are handled by reseeking the underlying scan instead of
//! filtering entry by entry, so a hidden `node_modules/` costs one seek no
//! matter how many entries it holds.

use std::collections::VecDeque;
use std::sync::Arc;

use super::keys::{within, KeySpace};
use super::models::{normalize_name, PathEntry};
use super::store::{EntryIter, IndexedStore};
use crate::filter::IgnoreCache;
use crate::Result;

/// Options for [`super::PathStore::fetch`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Only return this path and its descendants. `None` or `/` means all.
    pub prefix: Option<String>,
    /// Maximum number of entries. `<= 0` is unbounded.
    pub limit: i64,
    /// Only return directories.
    pub dirs_only: bool,
    /// Only return files.
    pub files_only: bool,
    /// Directory whose subtree is returned first.
    pub current_dir: Option<String>,
}

impl FetchOptions {
    /// Options that return every entry.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    #[must_use]
    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    #[must_use]
    pub fn with_current_dir(mut self, dir: impl Into<String>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn dirs_only(mut self) -> Self {
        self.dirs_only = true;
        self
    }

    #[must_use]
    pub fn files_only(mut self) -> Self {
        self.files_only = true;
        self
    }

    /// Key spaces selected by the kind filters.
    fn spaces(&self) -> Vec<KeySpace> {
        let mut spaces = Vec::with_capacity(2);
        if !self.files_only {
            spaces.push(KeySpace::Dirs);
        }
        if !self.dirs_only {
            spaces.push(KeySpace::Files);
        }
        spaces
    }
}

#[derive(Debug, Clone)]
struct Segment {
    space: KeySpace,
    lower: Vec<u8>,
    upper: Vec<u8>,
}

enum Step {
    Yield,
    Skip,
    Seek(Vec<u8>),
}

struct Cursor {
    segment: Segment,
    iter: EntryIter,
}

/// Lazy iterator over the entries matched by a fetch.
///
/// Errors from the backend are yielded once and end the iteration.
pub struct Fetch {
    store: Arc<dyn IndexedStore>,
    ignores: Arc<IgnoreCache>,
    scope: String,
    segments: VecDeque<Segment>,
    cursor: Option<Cursor>,
    remaining: Option<u64>,
    done: bool,
}

impl Fetch {
    pub(crate) fn new(
        store: Arc<dyn IndexedStore>,
        ignores: Arc<IgnoreCache>,
        options: &FetchOptions,
    ) -> Self {
        let scope = scope_of(options.prefix.as_deref());
        let spaces = options.spaces();
        let split = options
            .current_dir
            .as_deref()
            .map(|dir| scope_of(Some(dir)))
            .filter(|dir| !dir.is_empty() && *dir != scope && within(dir, &scope));

        let mut segments = VecDeque::with_capacity(spaces.len() * 2);
        match split {
            Some(dir) => {
                for &space in &spaces {
                    let (_, upper) = space.scope(&scope);
                    let middle = space.key(&format!("{dir}/"));
                    segments.push_back(Segment {
                        space,
                        lower: middle,
                        upper,
                    });
                }
                for &space in &spaces {
                    let (lower, _) = space.scope(&scope);
                    let middle = space.key(&format!("{dir}/"));
                    segments.push_back(Segment {
                        space,
                        lower,
                        upper: middle,
                    });
                }
            }
            None => {
                for &space in &spaces {
                    let (lower, upper) = space.scope(&scope);
                    segments.push_back(Segment {
                        space,
                        lower,
                        upper,
                    });
                }
            }
        }

        Self {
            store,
            ignores,
            scope,
            segments,
            cursor: None,
            remaining: u64::try_from(options.limit).ok().filter(|limit| *limit > 0),
            done: false,
        }
    }

    fn open(&self, segment: Segment) -> Result<Option<Cursor>> {
        if segment.lower >= segment.upper {
            return Ok(None);
        }
        let iter = self.store.scan(&segment.lower, &segment.upper)?;
        Ok(Some(Cursor { segment, iter }))
    }

    /// Restart the current segment at `target`, never moving backwards.
    fn reseek(&mut self, target: Vec<u8>) -> Result<()> {
        let Some(cursor) = self.cursor.take() else {
            return Ok(());
        };
        let mut segment = cursor.segment;
        if target > segment.lower {
            segment.lower = target;
        }
        self.cursor = self.open(segment)?;
        Ok(())
    }

    /// Decide whether `entry` is returned or how it is skipped.
    fn classify(&self, space: KeySpace, entry: &PathEntry) -> Step {
        if !within(&entry.name, &self.scope) {
            return Step::Seek(space.key(&format!("{}/", self.scope)));
        }

        let Some(root) = self
            .ignores
            .get(&entry.name)
            .and_then(|matcher| matcher.ignored_root(&entry.name, entry.is_dir))
        else {
            return Step::Yield;
        };

        if root != entry.name || entry.is_dir {
            Step::Seek(space.upper_bound(&format!("{root}/")))
        } else {
            Step::Skip
        }
    }

    fn advance(&mut self) -> Result<Option<PathEntry>> {
        loop {
            let Some(cursor) = self.cursor.as_mut() else {
                let Some(segment) = self.segments.pop_front() else {
                    return Ok(None);
                };
                self.cursor = self.open(segment)?;
                continue;
            };
            let space = cursor.segment.space;
            let Some(item) = cursor.iter.next() else {
                self.cursor = None;
                continue;
            };
            let entry = item?;

            match self.classify(space, &entry) {
                Step::Yield => return Ok(Some(entry)),
                Step::Skip => {
                    tracing::trace!(path = %entry.name, "Skipping ignored entry");
                }
                Step::Seek(target) => {
                    tracing::trace!(path = %entry.name, "Skipping subtree");
                    self.reseek(target)?;
                }
            }
        }
    }
}

impl Iterator for Fetch {
    type Item = Result<PathEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.remaining == Some(0) {
            return None;
        }

        match self.advance() {
            Ok(Some(entry)) => {
                if let Some(remaining) = self.remaining.as_mut() {
                    *remaining -= 1;
                }
                Some(Ok(entry))
            }
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                self.cursor = None;
                Some(Err(e))
            }
        }
    }
}

impl std::fmt::Debug for Fetch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetch")
            .field("scope", &self.scope)
            .field("pending_segments", &self.segments.len())
            .field("remaining", &self.remaining)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

/// Normalized scope of a prefix: no trailing `/`, empty for the whole tree.
fn scope_of(prefix: Option<&str>) -> String {
    match prefix.map(normalize_name) {
        Some(scope) if scope != "/" => scope,
        _ => String::new(),
    }
}
