//! Hierarchical cache of per-directory ignore files.
//!
//! Each registered directory owns one compiled layer built from its ignore
//! files. A directory's matcher is the chain of every registered layer from
//! the shallowest ancestor down to the directory itself; lookups resolve a
//! path to the matcher of its deepest registered ancestor.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use parking_lot::RwLock;

use super::ancestors;
use crate::error::IgnoreError;
use crate::storage::normalize_name;
use crate::Result;

/// Compiled rules of one directory.
#[derive(Debug, Clone)]
struct Layer {
    root: String,
    rules: Arc<Gitignore>,
}

/// Ignore rules in effect for one directory and everything below it.
#[derive(Debug, Default)]
pub struct IgnoreMatcher {
    /// Layers ordered root to leaf.
    layers: Vec<Layer>,
}

impl IgnoreMatcher {
    /// Directory that owns the deepest layer.
    #[must_use]
    pub fn dir(&self) -> Option<&str> {
        self.layers.last().map(|layer| layer.root.as_str())
    }

    /// Number of ignore layers in the chain.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    /// Check whether `path` is hidden by this chain.
    #[must_use]
    pub fn is_match(&self, path: &str, is_dir: bool) -> bool {
        self.ignored_root(path, is_dir).is_some()
    }

    /// Shallowest prefix of `path` that the chain ignores.
    ///
    /// Prefixes are tested as directories, the path itself with `is_dir`.
    /// For every prefix the layers are consulted leaf-first and the first
    /// ignore or whitelist decision wins. A layer never applies to its own
    /// directory.
    #[must_use]
    pub fn ignored_root(&self, path: &str, is_dir: bool) -> Option<String> {
        let top = self.layers.first()?;
        let path = normalize_name(path);

        let mut prefixes: Vec<&str> = ancestors(&path)
            .take_while(|p| is_strictly_below(p, &top.root))
            .collect();
        prefixes.reverse();

        for prefix in prefixes {
            let prefix_is_dir = prefix != path || is_dir;
            if self.decide(prefix, prefix_is_dir) {
                return Some(prefix.to_string());
            }
        }
        None
    }

    fn decide(&self, path: &str, is_dir: bool) -> bool {
        for layer in self.layers.iter().rev() {
            if !is_strictly_below(path, &layer.root) {
                continue;
            }
            let matched = layer.rules.matched(Path::new(path), is_dir);
            if matched.is_ignore() {
                return true;
            }
            if matched.is_whitelist() {
                return false;
            }
        }
        false
    }
}

#[derive(Debug)]
struct DirRules {
    sources: Vec<String>,
    layer: Layer,
    chain: Arc<IgnoreMatcher>,
}

/// Registry of ignore files discovered while indexing.
#[derive(Debug, Default)]
pub struct IgnoreCache {
    dirs: RwLock<BTreeMap<String, DirRules>>,
}

impl IgnoreCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or re-read) an ignore file.
    ///
    /// The file's directory gets a freshly compiled layer, and the chains of
    /// that directory and every registered descendant are rebuilt.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or compiled.
    pub fn add(&self, ignore_file: impl AsRef<Path>) -> Result<()> {
        let ignore_file = ignore_file.as_ref();
        let invalid = |reason: String| IgnoreError::InvalidFile {
            path: ignore_file.display().to_string(),
            reason,
        };

        let file = ignore_file
            .to_str()
            .ok_or_else(|| invalid("path is not valid UTF-8".to_string()))?;
        let file = normalize_name(file);
        let dir = match file.rsplit_once('/') {
            Some(("", _)) => "/".to_string(),
            Some((dir, _)) => dir.to_string(),
            None => return Err(invalid("path must be absolute".to_string()).into()),
        };

        let mut dirs = self.dirs.write();

        let mut sources = dirs
            .get(&dir)
            .map(|rules| rules.sources.clone())
            .unwrap_or_default();
        if !sources.contains(&file) {
            sources.push(file.clone());
        }

        let rules = compile(&dir, &sources)?;
        let layer = Layer {
            root: dir.clone(),
            rules: Arc::new(rules),
        };
        dirs.insert(
            dir.clone(),
            DirRules {
                sources,
                layer,
                chain: Arc::default(),
            },
        );

        let affected: Vec<String> = dirs
            .keys()
            .filter(|registered| *registered == &dir || is_strictly_below(registered, &dir))
            .cloned()
            .collect();

        for registered in &affected {
            let chain = Arc::new(build_chain(&dirs, registered));
            if let Some(rules) = dirs.get_mut(registered) {
                rules.chain = chain;
            }
        }

        tracing::debug!(
            file = %file,
            rebuilt = affected.len(),
            "Registered ignore file"
        );
        Ok(())
    }

    /// Matcher of the deepest registered directory at or above `path`.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<Arc<IgnoreMatcher>> {
        let path = normalize_name(path);
        let dirs = self.dirs.read();
        let found = ancestors(&path).find_map(|dir| dirs.get(dir).map(|rules| Arc::clone(&rules.chain)));
        found
    }

    /// Number of directories with registered ignore files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.dirs.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dirs.read().is_empty()
    }
}

fn compile(dir: &str, sources: &[String]) -> Result<Gitignore> {
    let mut builder = GitignoreBuilder::new(dir);

    for source in sources {
        let contents = std::fs::read_to_string(source).map_err(|e| IgnoreError::InvalidFile {
            path: source.clone(),
            reason: e.to_string(),
        })?;

        for line in contents.lines() {
            if let Err(e) = builder.add_line(Some(source.into()), line) {
                tracing::warn!(file = %source, line = %line, error = %e, "Skipping invalid ignore pattern");
            }
        }
    }

    builder
        .build()
        .map_err(|e| {
            IgnoreError::InvalidFile {
                path: dir.to_string(),
                reason: e.to_string(),
            }
            .into()
        })
}

fn build_chain(dirs: &BTreeMap<String, DirRules>, dir: &str) -> IgnoreMatcher {
    let mut layers: Vec<Layer> = ancestors(dir)
        .filter_map(|ancestor| dirs.get(ancestor).map(|rules| rules.layer.clone()))
        .collect();
    layers.reverse();
    IgnoreMatcher { layers }
}

fn is_strictly_below(path: &str, dir: &str) -> bool {
    if dir == "/" {
        return path.len() > 1 && path.starts_with('/');
    }
    path.strip_prefix(dir)
        .is_some_and(|rest| rest.starts_with('/') && rest.len() > 1)
}
