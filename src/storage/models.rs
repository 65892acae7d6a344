//! Data models for indexed paths.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single indexed path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathEntry {
    /// Absolute, `/`-separated path. No trailing separator except for `/`.
    pub name: String,
    /// Whether the path is a directory.
    pub is_dir: bool,
    /// When the entry was last written to the index.
    pub updated_at: DateTime<Utc>,
}

impl PathEntry {
    /// Create an entry stamped with the current time.
    ///
    /// The name is normalized so that `/foo/` and `/foo` refer to the same entry.
    pub fn new(name: impl AsRef<str>, is_dir: bool) -> Self {
        Self {
            name: normalize_name(name.as_ref()),
            is_dir,
            updated_at: Utc::now(),
        }
    }

    /// Create a file entry.
    pub fn file(name: impl AsRef<str>) -> Self {
        Self::new(name, false)
    }

    /// Create a directory entry.
    pub fn dir(name: impl AsRef<str>) -> Self {
        Self::new(name, true)
    }

    /// Last path component, or `/` for the root.
    #[must_use]
    pub fn base_name(&self) -> &str {
        match self.name.rsplit_once('/') {
            Some((_, base)) if !base.is_empty() => base,
            _ => &self.name,
        }
    }

    /// Parent directory of the entry, if any.
    #[must_use]
    pub fn parent(&self) -> Option<&str> {
        match self.name.rsplit_once('/') {
            Some(("", base)) if !base.is_empty() => Some("/"),
            Some((parent, _)) if !parent.is_empty() => Some(parent),
            _ => None,
        }
    }
}

/// Strip trailing separators from a path, keeping the root as `/`.
#[must_use]
pub fn normalize_name(name: &str) -> String {
    let trimmed = name.trim_end_matches('/');
    if trimmed.is_empty() && name.starts_with('/') {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("/foo/bar/"), "/foo/bar");
        assert_eq!(normalize_name("/foo/bar"), "/foo/bar");
        assert_eq!(normalize_name("/"), "/");
        assert_eq!(normalize_name("//"), "/");
        assert_eq!(normalize_name(""), "");
    }

    #[test]
    fn test_entry_constructors() {
        let dir = PathEntry::dir("/tmp/project/");
        assert_eq!(dir.name, "/tmp/project");
        assert!(dir.is_dir);

        let file = PathEntry::file("/tmp/project/main.rs");
        assert!(!file.is_dir);
    }

    #[test]
    fn test_base_name_and_parent() {
        let entry = PathEntry::file("/foo/bar/.gitignore");
        assert_eq!(entry.base_name(), ".gitignore");
        assert_eq!(entry.parent(), Some("/foo/bar"));

        let top = PathEntry::dir("/foo");
        assert_eq!(top.base_name(), "foo");
        assert_eq!(top.parent(), Some("/"));

        let root = PathEntry::dir("/");
        assert_eq!(root.base_name(), "/");
        assert_eq!(root.parent(), None);
    }

    #[test]
    fn test_serde_roundtrip_keeps_kind() {
        let entry = PathEntry::dir("/foo");
        let json = serde_json::to_string(&entry).unwrap();
        let back: PathEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
    }
}
