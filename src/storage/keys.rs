//! Key encoding for the ordered path index.
//!
//! Every entry lives under a kind prefix (`dir:` or `file:`) followed by its
//! name. Directory names carry a trailing `/` so that a directory sorts
//! directly before its descendants and `[kind+P/, kind+increment(P/))` is
//! exactly the set of entries below `P`.

/// Key prefix for directory entries.
pub const DIR_PREFIX: &[u8] = b"dir:";

/// Key prefix for file entries.
pub const FILE_PREFIX: &[u8] = b"file:";

/// One of the two kind-separated key spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySpace {
    Dirs,
    Files,
}

impl KeySpace {
    /// Key space holding entries of the given kind.
    #[must_use]
    pub const fn for_kind(is_dir: bool) -> Self {
        if is_dir {
            Self::Dirs
        } else {
            Self::Files
        }
    }

    #[must_use]
    pub const fn prefix(self) -> &'static [u8] {
        match self {
            Self::Dirs => DIR_PREFIX,
            Self::Files => FILE_PREFIX,
        }
    }

    /// Exclusive upper bound of the whole key space.
    #[must_use]
    pub const fn end(self) -> &'static [u8] {
        match self {
            Self::Dirs => b"dir;",
            Self::Files => b"file;",
        }
    }

    /// Raw key for `path` inside this space, with no separator handling.
    #[must_use]
    pub fn key(self, path: &str) -> Vec<u8> {
        let prefix = self.prefix();
        let mut key = Vec::with_capacity(prefix.len() + path.len());
        key.extend_from_slice(prefix);
        key.extend_from_slice(path.as_bytes());
        key
    }

    /// First key after every key that starts with `kind + path`.
    #[must_use]
    pub fn upper_bound(self, path: &str) -> Vec<u8> {
        increment(&self.key(path)).unwrap_or_else(|| self.end().to_vec())
    }

    /// Half-open range of every entry below directory `dir`.
    ///
    /// In the directory space this includes the key of `dir` itself.
    #[must_use]
    pub fn subtree(self, dir: &str) -> (Vec<u8>, Vec<u8>) {
        let dir = with_separator(dir);
        (self.key(&dir), self.upper_bound(&dir))
    }

    /// Half-open range that contains `scope` itself and everything below it.
    ///
    /// An empty scope covers the whole key space. The range also contains
    /// string-prefix siblings such as `/foo-bar` for scope `/foo`; callers
    /// skip those.
    #[must_use]
    pub fn scope(self, scope: &str) -> (Vec<u8>, Vec<u8>) {
        (self.key(scope), self.upper_bound(&format!("{scope}/")))
    }
}

/// Encode the key for an entry.
#[must_use]
pub fn entry_key(name: &str, is_dir: bool) -> Vec<u8> {
    let space = KeySpace::for_kind(is_dir);
    if is_dir {
        space.key(&with_separator(name))
    } else {
        space.key(name)
    }
}

/// Smallest byte string greater than every string with prefix `bytes`.
///
/// Trailing `0xFF` bytes carry into the previous byte. Returns `None` when
/// no such bound exists (empty input or all `0xFF`).
#[must_use]
pub fn increment(bytes: &[u8]) -> Option<Vec<u8>> {
    let mut out = bytes.to_vec();
    while let Some(last) = out.pop() {
        if last < u8::MAX {
            out.push(last + 1);
            return Some(out);
        }
    }
    None
}

/// Whether `name` is `scope` itself or lies below it.
#[must_use]
pub fn within(name: &str, scope: &str) -> bool {
    if scope.is_empty() {
        return true;
    }
    name.strip_prefix(scope)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

fn with_separator(path: &str) -> String {
    if path.ends_with('/') {
        path.to_string()
    } else {
        format!("{path}/")
    }
}
