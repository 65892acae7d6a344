//! Ignore rules.
//!
//! Two layers decide whether a path is visible:
//! - [`GlobalIgnore`]: a fixed list (VCS dirs, caches, toolchain paths)
//!   applied before anything is written to the index
//! - [`IgnoreCache`]: per-directory ignore files discovered while indexing,
//!   applied lazily when the index is read

mod cache;
mod global;

pub use cache::{IgnoreCache, IgnoreMatcher};
pub use global::{collect_lines, GlobalIgnore, IgnoreConfig};

/// Ancestors of a `/`-separated path, deepest first, starting with the path
/// itself and ending with `/`.
pub(crate) fn ancestors(path: &str) -> impl Iterator<Item = &str> {
    let mut next = Some(path);
    std::iter::from_fn(move || {
        let current = next?;
        next = match current.rfind('/') {
            Some(0) if current.len() > 1 => Some("/"),
            Some(0) | None => None,
            Some(idx) => Some(&current[..idx]),
        };
        Some(current)
    })
}
