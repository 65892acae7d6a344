//! Helpers for the `fscache read` front end.

use std::path::{Component, Path, PathBuf};

/// Directories marking the top of a repository.
const ROOT_MARKERS: &[&str] = &[".git", ".svn", ".hg"];

/// Give a non-empty prefix a trailing `/`.
#[must_use]
pub fn clean_prefix(prefix: &str) -> String {
    if prefix.is_empty() || prefix.ends_with('/') {
        prefix.to_string()
    } else {
        format!("{prefix}/")
    }
}

/// Walk up from `start` to the nearest directory containing a VCS marker.
///
/// Falls back to `/` when no marker is found.
#[must_use]
pub fn find_root(start: &Path) -> PathBuf {
    start
        .ancestors()
        .find(|dir| ROOT_MARKERS.iter().any(|marker| dir.join(marker).exists()))
        .map_or_else(|| PathBuf::from("/"), Path::to_path_buf)
}

/// Express absolute `path` relative to absolute `base`.
#[must_use]
pub fn relative_path(base: &Path, path: &Path) -> PathBuf {
    let base: Vec<Component<'_>> = base.components().collect();
    let target: Vec<Component<'_>> = path.components().collect();
    let common = base
        .iter()
        .zip(&target)
        .take_while(|(a, b)| a == b)
        .count();

    let mut rel = PathBuf::new();
    for _ in common..base.len() {
        rel.push("..");
    }
    for component in &target[common..] {
        rel.push(component.as_os_str());
    }

    if rel.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        rel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_clean_prefix() {
        assert_eq!(clean_prefix(""), "");
        assert_eq!(clean_prefix("/foo"), "/foo/");
        assert_eq!(clean_prefix("/foo/"), "/foo/");
    }

    #[test]
    fn test_find_root() {
        let tmp = TempDir::new().unwrap();
        let repo = tmp.path().join("repo");
        let nested = repo.join("src/deep");
        fs::create_dir_all(&nested).unwrap();
        fs::create_dir_all(repo.join(".git")).unwrap();

        assert_eq!(find_root(&nested), repo);
        assert_eq!(find_root(&repo), repo);
    }

    #[test]
    fn test_relative_path() {
        let base = Path::new("/home/me/project");
        assert_eq!(
            relative_path(base, Path::new("/home/me/project/src/main.rs")),
            PathBuf::from("src/main.rs")
        );
        assert_eq!(
            relative_path(base, Path::new("/home/me/other/a.txt")),
            PathBuf::from("../other/a.txt")
        );
        assert_eq!(relative_path(base, base), PathBuf::from("."));
        assert_eq!(relative_path(base, Path::new("/home/me")), PathBuf::from(".."));
    }
}
