//! Global ignore list applied to every path before it reaches the index.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use ignore::gitignore::{Gitignore, GitignoreBuilder};

use crate::error::IgnoreError;
use crate::Result;

/// Built-in exclusions: VCS metadata, OS caches and toolchain caches.
const BUILTIN_PATTERNS: &[&str] = &[
    ".git/",
    ".svn/",
    ".cvs/",
    ".hg/",
    "node_modules/",
    "Application Support/",
    ".cache/",
    ".DS_Store",
    ".Trash",
    "**/.rustup/toolchains",
    "**/.rustup/update-hashes",
    "**/.rustup/tmp",
    "**/.rustup/downloads",
    "**/pkg/darwin_amd64/",
    "**/pkg/darwin_arm64/",
];

/// Go toolchain variables whose values are cache or install directories.
const GO_ENV_KEYS: &[&str] = &["GOMODCACHE", "GOCACHE", "GOTOOLDIR", "GOROOT"];

/// Global ignore settings.
#[derive(Debug, Clone, Default)]
pub struct IgnoreConfig {
    /// Additional gitignore-style patterns.
    pub extra_patterns: Vec<String>,
    /// Query `go env -json` for toolchain directories.
    pub probe_go_env: bool,
}

/// Compiled global ignore list rooted at `/`.
#[derive(Debug)]
pub struct GlobalIgnore {
    matcher: Gitignore,
    lines: Vec<String>,
}

impl GlobalIgnore {
    /// Build the global list from built-ins, the process environment and
    /// configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured pattern fails to compile.
    pub fn new(config: &IgnoreConfig) -> Result<Self> {
        let go_vars = if config.probe_go_env {
            go_env().unwrap_or_else(|e| {
                tracing::debug!(error = %e, "go env unavailable, skipping toolchain paths");
                HashMap::new()
            })
        } else {
            HashMap::new()
        };

        let lines = collect_lines(
            config,
            |key| std::env::var(key).ok(),
            &go_vars,
            dirs::home_dir().as_deref(),
        );
        Self::from_lines(lines)
    }

    /// Compile an explicit list of gitignore-style lines.
    ///
    /// # Errors
    ///
    /// Returns an error if any line fails to compile.
    pub fn from_lines(lines: Vec<String>) -> Result<Self> {
        let mut builder = GitignoreBuilder::new("/");
        for line in &lines {
            builder
                .add_line(None, line)
                .map_err(|e| IgnoreError::InvalidPattern {
                    pattern: line.clone(),
                    reason: e.to_string(),
                })?;
        }

        let matcher = builder.build().map_err(|e| IgnoreError::InvalidPattern {
            pattern: "<global>".to_string(),
            reason: e.to_string(),
        })?;

        tracing::debug!(patterns = lines.len(), "Global ignore list compiled");
        Ok(Self { matcher, lines })
    }

    /// Check whether `path` or any of its ancestors is excluded.
    ///
    /// Ancestors are tested as directories, shallowest first; the path itself
    /// is tested with the caller's `is_dir`.
    #[must_use]
    pub fn is_match(&self, path: &str, is_dir: bool) -> bool {
        for (idx, _) in path.match_indices('/').filter(|(idx, _)| *idx > 0) {
            if self.matcher.matched(Path::new(&path[..idx]), true).is_ignore() {
                return true;
            }
        }

        let leaf = path.trim_end_matches('/');
        !leaf.is_empty() && self.matcher.matched(Path::new(leaf), is_dir).is_ignore()
    }

    /// Source lines the list was compiled from.
    #[must_use]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

/// Assemble the global ignore lines.
///
/// `env` looks up process environment variables and `go_vars` holds the
/// output of `go env -json` (possibly empty).
pub fn collect_lines<F>(
    config: &IgnoreConfig,
    env: F,
    go_vars: &HashMap<String, String>,
    home: Option<&Path>,
) -> Vec<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut lines: Vec<String> = BUILTIN_PATTERNS.iter().map(|p| (*p).to_string()).collect();

    let mut push = |value: String| {
        if !value.is_empty() && !lines.contains(&value) {
            lines.push(value);
        }
    };

    for key in GO_ENV_KEYS {
        if let Some(value) = env(key) {
            push(value);
        }
    }

    if let Some(gopath) = env("GOPATH").filter(|v| !v.is_empty()) {
        push(PathBuf::from(gopath).join("pkg").to_string_lossy().into_owned());
    }

    for key in GO_ENV_KEYS {
        if let Some(value) = go_vars.get(*key) {
            push(value.clone());
        }
    }

    if cfg!(target_os = "macos") {
        if let Some(home) = home {
            push(home.join("Library").to_string_lossy().into_owned());
        }
    }

    for pattern in &config.extra_patterns {
        push(pattern.trim().to_string());
    }

    lines
}

/// Run `go env -json` and parse its output.
fn go_env() -> std::io::Result<HashMap<String, String>> {
    let output = Command::new("go").args(["env", "-json"]).output()?;
    if !output.status.success() {
        return Err(std::io::Error::other(format!(
            "go env exited with {}",
            output.status
        )));
    }

    serde_json::from_slice(&output.stdout).map_err(std::io::Error::other)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builtin() -> GlobalIgnore {
        let lines = collect_lines(&IgnoreConfig::default(), |_| None, &HashMap::new(), None);
        GlobalIgnore::from_lines(lines).unwrap()
    }

    #[test]
    fn test_vcs_dirs_ignored() {
        let global = builtin();
        assert!(global.is_match("/foo/bar/.git/baz", false));
        assert!(global.is_match("/foo/bar/.git", true));
        assert!(global.is_match("/repo/.svn/entries", false));
        assert!(!global.is_match("/foo/bar/src/main.rs", false));
    }

    #[test]
    fn test_nested_patterns() {
        let global = builtin();
        assert!(global.is_match("/foo/bar/Library/Application Support/foo/bar", false));
        assert!(global.is_match("/Users/alice/.Trash/Library/foo/bar", false));
        assert!(global.is_match("/home/alice/.rustup/toolchains/stable/bin/cargo", false));
        assert!(global.is_match("/web/node_modules", true));
    }

    #[test]
    fn test_dir_pattern_does_not_match_file() {
        let global = builtin();
        assert!(!global.is_match("/web/node_modules", false));
    }

    #[test]
    fn test_env_paths_are_anchored() {
        let env = |key: &str| match key {
            "GOMODCACHE" => Some("/home/alice/go/pkg/mod".to_string()),
            "GOPATH" => Some("/opt/go".to_string()),
            _ => None,
        };
        let mut go_vars = HashMap::new();
        go_vars.insert("GOROOT".to_string(), "/usr/local/go".to_string());

        let lines = collect_lines(&IgnoreConfig::default(), env, &go_vars, None);
        assert!(lines.contains(&"/home/alice/go/pkg/mod".to_string()));
        assert!(lines.contains(&"/opt/go/pkg".to_string()));
        assert!(lines.contains(&"/usr/local/go".to_string()));

        let global = GlobalIgnore::from_lines(lines).unwrap();
        assert!(global.is_match("/home/alice/go/pkg/mod/github.com/x/y.go", false));
        assert!(global.is_match("/usr/local/go/src/fmt/print.go", false));
        assert!(!global.is_match("/srv/usr/local/go/main.go", false));
        assert!(!global.is_match("/home/alice/go/src/main.go", false));
    }

    #[test]
    fn test_extra_patterns_and_dedup() {
        let config = IgnoreConfig {
            extra_patterns: vec!["*.swp".to_string(), ".git/".to_string()],
            probe_go_env: false,
        };
        let lines = collect_lines(&config, |_| None, &HashMap::new(), None);
        assert_eq!(lines.iter().filter(|l| *l == ".git/").count(), 1);

        let global = GlobalIgnore::from_lines(lines).unwrap();
        assert!(global.is_match("/src/.main.rs.swp", false));
        assert!(global.lines().contains(&"*.swp".to_string()));
    }

    #[test]
    fn test_root_never_matches() {
        assert!(!builtin().is_match("/", true));
    }
}
