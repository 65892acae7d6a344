//! PID file guarding against a second cache on the same socket.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ServerError;
use crate::Result;

/// PID file owned by this process; removed on drop.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
    pid: u32,
}

impl PidFile {
    /// Write the current PID to `path`.
    ///
    /// An existing PID file is only honored while something still answers on
    /// `socket`; otherwise it is stale and replaced.
    ///
    /// # Errors
    ///
    /// Returns an error if another instance is running or the file cannot be
    /// written.
    pub fn acquire(path: impl AsRef<Path>, socket: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let socket = socket.as_ref();

        if let Ok(existing) = fs::read_to_string(path) {
            let existing = existing.trim().to_string();
            if std::os::unix::net::UnixStream::connect(socket).is_ok() {
                return Err(ServerError::AlreadyRunning { pid: existing }.into());
            }
            tracing::info!(pid_file = %path.display(), stale_pid = %existing, "Replacing stale PID file");
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let pid = std::process::id();
        fs::write(path, format!("{pid}\n"))?;
        tracing::debug!(pid_file = %path.display(), pid, "PID file written");

        Ok(Self {
            path: path.to_path_buf(),
            pid,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub const fn pid(&self) -> u32 {
        self.pid
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        // Leave the file alone if another process has taken it over.
        let owned = fs::read_to_string(&self.path)
            .map(|content| content.trim() == self.pid.to_string())
            .unwrap_or(false);
        if owned {
            if let Err(e) = fs::remove_file(&self.path) {
                tracing::warn!(pid_file = %self.path.display(), error = %e, "Failed to remove PID file");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixListener;
    use tempfile::TempDir;

    #[test]
    fn test_acquire_writes_and_removes() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("run/fscache.pid");
        let socket = tmp.path().join("fscache.socket");

        let pid = PidFile::acquire(&path, &socket).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.trim(), std::process::id().to_string());
        assert_eq!(pid.path(), path.as_path());

        drop(pid);
        assert!(!path.exists());
    }

    #[test]
    fn test_stale_pid_file_replaced() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("fscache.pid");
        fs::write(&path, "999999\n").unwrap();

        let pid = PidFile::acquire(&path, tmp.path().join("missing.socket")).unwrap();
        assert_eq!(pid.pid(), std::process::id());
    }

    #[test]
    fn test_live_socket_blocks_acquire() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("fscache.pid");
        let socket = tmp.path().join("fscache.socket");
        fs::write(&path, "4242\n").unwrap();
        let _listener = UnixListener::bind(&socket).unwrap();

        let err = PidFile::acquire(&path, &socket).unwrap_err();
        assert!(err.to_string().contains("already running (pid 4242)"));
        assert!(path.exists());
    }
}
