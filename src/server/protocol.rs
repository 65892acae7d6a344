//! JSON-lines wire protocol.
//!
//! Every message is one JSON object per line, discriminated by a `type`
//! field. A `list` request is answered by zero or more `files` batches and a
//! closing `end`, or by a single `error`.

use serde::{Deserialize, Serialize};

use crate::error::ServerError;
use crate::storage::{FetchOptions, PathEntry};
use crate::Result;

/// Batch size used when a request leaves it unset or non-positive.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Longest request line accepted by the server.
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Client request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Stream entries under a prefix.
    List(ListRequest),
    /// Stop the cache, optionally asking the supervisor to restart it.
    Shutdown {
        #[serde(default)]
        restart: bool,
    },
    /// Report root, entry count, state and metrics.
    Status,
}

/// Parameters of a `list` request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    pub limit: i64,
    pub dirs_only: bool,
    pub files_only: bool,
    pub batch_size: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_dir: Option<String>,
}

impl ListRequest {
    /// Entries per `files` response.
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size_or(DEFAULT_BATCH_SIZE)
    }

    /// Entries per `files` response, with the server's own default.
    #[must_use]
    pub fn batch_size_or(&self, fallback: usize) -> usize {
        usize::try_from(self.batch_size)
            .ok()
            .filter(|size| *size > 0)
            .unwrap_or(fallback)
    }

    /// Translate into store fetch options.
    #[must_use]
    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            prefix: self.prefix.clone().filter(|p| !p.is_empty()),
            limit: self.limit,
            dirs_only: self.dirs_only,
            files_only: self.files_only,
            current_dir: self.current_dir.clone().filter(|c| !c.is_empty()),
        }
    }
}

/// One entry in a `files` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileItem {
    pub name: String,
    pub dir: bool,
}

impl From<PathEntry> for FileItem {
    fn from(entry: PathEntry) -> Self {
        Self {
            name: entry.name,
            dir: entry.is_dir,
        }
    }
}

/// Server response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// A batch of entries.
    Files { files: Vec<FileItem> },
    /// End of a `list` stream.
    End { count: u64 },
    /// The request failed; no further responses follow for it.
    Error { message: String },
    /// Shutdown accepted.
    ShuttingDown { restart: bool },
    /// Status report.
    Status(StatusReport),
}

/// Body of a `status` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub root: String,
    pub entries: u64,
    pub state: String,
    /// Prometheus text exposition.
    pub metrics: String,
}

/// Encode a message as a single line, without the trailing newline.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode<T: Serialize>(message: &T) -> Result<String> {
    serde_json::to_string(message).map_err(|e| ServerError::Protocol(e.to_string()).into())
}

/// Decode one line.
///
/// # Errors
///
/// Returns an error if the line is not a valid message.
pub fn decode<T: for<'de> Deserialize<'de>>(line: &str) -> Result<T> {
    serde_json::from_str(line).map_err(|e| ServerError::Protocol(e.to_string()).into())
}
