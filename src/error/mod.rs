//! Error types and Result aliases for fscache.
//!
//! This module defines the error hierarchy used throughout the crate.
//! All public functions return `Result<T, Error>` or `Result<T>`.

use thiserror::Error;

/// Result type alias using fscache's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for fscache operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Index storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// File watching error.
    #[error("watcher error: {0}")]
    Watcher(#[from] WatcherError),

    /// Ignore rule error.
    #[error("ignore error: {0}")]
    Ignore(#[from] IgnoreError),

    /// Socket server/protocol error.
    #[error("server error: {0}")]
    Server(#[from] ServerError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Storage-specific errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backend database error.
    #[error("database error: {0}")]
    Database(String),

    /// Stored value could not be encoded or decoded.
    #[error("encoding error for key '{key}': {reason}")]
    Encoding { key: String, reason: String },

    /// Schema migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// The store has already been closed.
    #[error("store is closed")]
    Closed,
}

/// File watcher errors.
#[derive(Error, Debug)]
pub enum WatcherError {
    /// Failed to watch path.
    #[error("failed to watch path '{path}': {reason}")]
    WatchFailed { path: String, reason: String },

    /// The watcher was stopped before it could be started.
    #[error("watcher already stopped")]
    Stopped,
}

/// Ignore rule errors.
#[derive(Error, Debug)]
pub enum IgnoreError {
    /// Ignore file could not be parsed or compiled.
    #[error("invalid ignore file '{path}': {reason}")]
    InvalidFile { path: String, reason: String },

    /// A single pattern failed to compile.
    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// Server/protocol errors.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Failed to bind to the socket path.
    #[error("failed to bind to {address}: {reason}")]
    BindFailed { address: String, reason: String },

    /// Failed to connect to a running cache.
    #[error("failed to connect to {address}: {reason}")]
    ConnectFailed { address: String, reason: String },

    /// Request handling error.
    #[error("request error: {0}")]
    Request(String),

    /// Malformed or unexpected protocol message.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Another instance owns the socket.
    #[error("fscache is already running (pid {pid})")]
    AlreadyRunning { pid: String },
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl StorageError {
    /// Create a database error from any displayable backend error.
    pub fn database(err: impl std::fmt::Display) -> Self {
        Self::Database(err.to_string())
    }

    /// Create an encoding error for a key.
    pub fn encoding(key: &[u8], reason: impl std::fmt::Display) -> Self {
        Self::Encoding {
            key: String::from_utf8_lossy(key).into_owned(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests;
