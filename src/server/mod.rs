//! Local socket server and client.
//!
//! This module provides:
//! - The accept loop and per-connection request handling
//! - The JSON-lines wire protocol and a client for it
//! - Prometheus metrics, tracing setup and the PID file

mod app;
mod client;
pub mod metrics;
mod observability;
mod pid;
pub mod protocol;

pub use app::{serve, shutdown_signal};
pub use client::Client;
pub use metrics::init_metrics;
pub use observability::{init_tracing, spans};
pub use pid::PidFile;
pub use protocol::{FileItem, ListRequest, Request, Response, StatusReport};
