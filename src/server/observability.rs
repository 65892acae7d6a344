//! Structured logging and tracing configuration.
//!
//! Provides setup for observability using the `tracing` crate with:
//! - Plain or JSON output
//! - Log level from `RUST_LOG`, falling back to the configured level
//! - Spans for connections and queries

use tracing_subscriber::{
    filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, Registry,
};

use crate::Result;

/// Initialize tracing with the given level and output format.
///
/// `RUST_LOG`, when set, takes precedence over `level`.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing(level: &str, json: bool) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let installed = if json {
        let json_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .with_writer(std::io::stderr);

        Registry::default()
            .with(env_filter)
            .with(json_layer)
            .try_init()
    } else {
        let fmt_layer = fmt::layer()
            .with_target(true)
            .with_thread_names(true)
            .with_writer(std::io::stderr);

        Registry::default().with(env_filter).with(fmt_layer).try_init()
    };

    installed.map_err(|e| crate::Error::internal(format!("tracing init failed: {e}")))?;

    tracing::debug!("Tracing initialized: level={}, json={}", level, json);
    Ok(())
}

/// Spans shared by the socket server.
pub mod spans {
    use tracing::{info_span, Span};

    /// Span covering one client connection.
    #[must_use]
    pub fn connection_span(id: u64) -> Span {
        info_span!("connection", id)
    }

    /// Span covering one request on a connection.
    #[must_use]
    pub fn request_span(kind: &str) -> Span {
        info_span!("request", kind = %kind)
    }
}
