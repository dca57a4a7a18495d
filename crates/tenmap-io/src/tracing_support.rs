//! Structured logging support for TenMap applications
//!
//! The library crates only emit `tracing` events and spans: key moves in
//! `tenmap-core` open `debug` spans, container reads and writes log their
//! progress here. This module installs a subscriber to display them.
//!
//! # Features
//!
//! - **Structured logging**: pretty, compact and JSON formats
//! - **Event filtering**: `EnvFilter` directives, from `RUST_LOG` by default
//! - **I/O records**: size and throughput of container files
//!
//! # Example
//!
//! ```
//! use tenmap_io::tracing_support::{init_tracing, TracingConfig, TracingFormat};
//!
//! let config = TracingConfig {
//!     format: TracingFormat::Compact,
//!     filter: "tenmap_io=debug,info".to_string(),
//!     ..TracingConfig::default()
//! };
//! init_tracing(config).unwrap();
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: filter directives (e.g. `RUST_LOG=tenmap_core=debug`)
//! - `TENMAP_LOG_FORMAT`: output format (`json`, `compact` or `pretty`,
//!   default: `pretty`)
//!
//! Without the `subscriber` feature, [`init_tracing`] does nothing and the
//! application is free to install its own subscriber.

use anyhow::Result;
#[cfg(feature = "subscriber")]
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Filter used when `RUST_LOG` is not set
pub const DEFAULT_FILTER: &str = "tenmap_io=info,tenmap_core=info,warn";

/// Tracing output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TracingFormat {
    /// Pretty-printed human-readable format
    Pretty,
    /// JSON format for structured logging
    Json,
    /// Compact format (single line per event)
    Compact,
}

impl TracingFormat {
    /// Parse from string, falling back to [`TracingFormat::Pretty`]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => TracingFormat::Json,
            "compact" => TracingFormat::Compact,
            _ => TracingFormat::Pretty,
        }
    }
}

/// Tracing configuration
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TracingConfig {
    /// Output format
    pub format: TracingFormat,
    /// Filter directive (e.g., "tenmap_io=debug,info")
    pub filter: String,
    /// Enable ANSI colors
    pub with_ansi: bool,
    /// Show target module paths
    pub with_target: bool,
    /// Show thread IDs
    pub with_thread_ids: bool,
    /// Show file locations
    pub with_file: bool,
    /// Show line numbers
    pub with_line_number: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        let format = std::env::var("TENMAP_LOG_FORMAT")
            .map(|s| TracingFormat::parse(&s))
            .unwrap_or(TracingFormat::Pretty);

        let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_FILTER.to_string());

        Self {
            format,
            filter,
            with_ansi: true,
            with_target: true,
            with_thread_ids: false,
            with_file: false,
            with_line_number: false,
        }
    }
}

/// Install a global subscriber with the given configuration
///
/// Call once at application startup. A second call fails, since a global
/// subscriber is already set.
///
/// # Errors
///
/// Returns an error if the filter directives are invalid or a global
/// subscriber is already installed.
#[cfg(feature = "subscriber")]
pub fn init_tracing(config: TracingConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&config.filter)?;

    match config.format {
        TracingFormat::Pretty => {
            let fmt_layer = fmt::layer()
                .pretty()
                .with_ansi(config.with_ansi)
                .with_target(config.with_target)
                .with_thread_ids(config.with_thread_ids)
                .with_file(config.with_file)
                .with_line_number(config.with_line_number)
                .with_filter(filter);

            tracing_subscriber::registry().with(fmt_layer).try_init()?;
        }
        TracingFormat::Json => {
            let fmt_layer = fmt::layer()
                .json()
                .with_target(config.with_target)
                .with_thread_ids(config.with_thread_ids)
                .with_file(config.with_file)
                .with_line_number(config.with_line_number)
                .with_filter(filter);

            tracing_subscriber::registry().with(fmt_layer).try_init()?;
        }
        TracingFormat::Compact => {
            let fmt_layer = fmt::layer()
                .compact()
                .with_ansi(config.with_ansi)
                .with_target(config.with_target)
                .with_thread_ids(config.with_thread_ids)
                .with_file(config.with_file)
                .with_line_number(config.with_line_number)
                .with_filter(filter);

            tracing_subscriber::registry().with(fmt_layer).try_init()?;
        }
    }

    Ok(())
}

/// Stub for when the `subscriber` feature is disabled
#[cfg(not(feature = "subscriber"))]
pub fn init_tracing(_config: TracingConfig) -> Result<()> {
    Ok(())
}

/// Record the size and throughput of a container file operation
pub fn record_io(operation: &str, path: &str, bytes: u64, duration_ms: u64) {
    let mb = bytes as f64 / 1024.0 / 1024.0;
    tracing::info!(
        operation = operation,
        path = path,
        bytes = bytes,
        duration_ms = duration_ms,
        throughput_mbps = mb / (duration_ms.max(1) as f64 / 1000.0),
        "io_operation"
    );
}

/// Record the size of an in-memory container
pub fn record_bytes(operation: &str, bytes: usize) {
    tracing::debug!(
        operation = operation,
        bytes = bytes,
        mb = bytes as f64 / 1024.0 / 1024.0,
        "bytes_processed"
    );
}
