//! Logging setup for the `dat` binary.
//!
//! Logs always go to stderr: stdout carries protocol messages.

use anyhow::{Result, anyhow};
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LOG_FILTER: &str = "info";

/// Pick the filter: `-q` and `-v` win over `--log-level`, which wins over
/// `RUST_LOG`.
pub fn log_filter(log_level: Option<&str>, verbose: bool, quiet: bool) -> Result<EnvFilter> {
    if quiet {
        return Ok(EnvFilter::new("error"));
    }
    if verbose {
        return Ok(EnvFilter::new("debug"));
    }
    match log_level {
        Some(directive) => EnvFilter::try_new(directive)
            .map_err(|e| anyhow!("Invalid log level '{directive}': {e}")),
        None => Ok(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))),
    }
}

pub fn init_logging(log_level: Option<&str>, verbose: bool, quiet: bool, json: bool) -> Result<()> {
    let filter = log_filter(log_level, verbose, quiet)?;

    let fmt_layer = if json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(verbose)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| anyhow!("Failed to set global default subscriber: {e}"))
}
