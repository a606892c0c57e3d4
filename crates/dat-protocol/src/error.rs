use std::backtrace::{Backtrace, BacktraceStatus};
use std::fmt::Write;

use thiserror::Error;

/// Error raised by a connector plugin while discovering, reading, generating
/// or writing.
#[derive(Error, Debug)]
pub enum ConnectorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Source error: {0}")]
    Source(String),

    #[error("Generator error: {0}")]
    Generator(String),

    #[error("Destination error: {0}")]
    Destination(String),

    #[error("{0}")]
    Other(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ConnectorError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn generator(msg: impl Into<String>) -> Self {
        Self::Generator(msg.into())
    }

    pub fn destination(msg: impl Into<String>) -> Self {
        Self::Destination(msg.into())
    }
}

/// Render the diagnostic trace attached to `LOG` error messages.
///
/// The first line is the error itself, followed by one `caused by:` line per
/// source in the chain. When `RUST_BACKTRACE` enables capture, the backtrace of
/// the reporting site is appended.
pub fn diagnostic_trace(err: &(dyn std::error::Error + 'static)) -> String {
    let mut trace = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let _ = write!(trace, "\ncaused by: {cause}");
        source = cause.source();
    }

    let backtrace = Backtrace::capture();
    if backtrace.status() == BacktraceStatus::Captured {
        let _ = write!(trace, "\n\n{backtrace}");
    }
    trace
}
