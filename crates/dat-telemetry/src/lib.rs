//! # dat Telemetry
//!
//! Mirrors job progress to an external telemetry channel.
//!
//! [`TelemetryPublisher`] scopes every payload to a connection id and hands it
//! to an injected [`Publisher`]. Publishing is fire-and-forget: a failed
//! publish is logged and never reaches the caller.

mod error;
pub mod publisher;
mod telemetry;

pub use error::TelemetryError;
pub use publisher::{
    HttpQueueConfig, HttpQueuePublisher, LogPublisher, MemoryPublisher, NoopPublisher, Publisher,
};
pub use telemetry::{DEFAULT_QUEUE, TelemetryMessage, TelemetryPublisher};
