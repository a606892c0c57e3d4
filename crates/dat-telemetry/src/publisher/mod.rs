//! Telemetry transports.
//!
//! - [`HttpQueuePublisher`]: HTTP publish endpoint of a message broker
//! - [`LogPublisher`]: logs payloads, for dry runs
//! - [`MemoryPublisher`]: keeps payloads in memory, for tests
//! - [`NoopPublisher`]: discards payloads

mod http;
mod log;
mod memory;

pub use http::{HttpQueueConfig, HttpQueuePublisher};
pub use log::{LogPublisher, NoopPublisher};
pub use memory::MemoryPublisher;

use async_trait::async_trait;

use crate::TelemetryError;

/// Capability to put a payload on a named queue.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Transport name used in diagnostics.
    fn name(&self) -> &'static str;

    /// Put `payload` on `queue`.
    async fn publish(&self, queue: &str, payload: &str) -> Result<(), TelemetryError>;
}
