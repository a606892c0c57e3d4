use async_trait::async_trait;
use tracing::info;

use super::Publisher;
use crate::TelemetryError;

/// Emits each payload as an `info!` event instead of sending it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPublisher;

#[async_trait]
impl Publisher for LogPublisher {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn publish(&self, queue: &str, payload: &str) -> Result<(), TelemetryError> {
        info!(target: "dat::telemetry", queue, payload, "Telemetry");
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPublisher;

#[async_trait]
impl Publisher for NoopPublisher {
    fn name(&self) -> &'static str {
        "none"
    }

    async fn publish(&self, _queue: &str, _payload: &str) -> Result<(), TelemetryError> {
        Ok(())
    }
}
