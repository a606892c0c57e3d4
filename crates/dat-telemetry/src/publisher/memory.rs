use async_trait::async_trait;
use parking_lot::Mutex;

use super::Publisher;
use crate::{TelemetryError, TelemetryMessage};

/// Records every `(queue, payload)` pair in publish order.
#[derive(Debug, Default)]
pub struct MemoryPublisher {
    published: Mutex<Vec<(String, String)>>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<(String, String)> {
        self.published.lock().clone()
    }

    /// Published payloads decoded as telemetry messages. Payloads of another
    /// shape are skipped.
    pub fn messages(&self) -> Vec<TelemetryMessage> {
        self.published
            .lock()
            .iter()
            .filter_map(|(_, payload)| serde_json::from_str(payload).ok())
            .collect()
    }
}

#[async_trait]
impl Publisher for MemoryPublisher {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn publish(&self, queue: &str, payload: &str) -> Result<(), TelemetryError> {
        self.published
            .lock()
            .push((queue.to_string(), payload.to_string()));
        Ok(())
    }
}
