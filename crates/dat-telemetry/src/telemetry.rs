use std::sync::Arc;

use dat_protocol::Message;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::publisher::Publisher;

/// Queue receiving telemetry unless configured otherwise.
pub const DEFAULT_QUEUE: &str = "dat-telemetry-q";

/// Payload published to the telemetry queue.
///
/// `dat_message` is the message as JSON; fields the protocol types do not
/// know are kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryMessage {
    pub connection_id: String,
    pub dat_message: Value,
}

/// Fire-and-forget telemetry for one queue.
#[derive(Clone)]
pub struct TelemetryPublisher {
    publisher: Arc<dyn Publisher>,
    queue: String,
}

impl TelemetryPublisher {
    pub fn new(publisher: Arc<dyn Publisher>) -> Self {
        Self::with_queue(publisher, DEFAULT_QUEUE)
    }

    pub fn with_queue(publisher: Arc<dyn Publisher>, queue: impl Into<String>) -> Self {
        Self {
            publisher,
            queue: queue.into(),
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Publish `message` scoped to `connection_id`.
    ///
    /// Failures are logged and swallowed; nothing is retried.
    pub async fn publish(&self, connection_id: &str, message: Value) {
        let telemetry = TelemetryMessage {
            connection_id: connection_id.to_string(),
            dat_message: message,
        };
        let payload = match serde_json::to_string(&telemetry) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(connection_id, error = %e, "Failed to serialize telemetry message");
                return;
            }
        };

        match self.publisher.publish(&self.queue, &payload).await {
            Ok(()) => debug!(connection_id, queue = %self.queue, "Published telemetry"),
            Err(e) => warn!(
                connection_id,
                queue = %self.queue,
                publisher = self.publisher.name(),
                error = %e,
                "Failed to publish telemetry"
            ),
        }
    }

    /// Publish a typed protocol message.
    pub async fn publish_message(&self, connection_id: &str, message: &Message) {
        match serde_json::to_value(message) {
            Ok(value) => self.publish(connection_id, value).await,
            Err(e) => warn!(connection_id, error = %e, "Failed to serialize message"),
        }
    }
}
