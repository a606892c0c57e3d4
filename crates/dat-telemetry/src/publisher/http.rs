//! Publisher for a broker's HTTP management API.
//!
//! Payloads are posted to `{base_url}/api/exchanges/{vhost}/{exchange}/publish`
//! with the queue name as routing key, the shape the RabbitMQ management
//! plugin accepts. The broker answers `{"routed": bool}`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use super::Publisher;
use crate::TelemetryError;

fn default_vhost() -> String {
    "/".to_string()
}

fn default_exchange() -> String {
    "amq.default".to_string()
}

fn default_timeout() -> u64 {
    30
}

/// HTTP queue publisher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpQueueConfig {
    /// Management API root, e.g. `http://message-queue:15672`.
    pub base_url: String,
    #[serde(default = "default_vhost")]
    pub vhost: String,
    #[serde(default = "default_exchange")]
    pub exchange: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl HttpQueueConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            vhost: default_vhost(),
            exchange: default_exchange(),
            username: None,
            password: None,
            timeout_secs: default_timeout(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PublishResponse {
    routed: bool,
}

pub struct HttpQueuePublisher {
    config: HttpQueueConfig,
    endpoint: Url,
    client: Client,
}

impl HttpQueuePublisher {
    pub fn new(config: HttpQueueConfig) -> Result<Self, TelemetryError> {
        let endpoint = publish_endpoint(&config)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();

        Ok(Self {
            config,
            endpoint,
            client,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

fn publish_endpoint(config: &HttpQueueConfig) -> Result<Url, TelemetryError> {
    let invalid = |reason: String| TelemetryError::Rejected {
        queue: String::new(),
        reason,
    };
    let mut url = Url::parse(&config.base_url)
        .map_err(|e| invalid(format!("invalid base url {}: {e}", config.base_url)))?;
    url.path_segments_mut()
        .map_err(|_| invalid(format!("base url {} cannot be a base", config.base_url)))?
        .pop_if_empty()
        .extend([
            "api",
            "exchanges",
            config.vhost.as_str(),
            config.exchange.as_str(),
            "publish",
        ]);
    Ok(url)
}

fn publish_body(queue: &str, payload: &str) -> serde_json::Value {
    json!({
        "properties": { "content_type": "application/json", "delivery_mode": 2 },
        "routing_key": queue,
        "payload": payload,
        "payload_encoding": "string",
    })
}

#[async_trait]
impl Publisher for HttpQueuePublisher {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn publish(&self, queue: &str, payload: &str) -> Result<(), TelemetryError> {
        let mut request = self
            .client
            .post(self.endpoint.clone())
            .json(&publish_body(queue, payload));

        if let Some(username) = &self.config.username {
            request = request.basic_auth(username, self.config.password.as_ref());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TelemetryError::Rejected {
                queue: queue.to_string(),
                reason: format!("{status} - {body}"),
            });
        }

        let outcome: PublishResponse = response.json().await?;
        if !outcome.routed {
            return Err(TelemetryError::Rejected {
                queue: queue.to_string(),
                reason: "message was not routed".to_string(),
            });
        }

        debug!(queue, endpoint = %self.endpoint, "Telemetry published");
        Ok(())
    }
}
