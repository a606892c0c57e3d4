use thiserror::Error;

/// Failure to hand a telemetry payload to the channel.
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Publish to queue {queue} rejected: {reason}")]
    Rejected { queue: String, reason: String },
}
