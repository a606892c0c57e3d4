//! The message envelope exchanged between pipeline stages.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::diagnostic_trace;
use crate::state::StreamState;

/// Discriminator of a [`Message`], serialized as the `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    Record,
    State,
    Log,
    ConnectionStatus,
}

impl MessageType {
    /// Wire representation of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Record => "RECORD",
            MessageType::State => "STATE",
            MessageType::Log => "LOG",
            MessageType::ConnectionStatus => "CONNECTION_STATUS",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of communication between stages.
///
/// Serialized as a single JSON object whose `type` tag selects the populated
/// payload field, e.g. `{"type":"LOG","log":{"level":"INFO","message":"x"}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    Record { record: RecordMessage },
    State { state: StateMessage },
    Log { log: LogMessage },
    ConnectionStatus { connection_status: ConnectionStatus },
}

impl Message {
    pub fn record(record: RecordMessage) -> Self {
        Self::Record { record }
    }

    pub fn state(state: StateMessage) -> Self {
        Self::State { state }
    }

    pub fn log(level: Level, message: impl Into<String>) -> Self {
        Self::Log {
            log: LogMessage {
                level,
                message: message.into(),
                stack_trace: None,
            },
        }
    }

    /// Build the `LOG`/`ERROR` message a stage emits in place of a failure.
    pub fn error_log(err: &(dyn std::error::Error + 'static)) -> Self {
        Self::Log {
            log: LogMessage {
                level: Level::Error,
                message: err.to_string(),
                stack_trace: Some(diagnostic_trace(err)),
            },
        }
    }

    pub fn connection_status(status: Status, message: Option<String>) -> Self {
        Self::ConnectionStatus {
            connection_status: ConnectionStatus { status, message },
        }
    }

    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Record { .. } => MessageType::Record,
            Message::State { .. } => MessageType::State,
            Message::Log { .. } => MessageType::Log,
            Message::ConnectionStatus { .. } => MessageType::ConnectionStatus,
        }
    }

    pub fn as_record(&self) -> Option<&RecordMessage> {
        match self {
            Message::Record { record } => Some(record),
            _ => None,
        }
    }

    pub fn as_log(&self) -> Option<&LogMessage> {
        match self {
            Message::Log { log } => Some(log),
            _ => None,
        }
    }

    /// Serialize to a single protocol line, without the trailing newline.
    ///
    /// JSON string escaping guarantees the output never contains a raw newline.
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}

/// Extract the raw `type` tag of a protocol line without decoding the payload.
///
/// Returns `None` when the line is not a JSON object or has no string `type`.
/// Unknown kinds are returned as-is so pass-through stages can forward them.
pub fn peek_type(line: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct Tag {
        #[serde(rename = "type")]
        kind: String,
    }

    serde_json::from_str::<Tag>(line).ok().map(|tag| tag.kind)
}

/// Reference to the logical stream a record or state belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl StreamRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMessage {
    pub stream: StreamRef,
    pub data: serde_json::Value,
    /// Emission time in milliseconds since the Unix epoch.
    #[serde(default)]
    pub emitted_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl RecordMessage {
    pub fn new(stream: StreamRef, data: serde_json::Value) -> Self {
        Self {
            stream,
            data,
            emitted_at: chrono::Utc::now().timestamp_millis(),
            namespace: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateMessage {
    pub stream: StreamRef,
    pub stream_state: StreamState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Fatal,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogMessage {
    pub level: Level,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
