//! Per-stream resumption checkpoints.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StreamStatus {
    #[default]
    Started,
    Running,
    Completed,
}

/// Checkpoint of a single stream. `data` is owned by the source plugin.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamState {
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub stream_status: StreamStatus,
}

/// Checkpoints of every stream, keyed by stream name.
pub type CombinedState = BTreeMap<String, StreamState>;
