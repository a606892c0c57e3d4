use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::specification::ConnectorSpecification;
use crate::state::CombinedState;

/// One configured pipeline instance: source, generator and destination plus
/// the streams to move. `id` scopes all telemetry of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub source: ConnectorSpecification,
    pub generator: ConnectorSpecification,
    pub destination: ConnectorSpecification,
    #[serde(default)]
    pub catalog: Catalog,
    #[serde(default)]
    pub state: CombinedState,
}

impl Connection {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}
