use serde::{Deserialize, Serialize};

/// Base configuration every connector carries.
///
/// The core only reads `module_name` (the plugin package) and `name` (the
/// concrete implementation inside it). Everything else is kept verbatim so the
/// resolved plugin can re-parse the same document into its own type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorSpecification {
    pub module_name: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub connection_specification: serde_json::Value,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ConnectorSpecification {
    pub fn new(module_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            module_name: module_name.into(),
            name: name.into(),
            connection_specification: serde_json::Value::Null,
            extra: serde_json::Map::new(),
        }
    }

    /// `module_name.name`, used in logs and error messages.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.module_name, self.name)
    }
}
