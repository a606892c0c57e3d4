//! Record-level generators.

use dat_protocol::{ConnectorError, Message};
use pipeline_common::{Generator, GeneratorPlugin, MessageStream};
use serde::Deserialize;
use serde::de::IgnoredAny;
use serde_json::{Map, Value};

use crate::PluginSpec;

/// Forwards every record unchanged. Takes no options.
pub struct Passthrough;

impl GeneratorPlugin for Passthrough {
    type Spec = IgnoredAny;

    fn from_spec(_spec: Self::Spec) -> Result<Self, ConnectorError> {
        Ok(Self)
    }
}

impl Generator for Passthrough {
    fn generate(&mut self, message: Message) -> MessageStream<'_> {
        Box::new(std::iter::once(Ok(message)))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SelectFieldsOptions {
    pub fields: Vec<String>,
}

/// Keeps only the listed top-level keys of each record's `data` object.
///
/// Missing keys are skipped. A record whose data is not an object fails.
pub struct SelectFields {
    fields: Vec<String>,
}

impl GeneratorPlugin for SelectFields {
    type Spec = PluginSpec<SelectFieldsOptions>;

    fn from_spec(spec: Self::Spec) -> Result<Self, ConnectorError> {
        let fields = spec.connection_specification.fields;
        if fields.is_empty() {
            return Err(ConnectorError::config("fields must not be empty"));
        }
        Ok(Self { fields })
    }
}

impl Generator for SelectFields {
    fn generate(&mut self, message: Message) -> MessageStream<'_> {
        let mut record = match message {
            Message::Record { record } => record,
            other => return Box::new(std::iter::once(Ok(other))),
        };
        let Value::Object(data) = &mut record.data else {
            return Box::new(std::iter::once(Err(ConnectorError::generator(format!(
                "record data of stream {} is not an object",
                record.stream.name
            )))));
        };

        let selected: Map<String, Value> = self
            .fields
            .iter()
            .filter_map(|field| data.remove(field).map(|value| (field.clone(), value)))
            .collect();
        record.data = Value::Object(selected);
        Box::new(std::iter::once(Ok(Message::record(record))))
    }
}
