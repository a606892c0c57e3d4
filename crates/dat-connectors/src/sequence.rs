//! Synthetic source producing numbered records.

use dat_protocol::{
    Catalog, CombinedState, ConnectorError, DocumentStream, Message, RecordMessage, StreamRef,
};
use pipeline_common::{MessageStream, Source, SourcePlugin};
use serde::Deserialize;
use serde_json::json;

use crate::PluginSpec;

const DEFAULT_STREAM: &str = "sequence";

fn default_stream() -> String {
    DEFAULT_STREAM.to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CounterOptions {
    pub count: u64,
    #[serde(default = "default_stream")]
    pub stream: String,
    /// Fail with a source error once this many records were emitted.
    #[serde(default)]
    pub fail_after: Option<u64>,
}

/// Emits `{"id": n}` records for `n` in `0..count` on every requested
/// stream, or on its configured stream when the catalog is empty.
pub struct CounterSource {
    options: CounterOptions,
}

impl SourcePlugin for CounterSource {
    type Spec = PluginSpec<CounterOptions>;

    fn from_spec(spec: Self::Spec) -> Result<Self, ConnectorError> {
        Ok(Self {
            options: spec.connection_specification,
        })
    }
}

impl Source for CounterSource {
    fn discover(&self) -> Result<Catalog, ConnectorError> {
        Ok(Catalog {
            document_streams: vec![DocumentStream::new(self.options.stream.clone())],
        })
    }

    fn read(self: Box<Self>, catalog: Catalog, _state: CombinedState) -> MessageStream<'static> {
        let CounterOptions {
            count,
            stream,
            fail_after,
        } = self.options;
        let streams: Vec<String> = if catalog.document_streams.is_empty() {
            vec![stream]
        } else {
            catalog.document_streams.into_iter().map(|s| s.name).collect()
        };

        let mut emitted = 0u64;
        Box::new(
            streams
                .into_iter()
                .flat_map(move |name| (0..count).map(move |id| (name.clone(), id)))
                .map(move |(name, id)| {
                    if fail_after.is_some_and(|limit| emitted >= limit) {
                        return Err(ConnectorError::Source(format!(
                            "counter stopped after {emitted} records"
                        )));
                    }
                    emitted += 1;
                    Ok(Message::record(RecordMessage::new(
                        StreamRef::new(name),
                        json!({ "id": id }),
                    )))
                }),
        )
    }
}
