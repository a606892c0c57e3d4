use dat_protocol::{Catalog, CombinedState, Message};
use tracing::{debug, warn};

use crate::plugin::{MessageStream, Source};

/// Last-resort line used if even the error message cannot be serialized.
const UNSERIALIZABLE_ERROR: &str =
    r#"{"type":"LOG","log":{"level":"ERROR","message":"failed to serialize error message"}}"#;

/// Drives a [`Source`] read as an iterator of protocol lines.
///
/// The read stage is the top-level driving loop of a pipeline: the first
/// failure is emitted as one `LOG`/`ERROR` line and ends the iterator.
pub struct ReadPump {
    stream: Option<MessageStream<'static>>,
    emitted: usize,
}

impl ReadPump {
    pub fn new(source: Box<dyn Source>, catalog: Catalog, state: CombinedState) -> Self {
        debug!(
            streams = catalog.document_streams.len(),
            checkpoints = state.len(),
            "Starting read"
        );
        Self {
            stream: Some(source.read(catalog, state)),
            emitted: 0,
        }
    }

    /// Number of lines produced so far, including a terminating error line.
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    fn fail(&mut self, err: &(dyn std::error::Error + 'static)) -> String {
        warn!(error = %err, "Source failed, ending read");
        self.stream = None;
        Message::error_log(err)
            .to_line()
            .unwrap_or_else(|_| UNSERIALIZABLE_ERROR.to_string())
    }
}

impl Iterator for ReadPump {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let stream = self.stream.as_mut()?;
        let line = match stream.next() {
            Some(Ok(message)) => match message.to_line() {
                Ok(line) => line,
                Err(e) => self.fail(&e),
            },
            Some(Err(e)) => self.fail(&e),
            None => {
                debug!(emitted = self.emitted, "Read finished");
                self.stream = None;
                return None;
            }
        };
        self.emitted += 1;
        Some(line)
    }
}
