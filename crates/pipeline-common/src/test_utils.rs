use std::sync::{Arc, Mutex};

use dat_protocol::{
    Catalog, CombinedState, ConnectorError, Level, Message, RecordMessage, StreamRef,
};
use serde_json::json;

use crate::plugin::{Destination, Generator, MessageStream, Source};

/// Initialize tracing for tests with appropriate settings
#[inline]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer() // Write to test output
        .try_init();
}

pub fn record(stream: &str, id: i64) -> Message {
    Message::record(RecordMessage {
        stream: StreamRef::new(stream),
        data: json!({ "id": id }),
        emitted_at: 0,
        namespace: None,
    })
}

pub fn record_line(stream: &str, id: i64) -> String {
    record(stream, id).to_line().unwrap()
}

/// Source replaying a fixed list of results.
pub struct ScriptedSource {
    items: Vec<Result<Message, ConnectorError>>,
}

impl ScriptedSource {
    pub fn new(items: Vec<Result<Message, ConnectorError>>) -> Self {
        Self { items }
    }
}

impl Source for ScriptedSource {
    fn discover(&self) -> Result<Catalog, ConnectorError> {
        Ok(Catalog::default())
    }

    fn read(self: Box<Self>, _catalog: Catalog, _state: CombinedState) -> MessageStream<'static> {
        Box::new(self.items.into_iter())
    }
}

/// Generator echoing each record `copies` times, failing on records whose
/// `id` equals `fail_on` after emitting one copy.
pub struct EchoGenerator {
    pub copies: usize,
    pub fail_on: Option<i64>,
}

impl Generator for EchoGenerator {
    fn generate(&mut self, message: Message) -> MessageStream<'_> {
        let id = message
            .as_record()
            .and_then(|r| r.data["id"].as_i64())
            .unwrap_or_default();
        let copies = self.copies;
        if self.fail_on == Some(id) {
            let items = vec![
                Ok(message),
                Err(ConnectorError::generator(format!("cannot expand record {id}"))),
                Ok(Message::log(Level::Info, "unreachable")),
            ];
            return Box::new(items.into_iter());
        }
        Box::new(std::iter::repeat_n(message, copies).map(Ok))
    }
}

/// Destination recording the size of every batch it receives.
///
/// Acknowledges each batch with one `LOG`/`INFO` message. Batches whose
/// ordinal (starting at 1) is listed in `fail_batches` fail after the
/// acknowledgement.
#[derive(Clone, Default)]
pub struct RecordingDestination {
    pub batches: Arc<Mutex<Vec<usize>>>,
    pub fail_batches: Vec<usize>,
}

impl RecordingDestination {
    pub fn failing_on(batches: &[usize]) -> Self {
        Self {
            batches: Arc::default(),
            fail_batches: batches.to_vec(),
        }
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().unwrap().clone()
    }
}

impl Destination for RecordingDestination {
    fn write<'a>(&'a mut self, _catalog: &'a Catalog, batch: Vec<Message>) -> MessageStream<'a> {
        let ordinal = {
            let mut batches = self.batches.lock().unwrap();
            batches.push(batch.len());
            batches.len()
        };
        let ack = Message::log(Level::Info, format!("wrote {} records", batch.len()));
        if self.fail_batches.contains(&ordinal) {
            let err = ConnectorError::destination(format!("batch {ordinal} rejected"));
            return Box::new(vec![Ok(ack), Err(err)].into_iter());
        }
        Box::new(std::iter::once(Ok(ack)))
    }
}

/// Run a processor over `lines` synchronously and collect its output, also
/// when it fails.
pub fn run_processor<P: crate::Processor<String>>(
    processor: &mut P,
    lines: Vec<String>,
) -> (Vec<String>, Result<(), crate::PipelineError>) {
    let mut out = Vec::new();
    let result = {
        let mut output = |line: String| {
            out.push(line);
            Ok::<(), crate::PipelineError>(())
        };
        feed(processor, lines, &mut output)
    };
    (out, result)
}

fn feed<P: crate::Processor<String>>(
    processor: &mut P,
    lines: Vec<String>,
    output: &mut dyn FnMut(String) -> Result<(), crate::PipelineError>,
) -> Result<(), crate::PipelineError> {
    for line in lines {
        processor.process(line, output)?;
    }
    processor.finish(output)
}
