//! JSON Lines files as source and destination.
//!
//! Each stream maps to one file `<dir>/<stream>.jsonl` holding one JSON
//! document per line.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Lines, Write};
use std::path::{Path, PathBuf};

use dat_protocol::{
    Catalog, CombinedState, ConnectorError, DocumentStream, Level, Message, RecordMessage,
    StateMessage, StreamRef, StreamState, StreamStatus, SyncMode,
};
use pipeline_common::{Destination, DestinationPlugin, MessageStream, Source, SourcePlugin};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::PluginSpec;

const EXTENSION: &str = "jsonl";

#[derive(Debug, Clone, Deserialize)]
pub struct JsonLinesOptions {
    pub dir: PathBuf,
}

/// `<dir>/<stream>.jsonl`, refusing stream names that would resolve outside `dir`.
fn stream_path(dir: &Path, stream: &str) -> Result<PathBuf, String> {
    if stream.is_empty() || stream.contains(['/', '\\']) || stream.contains("..") {
        return Err(format!("invalid stream name {stream:?}"));
    }
    Ok(dir.join(format!("{stream}.{EXTENSION}")))
}

/// Reads `<dir>/<stream>.jsonl` for every requested stream.
///
/// Incremental streams resume after the line `offset` stored in their state.
/// A `STATE` message with the new offset follows the records of each stream.
pub struct JsonLinesSource {
    dir: PathBuf,
}

impl SourcePlugin for JsonLinesSource {
    type Spec = PluginSpec<JsonLinesOptions>;

    fn from_spec(spec: Self::Spec) -> Result<Self, ConnectorError> {
        let dir = spec.connection_specification.dir;
        if !dir.is_dir() {
            return Err(ConnectorError::config(format!(
                "{} is not a directory",
                dir.display()
            )));
        }
        Ok(Self { dir })
    }
}

impl Source for JsonLinesSource {
    fn discover(&self) -> Result<Catalog, ConnectorError> {
        let mut document_streams = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                let mut stream = DocumentStream::new(stem);
                stream.sync_mode = SyncMode::Incremental;
                document_streams.push(stream);
            }
        }
        document_streams.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(Catalog { document_streams })
    }

    fn read(self: Box<Self>, catalog: Catalog, state: CombinedState) -> MessageStream<'static> {
        let dir = self.dir;
        Box::new(catalog.document_streams.into_iter().flat_map(move |stream| {
            let offset = match stream.sync_mode {
                SyncMode::Incremental => state
                    .get(&stream.name)
                    .and_then(|s| s.data.get("offset"))
                    .and_then(Value::as_u64)
                    .unwrap_or(0),
                SyncMode::FullRefresh => 0,
            };
            StreamReader::new(stream_path(&dir, &stream.name), &stream, offset)
        }))
    }
}

enum ReaderState {
    Invalid(String),
    Pending(PathBuf),
    Reading(Lines<BufReader<File>>),
    Done,
}

/// Lazily opened reader over one stream file.
struct StreamReader {
    stream: StreamRef,
    state: ReaderState,
    skip: u64,
    offset: u64,
}

impl StreamReader {
    fn new(path: Result<PathBuf, String>, stream: &DocumentStream, offset: u64) -> Self {
        Self {
            stream: StreamRef {
                name: stream.name.clone(),
                namespace: stream.namespace.clone(),
            },
            state: match path {
                Ok(path) => ReaderState::Pending(path),
                Err(reason) => ReaderState::Invalid(reason),
            },
            skip: offset,
            offset,
        }
    }

    fn checkpoint(&self) -> Message {
        Message::state(StateMessage {
            stream: self.stream.clone(),
            stream_state: StreamState {
                data: json!({ "offset": self.offset }),
                stream_status: StreamStatus::Completed,
            },
        })
    }
}

impl Iterator for StreamReader {
    type Item = Result<Message, ConnectorError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match &mut self.state {
                ReaderState::Done => return None,
                ReaderState::Invalid(reason) => {
                    let err = ConnectorError::Source(std::mem::take(reason));
                    self.state = ReaderState::Done;
                    return Some(Err(err));
                }
                ReaderState::Pending(path) => {
                    debug!(path = %path.display(), skip = self.skip, "Opening stream file");
                    match File::open(&*path) {
                        Ok(file) => self.state = ReaderState::Reading(BufReader::new(file).lines()),
                        Err(e) => {
                            self.state = ReaderState::Done;
                            return Some(Err(e.into()));
                        }
                    }
                }
                ReaderState::Reading(lines) => match lines.next() {
                    None => {
                        self.state = ReaderState::Done;
                        return Some(Ok(self.checkpoint()));
                    }
                    Some(Err(e)) => {
                        self.state = ReaderState::Done;
                        return Some(Err(e.into()));
                    }
                    Some(Ok(line)) => {
                        if self.skip > 0 {
                            self.skip -= 1;
                            continue;
                        }
                        self.offset += 1;
                        if line.trim().is_empty() {
                            continue;
                        }
                        return Some(
                            serde_json::from_str::<Value>(&line)
                                .map(|data| {
                                    Message::record(RecordMessage::new(self.stream.clone(), data))
                                })
                                .map_err(|e| {
                                    self.state = ReaderState::Done;
                                    ConnectorError::Source(format!(
                                        "{}: line {}: {e}",
                                        self.stream.name, self.offset
                                    ))
                                }),
                        );
                    }
                },
            }
        }
    }
}

/// Appends record data to `<dir>/<stream>.jsonl`, one batch per call.
///
/// When the catalog lists streams, records of other streams are rejected.
pub struct JsonLinesDestination {
    dir: PathBuf,
}

impl DestinationPlugin for JsonLinesDestination {
    type Spec = PluginSpec<JsonLinesOptions>;

    fn from_spec(spec: Self::Spec) -> Result<Self, ConnectorError> {
        let dir = spec.connection_specification.dir;
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }
}

impl JsonLinesDestination {
    fn append(&self, stream: &str, rows: &[Value]) -> Result<(), ConnectorError> {
        let path = stream_path(&self.dir, stream).map_err(ConnectorError::destination)?;
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut writer = BufWriter::new(file);
        for row in rows {
            serde_json::to_writer(&mut writer, row)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl Destination for JsonLinesDestination {
    fn write<'a>(&'a mut self, catalog: &'a Catalog, batch: Vec<Message>) -> MessageStream<'a> {
        let mut by_stream: BTreeMap<String, Vec<Value>> = BTreeMap::new();
        for message in batch {
            if let Message::Record { record } = message {
                by_stream.entry(record.stream.name).or_default().push(record.data);
            }
        }

        Box::new(by_stream.into_iter().map(move |(stream, rows)| {
            if !catalog.document_streams.is_empty() && catalog.stream(&stream).is_none() {
                return Err(ConnectorError::destination(format!(
                    "stream {stream} is not in the configured catalog"
                )));
            }
            self.append(&stream, &rows)?;
            Ok(Message::log(
                Level::Info,
                format!("wrote {} records to {stream}", rows.len()),
            ))
        }))
    }
}
