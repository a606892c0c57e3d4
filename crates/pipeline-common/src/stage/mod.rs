//! Stage pumps for the read, generate and write ends of a pipeline.
//!
//! Every stage follows the same line discipline:
//!
//! - a line that is not JSON, or has no string `type`, is dropped silently;
//! - a line whose `type` is not the kind the stage acts on is echoed verbatim;
//! - a line of the target kind that does not decode into a [`Message`] yields a
//!   single `LOG`/`ERROR` message and ends the stage;
//! - a plugin failure while producing output yields a single `LOG`/`ERROR`
//!   message instead of ending the process.

mod generate;
mod read;
mod write;

pub use generate::GenerateStage;
pub use read::ReadPump;
pub use write::{MAX_BATCH_SIZE, WriteStage};

use dat_protocol::{Message, MessageType, peek_type};
use tracing::warn;

use crate::PipelineError;
use crate::plugin::MessageStream;

/// How a stage handles one input line.
pub(crate) enum Route {
    /// Not a protocol message.
    Drop,
    /// A message of another kind, forwarded unchanged.
    PassThrough,
    /// A message of the target kind.
    Target(Result<Message, serde_json::Error>),
}

pub(crate) fn route(line: &str, target: MessageType) -> Route {
    match peek_type(line) {
        None => Route::Drop,
        Some(kind) if kind != target.as_str() => Route::PassThrough,
        Some(_) => Route::Target(Message::from_line(line)),
    }
}

pub(crate) fn emit(
    message: &Message,
    output: &mut dyn FnMut(String) -> Result<(), PipelineError>,
) -> Result<(), PipelineError> {
    output(message.to_line()?)
}

/// Emit the `LOG`/`ERROR` message standing in for `err`.
pub(crate) fn emit_error(
    stage: &'static str,
    err: &(dyn std::error::Error + 'static),
    output: &mut dyn FnMut(String) -> Result<(), PipelineError>,
) -> Result<(), PipelineError> {
    warn!(stage, error = %err, "Converting failure into LOG message");
    emit(&Message::error_log(err), output)
}

/// Result of draining one plugin output stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Drained {
    pub written: usize,
    pub failed: bool,
}

/// Write every message of `stream` as it is produced.
///
/// The first failure is converted into a `LOG`/`ERROR` message and ends the
/// stream.
pub(crate) fn drain(
    stage: &'static str,
    stream: MessageStream<'_>,
    output: &mut dyn FnMut(String) -> Result<(), PipelineError>,
) -> Result<Drained, PipelineError> {
    let mut written = 0;
    for item in stream {
        match item {
            Ok(message) => {
                emit(&message, output)?;
                written += 1;
            }
            Err(e) => {
                emit_error(stage, &e, output)?;
                return Ok(Drained {
                    written,
                    failed: true,
                });
            }
        }
    }
    Ok(Drained {
        written,
        failed: false,
    })
}
