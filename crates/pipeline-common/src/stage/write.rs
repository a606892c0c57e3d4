use dat_protocol::{Catalog, Message, MessageType};
use tracing::{debug, info, warn};

use super::{Route, drain, emit, emit_error, route};
use crate::plugin::Destination;
use crate::{PipelineError, Processor};

const STAGE: &str = "write";

/// Default number of records handed to a destination per write call.
pub const MAX_BATCH_SIZE: usize = 999;

/// Batching sink in front of a [`Destination`].
///
/// `RECORD` messages are buffered until `batch_size` is reached and then
/// written synchronously; other lines pass through unbuffered. The buffer is
/// emptied before every write, whatever its outcome.
///
/// Failure handling:
/// - a failing mid-stream flush is returned as [`PipelineError::Flush`] and
///   ends the stage without a protocol message;
/// - a failing final flush (end of input) is reported as one `LOG`/`ERROR`
///   message;
/// - a `RECORD` line that does not decode is reported as one `LOG`/`ERROR`
///   message and ends the stage. Records still buffered are discarded, no
///   final flush happens and further input lines are ignored.
pub struct WriteStage {
    destination: Box<dyn Destination>,
    catalog: Catalog,
    buffer: Vec<Message>,
    batch_size: usize,
    flushes: usize,
    records: usize,
    aborted: bool,
}

impl WriteStage {
    pub fn new(destination: Box<dyn Destination>, catalog: Catalog) -> Self {
        Self::with_batch_size(destination, catalog, MAX_BATCH_SIZE)
    }

    /// `batch_size` is clamped to at least one record.
    pub fn with_batch_size(
        destination: Box<dyn Destination>,
        catalog: Catalog,
        batch_size: usize,
    ) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            destination,
            catalog,
            buffer: Vec::with_capacity(batch_size),
            batch_size,
            flushes: 0,
            records: 0,
            aborted: false,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn flush_mid_stream(
        &mut self,
        output: &mut dyn FnMut(String) -> Result<(), PipelineError>,
    ) -> Result<(), PipelineError> {
        let batch = std::mem::take(&mut self.buffer);
        self.flushes += 1;
        debug!(flush = self.flushes, records = batch.len(), "Flushing batch");

        for item in self.destination.write(&self.catalog, batch) {
            let message = item.map_err(|source| PipelineError::Flush {
                stage: STAGE,
                source,
            })?;
            emit(&message, output)?;
        }
        Ok(())
    }
}

impl Processor<String> for WriteStage {
    fn name(&self) -> &'static str {
        STAGE
    }

    fn process(
        &mut self,
        line: String,
        output: &mut dyn FnMut(String) -> Result<(), PipelineError>,
    ) -> Result<(), PipelineError> {
        if self.aborted {
            return Ok(());
        }
        match route(&line, MessageType::Record) {
            Route::Drop => Ok(()),
            Route::PassThrough => output(line),
            Route::Target(Err(e)) => {
                self.aborted = true;
                let discarded = std::mem::take(&mut self.buffer).len();
                if discarded > 0 {
                    warn!(discarded, "Write stage aborted with unflushed records");
                }
                emit_error(STAGE, &e, output)
            }
            Route::Target(Ok(message)) => {
                self.buffer.push(message);
                self.records += 1;
                if self.buffer.len() >= self.batch_size {
                    self.flush_mid_stream(output)?;
                }
                Ok(())
            }
        }
    }

    fn finish(
        &mut self,
        output: &mut dyn FnMut(String) -> Result<(), PipelineError>,
    ) -> Result<(), PipelineError> {
        if !self.aborted && !self.buffer.is_empty() {
            let batch = std::mem::take(&mut self.buffer);
            self.flushes += 1;
            debug!(flush = self.flushes, records = batch.len(), "Flushing final batch");
            drain(STAGE, self.destination.write(&self.catalog, batch), output)?;
        }
        info!(
            records = self.records,
            flushes = self.flushes,
            aborted = self.aborted,
            "Write stage finished"
        );
        Ok(())
    }
}
