//! # Channel-Based Pipeline Implementation
//!
//! Runs every stage of a pipeline inside one process, each processor on its
//! own blocking task, connected by bounded channels. A full channel blocks
//! the stage feeding it, which gives the same backpressure as an OS pipe
//! between stage processes.

use crate::{PipelineError, Processor, settle_stages};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Default capacity for channels between stages
const DEFAULT_CHANNEL_CAPACITY: usize = 32;

/// Lines a stage consumes between two progress logs.
const PROGRESS_INTERVAL: usize = 10_000;

type LineSender<T> = mpsc::Sender<Result<T, PipelineError>>;
type LineReceiver<T> = mpsc::Receiver<Result<T, PipelineError>>;

/// Where in a stage a failure happened.
#[derive(Clone, Copy)]
enum Phase {
    Line,
    Finish,
}

/// Send the failure downstream and return a copy for the stage task.
fn stage_failure<T>(
    tx: &LineSender<T>,
    stage: &'static str,
    phase: Phase,
    message: String,
) -> PipelineError {
    let build = |message: String| {
        let source = Box::new(std::io::Error::other(message));
        match phase {
            Phase::Line => PipelineError::StageProcess { stage, source },
            Phase::Finish => PipelineError::StageFinish { stage, source },
        }
    };
    let _ = tx.blocking_send(Err(build(message.clone())));
    build(message)
}

/// Body of one stage task: feed every line to `processor`, then finish it.
///
/// Errors arriving from upstream are passed on unchanged.
fn run_stage<T>(
    mut processor: Box<dyn Processor<T>>,
    mut rx: LineReceiver<T>,
    tx: LineSender<T>,
) -> Result<(), PipelineError> {
    let stage = processor.name();
    let mut lines_in: usize = 0;
    let mut lines_out: usize = 0;

    while let Some(line) = rx.blocking_recv() {
        let line = match line {
            Ok(line) => line,
            Err(upstream) => {
                if tx.blocking_send(Err(upstream)).is_err() {
                    break;
                }
                continue;
            }
        };

        let mut emit = |out: T| -> Result<(), PipelineError> {
            tx.blocking_send(Ok(out))
                .map_err(|_| PipelineError::ChannelClosed("downstream"))?;
            lines_out += 1;
            Ok(())
        };
        if let Err(e) = processor.process(line, &mut emit) {
            error!(stage, line = lines_in + 1, error = %e, "Stage failed on line");
            return Err(stage_failure(&tx, stage, Phase::Line, e.to_string()));
        }

        lines_in += 1;
        if lines_in % PROGRESS_INTERVAL == 0 {
            debug!(stage, lines_in, lines_out, "Stage progress");
        }
    }

    let mut emit = |out: T| -> Result<(), PipelineError> {
        tx.blocking_send(Ok(out))
            .map_err(|_| PipelineError::ChannelClosed("downstream during finish"))?;
        lines_out += 1;
        Ok(())
    };
    if let Err(e) = processor.finish(&mut emit) {
        error!(stage, lines_in, error = %e, "Stage failed while finishing");
        return Err(stage_failure(&tx, stage, Phase::Finish, e.to_string()));
    }

    debug!(stage, lines_in, lines_out, "Stage done");
    Ok(())
}

/// A channel-based pipeline for processing data through a series of processors.
///
/// Runtime model:
/// - Each stage runs in `tokio::task::spawn_blocking`.
/// - Stage processors are synchronous (`Processor<T>`).
/// - A failing stage forwards its error downstream and stops; the stages
///   upstream of it then observe a closed channel.
pub struct ChannelPipeline<T> {
    processors: Vec<Box<dyn Processor<T>>>,
    channel_size: usize,
}

/// Result of spawning a pipeline
pub struct SpawnedPipeline<T> {
    pub input_tx: mpsc::Sender<Result<T, PipelineError>>,
    pub output_rx: mpsc::Receiver<Result<T, PipelineError>>,
    pub tasks: Vec<JoinHandle<Result<(), PipelineError>>>,
}

impl<T> Default for ChannelPipeline<T>
where
    T: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ChannelPipeline<T>
where
    T: Send + 'static,
{
    pub fn new() -> Self {
        Self {
            processors: Vec::new(),
            channel_size: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Set the channel size for connections between processors.
    pub fn with_channel_size(mut self, size: usize) -> Self {
        self.channel_size = size.max(1);
        self
    }

    /// Add a processor to the end of the pipeline.
    pub fn add_processor<P: Processor<T> + 'static>(mut self, processor: P) -> Self {
        self.processors.push(Box::new(processor));
        self
    }

    /// Spawns the stage tasks and returns the input sender, output receiver
    /// and task handles.
    pub fn spawn(self) -> SpawnedPipeline<T> {
        let (input_tx, mut rx) = mpsc::channel(self.channel_size);
        let mut tasks = Vec::with_capacity(self.processors.len());

        for processor in self.processors {
            let (tx, next_rx) = mpsc::channel(self.channel_size);
            tasks.push(tokio::task::spawn_blocking(move || run_stage(processor, rx, tx)));
            rx = next_rx;
        }

        SpawnedPipeline {
            input_tx,
            output_rx: rx,
            tasks,
        }
    }

    /// Runs the pipeline to completion.
    ///
    /// `input` is drained on a blocking task (it may itself block, e.g. a
    /// source read) and every item leaving the last stage is handed to
    /// `output`. Returns the number of items delivered to `output`.
    pub async fn run<I, O>(self, input: I, output: O) -> Result<usize, PipelineError>
    where
        I: Iterator<Item = T> + Send + 'static,
        O: FnMut(T) -> Result<(), PipelineError> + Send + 'static,
    {
        let SpawnedPipeline {
            input_tx,
            output_rx,
            mut tasks,
        } = self.spawn();

        let feeder = tokio::task::spawn_blocking(move || {
            for item in input {
                if input_tx.blocking_send(Ok(item)).is_err() {
                    debug!("Pipeline input closed early");
                    break;
                }
            }
            Ok::<(), PipelineError>(())
        });
        tasks.insert(0, feeder);

        let sink = tokio::task::spawn_blocking(move || {
            let mut output_rx = output_rx;
            let mut output = output;
            let mut delivered = 0usize;
            while let Some(item) = output_rx.blocking_recv() {
                output(item?)?;
                delivered += 1;
            }
            Ok::<usize, PipelineError>(delivered)
        });

        let sink_result = match sink.await {
            Ok(result) => result,
            Err(join_error) => Err(PipelineError::StageProcess {
                stage: "sink",
                source: Box::new(std::io::Error::other(format!(
                    "Output task panicked: {join_error}"
                ))),
            }),
        };

        settle_stages(sink_result, tasks).await
    }
}
