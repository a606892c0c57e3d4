//! # Pipeline Common
//!
//! This crate provides the stage machinery shared by every dat pipeline: the
//! plugin contracts connectors implement, the registry that resolves them by
//! name, and the stage pumps that move protocol lines through them.
//!
//! ## Features
//!
//! - `Source` / `Generator` / `Destination` plugin contracts with lazy output streams
//! - `Registry` resolving `(module_name, name)` to a plugin instance
//! - Read, generate and batching write stages that never crash on plugin failure
//! - Synchronous `Pipeline` for stdin/stdout stage processes
//! - `ChannelPipeline` running stages in-process over bounded channels
//!

use thiserror::Error;

pub mod channel_pipeline;
mod io;
pub mod pipeline;
pub mod plugin;
pub mod processor;
pub mod registry;
mod run_completion;
pub mod stage;
#[cfg(test)]
mod test_utils;

/// Re-export key traits and types
pub use channel_pipeline::ChannelPipeline;
pub use io::{LineReader, write_line};
pub use pipeline::Pipeline;
pub use plugin::{
    Destination, DestinationPlugin, Generator, GeneratorPlugin, MessageStream, Source,
    SourcePlugin,
};
pub use processor::Processor;
pub use registry::{PluginRole, Registry, ResolveError};
pub use run_completion::settle_stages;
pub use stage::{GenerateStage, MAX_BATCH_SIZE, ReadPump, WriteStage};

use dat_protocol::ConnectorError;

/// Common error type for pipeline operations
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("Stage task cancelled")]
    Cancelled,

    #[error("Batch flush failed ({stage}): {source}")]
    Flush {
        stage: &'static str,
        #[source]
        source: ConnectorError,
    },

    #[error("Stage process failed ({stage}): {source}")]
    StageProcess {
        stage: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Stage finish failed ({stage}): {source}")]
    StageFinish {
        stage: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}
