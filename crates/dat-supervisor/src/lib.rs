//! # dat Supervisor
//!
//! Runs a pipeline as a background job: the connection is handed to a
//! subprocess through a temporary file, the subprocess output is tailed line
//! by line and its `LOG` messages are mirrored to telemetry. Every job is
//! bracketed by a "Job run started" and a "Job run ended" event.

mod error;
mod job;
mod pool;

pub use error::SupervisorError;
pub use job::{JOB_ENDED, JOB_STARTED, JobReport, JobState, JobSupervisor, SupervisorConfig};
pub use pool::{DEFAULT_MAX_CONCURRENT_JOBS, JobPool};
