//! Bounded concurrent execution of several jobs.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{JobReport, JobSupervisor, SupervisorError};

pub const DEFAULT_MAX_CONCURRENT_JOBS: usize = 4;

/// Runs jobs concurrently, at most `max_concurrent_jobs` at a time.
///
/// Jobs share nothing but the supervisor configuration and the telemetry
/// publisher; each has its own connection file and child process.
pub struct JobPool {
    supervisor: Arc<JobSupervisor>,
    semaphore: Arc<Semaphore>,
    max_concurrent_jobs: usize,
    cancellation_token: CancellationToken,
}

impl JobPool {
    pub fn new(supervisor: Arc<JobSupervisor>) -> Self {
        Self::with_limit(supervisor, DEFAULT_MAX_CONCURRENT_JOBS)
    }

    pub fn with_limit(supervisor: Arc<JobSupervisor>, max_concurrent_jobs: usize) -> Self {
        let max_concurrent_jobs = max_concurrent_jobs.max(1);
        Self {
            supervisor,
            semaphore: Arc::new(Semaphore::new(max_concurrent_jobs)),
            max_concurrent_jobs,
            cancellation_token: CancellationToken::new(),
        }
    }

    pub fn max_concurrent_jobs(&self) -> usize {
        self.max_concurrent_jobs
    }

    /// Token cancelling every running job of this pool.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Cancel running jobs and refuse jobs still waiting for a slot.
    pub fn shutdown(&self) {
        self.semaphore.close();
        self.cancellation_token.cancel();
    }

    /// Run every connection to completion. Results are in input order.
    pub async fn run_all(
        &self,
        connections: Vec<String>,
    ) -> Vec<Result<JobReport, SupervisorError>> {
        info!(
            jobs = connections.len(),
            max_concurrent_jobs = self.max_concurrent_jobs,
            "Starting job pool"
        );

        let mut join_set = JoinSet::new();
        let total = connections.len();
        for (index, connection) in connections.into_iter().enumerate() {
            let supervisor = self.supervisor.clone();
            let semaphore = self.semaphore.clone();
            let token = self.cancellation_token.child_token();

            join_set.spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => {
                        debug!(job = index, "Job acquired a slot");
                        supervisor.run_with_cancel(&connection, token).await
                    }
                    Err(_) => Err(SupervisorError::PoolClosed),
                };
                (index, result)
            });
        }

        let mut results: Vec<Option<Result<JobReport, SupervisorError>>> =
            (0..total).map(|_| None).collect();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, result)) => results[index] = Some(result),
                Err(e) => warn!(error = %e, "Job task did not complete"),
            }
        }

        results
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| {
                    Err(SupervisorError::TaskFailed(
                        "job task panicked or was aborted".to_string(),
                    ))
                })
            })
            .collect()
    }
}
