use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Result, bail};
use dat_supervisor::{JobPool, JobReport, JobSupervisor};
use tracing::{error, info, warn};

use crate::config::Settings;

pub struct SuperviseOptions {
    /// Raw connection documents, one job each.
    pub connections: Vec<String>,
    /// Global `dat` flags for jobs that run this executable.
    pub global_args: Vec<String>,
    pub telemetry_url: Option<String>,
    pub tmp_dir: Option<PathBuf>,
    pub max_concurrent_jobs: Option<usize>,
}

/// Run every connection as a supervised job until all have ended.
///
/// Ctrl-C cancels running jobs. Fails if any job failed to run, exited
/// unsuccessfully or was cancelled.
pub async fn supervise(
    mut settings: Settings,
    options: SuperviseOptions,
) -> Result<Vec<JobReport>> {
    settings.override_telemetry_url(options.telemetry_url);
    let config = settings.supervisor_config(
        options.tmp_dir,
        &options.global_args,
        std::env::current_exe,
    )?;
    let telemetry = settings.telemetry_publisher()?;
    let max_concurrent_jobs = options
        .max_concurrent_jobs
        .unwrap_or(settings.supervisor.max_concurrent_jobs);

    info!(
        program = %config.program.display(),
        tmp_dir = %config.tmp_dir.display(),
        queue = telemetry.queue(),
        "Supervising {} connection(s)",
        options.connections.len()
    );

    let supervisor = Arc::new(JobSupervisor::new(config, telemetry));
    let pool = Arc::new(JobPool::with_limit(supervisor, max_concurrent_jobs));

    let signal_pool = pool.clone();
    let signal_handler = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling running jobs");
            signal_pool.shutdown();
        }
    });

    let results = pool.run_all(options.connections).await;
    signal_handler.abort();

    let total = results.len();
    let mut reports = Vec::with_capacity(total);
    let mut failed = 0;
    for (index, result) in results.into_iter().enumerate() {
        match result {
            Ok(report) => {
                if report.exit_code != Some(0) || report.cancelled {
                    failed += 1;
                    warn!(
                        connection_id = %report.connection_id,
                        exit_code = ?report.exit_code,
                        cancelled = report.cancelled,
                        "Job did not succeed"
                    );
                }
                reports.push(report);
            }
            Err(e) => {
                failed += 1;
                error!(job = index, error = %e, "Job failed");
            }
        }
    }

    if failed > 0 {
        bail!("{failed} of {total} job(s) failed");
    }
    Ok(reports)
}
