//! Single job execution.

use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use std::process::Stdio;

use dat_protocol::{Connection, Level, Message, MessageType};
use dat_telemetry::TelemetryPublisher;
use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::SupervisorError;

pub const JOB_STARTED: &str = "Job run started";
pub const JOB_ENDED: &str = "Job run ended";

const CONNECTION_FILE_PREFIX: &str = "cnctn_src_";

/// Lifecycle of one job. States are entered strictly in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Started,
    Running,
    Ended,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Started => write!(f, "started"),
            JobState::Running => write!(f, "running"),
            JobState::Ended => write!(f, "ended"),
        }
    }
}

/// How the pipeline subprocess is launched.
///
/// `--connection <file>` is appended to `args` for every job.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Directory receiving the temporary connection files. Created if missing.
    pub tmp_dir: PathBuf,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("dat"),
            args: vec!["orchestrate".to_string()],
            tmp_dir: std::env::temp_dir().join(".dat"),
        }
    }
}

/// Summary of one finished run. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub connection_id: String,
    /// `None` when the child was killed by a signal.
    pub exit_code: Option<i32>,
    pub forwarded_logs: usize,
    pub dropped_lines: usize,
    pub cancelled: bool,
}

impl JobReport {
    fn new(connection_id: &str) -> Self {
        Self {
            connection_id: connection_id.to_string(),
            exit_code: None,
            forwarded_logs: 0,
            dropped_lines: 0,
            cancelled: false,
        }
    }
}

enum Tailed {
    Forward(Value),
    Ignore,
    Drop,
}

fn classify(line: &str) -> Tailed {
    let Ok(value) = serde_json::from_str::<Value>(line) else {
        return Tailed::Drop;
    };
    match Message::deserialize(&value) {
        Ok(message) if message.message_type() == MessageType::Log => Tailed::Forward(value),
        Ok(_) => Tailed::Ignore,
        Err(_) => Tailed::Drop,
    }
}

/// Runs pipeline jobs and mirrors their `LOG` output to telemetry.
pub struct JobSupervisor {
    config: SupervisorConfig,
    telemetry: TelemetryPublisher,
}

impl JobSupervisor {
    pub fn new(config: SupervisorConfig, telemetry: TelemetryPublisher) -> Self {
        Self { config, telemetry }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Run one job for the raw connection document `connection`.
    pub async fn run(&self, connection: &str) -> Result<JobReport, SupervisorError> {
        self.run_with_cancel(connection, CancellationToken::new())
            .await
    }

    /// Run one job, killing the child when `cancel` fires.
    ///
    /// The ended event is published whatever the outcome; an error of the
    /// run itself is returned afterwards. A non-zero exit code is reported,
    /// not returned as an error.
    pub async fn run_with_cancel(
        &self,
        connection: &str,
        cancel: CancellationToken,
    ) -> Result<JobReport, SupervisorError> {
        let parsed = Connection::from_json(connection)?;
        let connection_id = parsed.id.as_str();

        enter(connection_id, JobState::Started);
        self.telemetry
            .publish_message(connection_id, &Message::log(Level::Info, JOB_STARTED))
            .await;

        enter(connection_id, JobState::Running);
        let outcome = self.execute(connection_id, connection, &cancel).await;

        enter(connection_id, JobState::Ended);
        self.telemetry
            .publish_message(connection_id, &Message::log(Level::Info, JOB_ENDED))
            .await;

        match &outcome {
            Ok(report) => info!(
                connection_id,
                exit_code = ?report.exit_code,
                forwarded_logs = report.forwarded_logs,
                dropped_lines = report.dropped_lines,
                cancelled = report.cancelled,
                "Job finished"
            ),
            Err(e) => warn!(connection_id, error = %e, "Job failed"),
        }
        outcome
    }

    async fn execute(
        &self,
        connection_id: &str,
        connection: &str,
        cancel: &CancellationToken,
    ) -> Result<JobReport, SupervisorError> {
        tokio::fs::create_dir_all(&self.config.tmp_dir).await?;
        // Lives until the child has exited; the file is removed on drop.
        let mut connection_file = tempfile::Builder::new()
            .prefix(CONNECTION_FILE_PREFIX)
            .suffix(".json")
            .tempfile_in(&self.config.tmp_dir)?;
        connection_file.write_all(connection.as_bytes())?;
        connection_file.flush()?;

        let mut command = Command::new(&self.config.program);
        command
            .args(&self.config.args)
            .arg("--connection")
            .arg(connection_file.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|source| SupervisorError::Spawn {
            program: self.config.program.display().to_string(),
            source,
        })?;
        debug!(connection_id, pid = ?child.id(), "Pipeline process spawned");

        let mut report = JobReport::new(connection_id);
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("child stdout was not captured"))?;
        let mut lines = BufReader::new(stdout).split(b'\n');

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(connection_id, "Job cancelled, killing pipeline process");
                    let _ = child.start_kill();
                    report.cancelled = true;
                    break;
                }
                next = lines.next_segment() => next?,
            };
            let Some(raw) = next else { break };

            let line = match String::from_utf8(raw) {
                Ok(line) => line,
                Err(_) => {
                    warn!(connection_id, "Dropping non UTF-8 output line");
                    report.dropped_lines += 1;
                    continue;
                }
            };
            let line = line.strip_suffix('\r').unwrap_or(&line);
            if line.trim().is_empty() {
                continue;
            }

            match classify(line) {
                Tailed::Forward(value) => {
                    self.telemetry.publish(connection_id, value).await;
                    report.forwarded_logs += 1;
                }
                Tailed::Ignore => {}
                Tailed::Drop => {
                    warn!(connection_id, line, "Not a protocol message, dropping");
                    report.dropped_lines += 1;
                }
            }
        }

        let status = child.wait().await?;
        report.exit_code = status.code();
        if !status.success() {
            warn!(
                connection_id,
                exit_code = ?report.exit_code,
                "Pipeline process exited unsuccessfully"
            );
        }
        drop(connection_file);
        Ok(report)
    }
}

fn enter(connection_id: &str, state: JobState) {
    info!(connection_id, state = %state, "Job state changed");
}
