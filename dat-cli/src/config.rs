//! Settings file and command-line overrides.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use dat_supervisor::{DEFAULT_MAX_CONCURRENT_JOBS, SupervisorConfig};
use dat_telemetry::{
    DEFAULT_QUEUE, HttpQueueConfig, HttpQueuePublisher, LogPublisher, NoopPublisher, Publisher,
    TelemetryPublisher,
};
use pipeline_common::MAX_BATCH_SIZE;
use serde::{Deserialize, Serialize};
use tracing::debug;

const DEFAULT_CHANNEL_SIZE: usize = 32;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub telemetry: TelemetrySettings,
    pub supervisor: SupervisorSettings,
    pub pipeline: PipelineSettings,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TelemetryKind {
    Http,
    #[default]
    Log,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    pub kind: TelemetryKind,
    pub base_url: Option<String>,
    pub vhost: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub queue: String,
    pub timeout_secs: u64,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            kind: TelemetryKind::default(),
            base_url: None,
            vhost: "/".to_string(),
            username: None,
            password: None,
            queue: DEFAULT_QUEUE.to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorSettings {
    /// Pipeline executable; the running `dat` binary when unset.
    pub pipeline_program: Option<PathBuf>,
    pub pipeline_args: Vec<String>,
    /// Defaults to `<system tmp>/.dat`.
    pub tmp_dir: Option<PathBuf>,
    pub max_concurrent_jobs: usize,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            pipeline_program: None,
            pipeline_args: vec!["orchestrate".to_string()],
            tmp_dir: None,
            max_concurrent_jobs: DEFAULT_MAX_CONCURRENT_JOBS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub batch_size: usize,
    pub channel_size: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            batch_size: MAX_BATCH_SIZE,
            channel_size: DEFAULT_CHANNEL_SIZE,
        }
    }
}

impl Settings {
    /// Load settings from `path`, or defaults when no file is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        let settings = Self::from_toml(&raw)
            .with_context(|| format!("Invalid settings file {}", path.display()))?;
        debug!(path = %path.display(), "Loaded settings");
        Ok(settings)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(raw)?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.pipeline.batch_size == 0 {
            bail!("pipeline.batch_size must be at least 1");
        }
        if self.pipeline.channel_size == 0 {
            bail!("pipeline.channel_size must be at least 1");
        }
        if self.supervisor.max_concurrent_jobs == 0 {
            bail!("supervisor.max_concurrent_jobs must be at least 1");
        }
        Ok(())
    }

    /// A telemetry URL given on the command line switches to HTTP telemetry.
    pub fn override_telemetry_url(&mut self, url: Option<String>) {
        if let Some(url) = url {
            self.telemetry.kind = TelemetryKind::Http;
            self.telemetry.base_url = Some(url);
        }
    }

    pub fn batch_size(&self, flag: Option<usize>) -> usize {
        flag.unwrap_or(self.pipeline.batch_size).max(1)
    }

    /// Supervisor configuration; `current_exe` backs an unset program.
    ///
    /// Jobs running `dat` itself get `global_args` ahead of `pipeline_args`,
    /// so they see the same settings file and log flags as this process.
    pub fn supervisor_config(
        &self,
        tmp_dir: Option<PathBuf>,
        global_args: &[String],
        current_exe: impl FnOnce() -> std::io::Result<PathBuf>,
    ) -> Result<SupervisorConfig> {
        let defaults = SupervisorConfig::default();
        let (program, mut args) = match &self.supervisor.pipeline_program {
            Some(program) => (program.clone(), Vec::new()),
            None => (
                current_exe().context("Failed to locate the dat executable")?,
                global_args.to_vec(),
            ),
        };
        args.extend(self.supervisor.pipeline_args.iter().cloned());
        Ok(SupervisorConfig {
            program,
            args,
            tmp_dir: tmp_dir
                .or_else(|| self.supervisor.tmp_dir.clone())
                .unwrap_or(defaults.tmp_dir),
        })
    }

    pub fn telemetry_publisher(&self) -> Result<TelemetryPublisher> {
        let settings = &self.telemetry;
        let publisher: Arc<dyn Publisher> = match settings.kind {
            TelemetryKind::Http => {
                let base_url = settings
                    .base_url
                    .clone()
                    .context("telemetry.base_url is required for HTTP telemetry")?;
                let mut config = HttpQueueConfig::new(base_url);
                config.vhost = settings.vhost.clone();
                config.username = settings.username.clone();
                config.password = settings.password.clone();
                config.timeout_secs = settings.timeout_secs;
                Arc::new(HttpQueuePublisher::new(config)?)
            }
            TelemetryKind::Log => Arc::new(LogPublisher),
            TelemetryKind::None => Arc::new(NoopPublisher),
        };
        Ok(TelemetryPublisher::with_queue(
            publisher,
            settings.queue.clone(),
        ))
    }
}
