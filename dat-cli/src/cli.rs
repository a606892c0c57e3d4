use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// dat - move records through connector pipelines
#[derive(Parser, Debug)]
#[command(name = "dat", version, about, long_about = None)]
pub struct Args {
    /// Log filter directive, e.g. `info` or `pipeline_common=debug`
    #[arg(long, global = true, env = "DAT_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Settings file (TOML)
    #[arg(long, global = true, env = "DAT_SETTINGS")]
    pub settings: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Args {
    /// Global flags to hand to child `dat` processes.
    pub fn forwarded_flags(&self) -> Vec<String> {
        let mut forwarded = Vec::new();
        if let Some(level) = &self.log_level {
            forwarded.push(format!("--log-level={level}"));
        }
        if let Some(settings) = &self.settings {
            forwarded.push(format!("--settings={}", settings.display()));
        }
        if self.log_json {
            forwarded.push("--log-json".to_string());
        }
        if self.verbose {
            forwarded.push("--verbose".to_string());
        }
        if self.quiet {
            forwarded.push("--quiet".to_string());
        }
        forwarded
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the catalog a source offers
    Discover {
        /// Source connector specification (JSON)
        #[arg(long, short = 'c')]
        config: PathBuf,
    },

    /// Read records from a source to stdout
    Read {
        /// Source connector specification (JSON)
        #[arg(long, short = 'c')]
        config: PathBuf,

        /// Catalog of streams to read (JSON)
        #[arg(long)]
        catalog: PathBuf,

        /// Combined stream state to resume from (JSON)
        #[arg(long)]
        state: Option<PathBuf>,
    },

    /// Apply a generator to the records on stdin
    Generate {
        /// Generator connector specification (JSON)
        #[arg(long, short = 'c')]
        config: PathBuf,
    },

    /// Write the records on stdin to a destination in batches
    Write {
        /// Destination connector specification (JSON)
        #[arg(long, short = 'c')]
        config: PathBuf,

        /// Configured catalog (JSON)
        #[arg(long)]
        catalog: PathBuf,

        /// Records per destination write
        #[arg(long, env = "DAT_BATCH_SIZE")]
        batch_size: Option<usize>,
    },

    /// Run read, generate and write for one connection
    Orchestrate {
        /// Connection document (JSON)
        #[arg(long)]
        connection: PathBuf,

        /// How stages are connected
        #[arg(long, value_enum, default_value_t = StageMode::InProcess)]
        stages: StageMode,

        /// Records per destination write
        #[arg(long, env = "DAT_BATCH_SIZE")]
        batch_size: Option<usize>,
    },

    /// Run connections as supervised jobs, mirroring their logs to telemetry
    Supervise {
        /// Connection documents (JSON)
        #[arg(long, required = true, num_args = 1..)]
        connection: Vec<PathBuf>,

        /// Telemetry broker management URL, enables HTTP telemetry
        #[arg(long, env = "DAT_TELEMETRY_URL")]
        telemetry_url: Option<String>,

        /// Directory for temporary connection files
        #[arg(long, env = "DAT_TMP_DIR")]
        tmp_dir: Option<PathBuf>,

        /// Maximum jobs running at once
        #[arg(long)]
        max_concurrent_jobs: Option<usize>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StageMode {
    /// All stages in this process, connected by bounded channels
    InProcess,
    /// One `dat` process per stage, connected by OS pipes
    Processes,
}
