use std::io::{self, BufWriter};
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use dat_cli::cli::{Args, Commands, StageMode};
use dat_cli::commands::{self, SuperviseOptions, read_file, read_json};
use dat_cli::config::Settings;
use dat_cli::logging::init_logging;
use dat_connectors::builtin_registry;
use dat_protocol::{CombinedState, Connection};
use tracing::error;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let logging = init_logging(
        args.log_level.as_deref(),
        args.verbose,
        args.quiet,
        args.log_json,
    );
    if let Err(e) = logging {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }

    if let Err(e) = run(args).await {
        error!("{e:#}");
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let settings = Settings::load(args.settings.as_deref())?;
    let global_args = args.forwarded_flags();

    match args.command {
        Commands::Discover { config } => {
            let config = read_file(&config)?;
            blocking(move || {
                commands::discover(&builtin_registry(), &config, &mut io::stdout().lock())
            })
            .await
        }
        Commands::Read {
            config,
            catalog,
            state,
        } => {
            let config = read_file(&config)?;
            let catalog = read_json(&catalog)?;
            let state: CombinedState = match state {
                Some(path) => read_json(&path)?,
                None => CombinedState::new(),
            };
            blocking(move || {
                commands::read(
                    &builtin_registry(),
                    &config,
                    catalog,
                    state,
                    &mut io::stdout().lock(),
                )
                .map(|_| ())
            })
            .await
        }
        Commands::Generate { config } => {
            let config = read_file(&config)?;
            blocking(move || {
                commands::generate(
                    &builtin_registry(),
                    &config,
                    io::stdin().lock(),
                    &mut io::stdout().lock(),
                )
            })
            .await
        }
        Commands::Write {
            config,
            catalog,
            batch_size,
        } => {
            let config = read_file(&config)?;
            let catalog = read_json(&catalog)?;
            let batch_size = settings.batch_size(batch_size);
            blocking(move || {
                commands::write(
                    &builtin_registry(),
                    &config,
                    catalog,
                    batch_size,
                    io::stdin().lock(),
                    &mut io::stdout().lock(),
                )
            })
            .await
        }
        Commands::Orchestrate {
            connection,
            stages,
            batch_size,
        } => {
            let connection = Connection::from_json(&read_file(&connection)?)
                .context("Invalid connection document")?;
            let batch_size = settings.batch_size(batch_size);
            match stages {
                StageMode::InProcess => {
                    commands::orchestrate_in_process(
                        &builtin_registry(),
                        &connection,
                        batch_size,
                        settings.pipeline.channel_size,
                        BufWriter::new(io::stdout()),
                    )
                    .await?;
                }
                StageMode::Processes => {
                    let exe = std::env::current_exe()
                        .context("Failed to locate the dat executable")?;
                    commands::orchestrate_processes(&exe, &global_args, &connection, batch_size)
                        .await?;
                }
            }
            Ok(())
        }
        Commands::Supervise {
            connection,
            telemetry_url,
            tmp_dir,
            max_concurrent_jobs,
        } => {
            let connections = connection
                .iter()
                .map(|path| read_file(path))
                .collect::<Result<Vec<_>>>()?;
            commands::supervise(
                settings,
                SuperviseOptions {
                    connections,
                    global_args,
                    telemetry_url,
                    tmp_dir,
                    max_concurrent_jobs,
                },
            )
            .await?;
            Ok(())
        }
    }
}

/// Stage commands block on stdin and stdout.
async fn blocking<F>(f: F) -> Result<()>
where
    F: FnOnce() -> Result<()> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .context("Stage task failed")?
}
