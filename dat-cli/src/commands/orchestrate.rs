//! Running all three stages of one connection.
//!
//! In-process, the stages run on blocking tasks joined by bounded channels.
//! With `--stages processes`, every stage is its own `dat` process and the
//! stages are joined by OS pipes.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use anyhow::{Context, Result, bail};
use dat_protocol::Connection;
use pipeline_common::{
    ChannelPipeline, GenerateStage, PipelineError, ReadPump, Registry, WriteStage, write_line,
};
use serde::Serialize;
use tokio::process::{Child, Command};
use tracing::{debug, info};

const STAGE_DIR_PREFIX: &str = "dat_stages_";

/// Run `connection` inside this process, writing the protocol output of the
/// write stage to `out`. Returns the number of lines written.
pub async fn orchestrate_in_process<W>(
    registry: &Registry,
    connection: &Connection,
    batch_size: usize,
    channel_size: usize,
    out: W,
) -> Result<usize>
where
    W: Write + Send + 'static,
{
    let source = registry
        .source_for(&connection.source)
        .context("Failed to resolve source")?;
    let generator = registry
        .generator_for(&connection.generator)
        .context("Failed to resolve generator")?;
    let destination = registry
        .destination_for(&connection.destination)
        .context("Failed to resolve destination")?;

    info!(
        connection_id = %connection.id,
        source = %connection.source.qualified_name(),
        generator = %connection.generator.qualified_name(),
        destination = %connection.destination.qualified_name(),
        batch_size,
        "Orchestrating connection"
    );

    let input = ReadPump::new(source, connection.catalog.clone(), connection.state.clone());
    let mut out = out;
    let delivered = ChannelPipeline::new()
        .with_channel_size(channel_size)
        .add_processor(GenerateStage::new(generator))
        .add_processor(WriteStage::with_batch_size(
            destination,
            connection.catalog.clone(),
            batch_size,
        ))
        .run(input, move |line: String| {
            write_line(&mut out, &line).map_err(PipelineError::from)
        })
        .await?;

    info!(connection_id = %connection.id, lines = delivered, "Connection finished");
    Ok(delivered)
}

/// Run `connection` as three `exe` processes piped together.
///
/// `global_args` are passed to every stage before the subcommand. The last
/// stage inherits this process's stdout.
pub async fn orchestrate_processes(
    exe: &Path,
    global_args: &[String],
    connection: &Connection,
    batch_size: usize,
) -> Result<()> {
    let dir = tempfile::Builder::new()
        .prefix(STAGE_DIR_PREFIX)
        .tempdir()
        .context("Failed to create stage directory")?;
    let source = write_json(dir.path(), "source.json", &connection.source)?;
    let generator = write_json(dir.path(), "generator.json", &connection.generator)?;
    let destination = write_json(dir.path(), "destination.json", &connection.destination)?;
    let catalog = write_json(dir.path(), "catalog.json", &connection.catalog)?;
    let state = write_json(dir.path(), "state.json", &connection.state)?;

    info!(
        connection_id = %connection.id,
        exe = %exe.display(),
        batch_size,
        "Orchestrating connection as stage processes"
    );

    let mut read = stage_command(exe, global_args, "read")
        .arg("--config")
        .arg(&source)
        .arg("--catalog")
        .arg(&catalog)
        .arg("--state")
        .arg(&state)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .spawn()
        .context("Failed to spawn read stage")?;
    let read_out: Stdio = read
        .stdout
        .take()
        .context("read stage stdout was not captured")?
        .try_into()?;

    let mut generate = stage_command(exe, global_args, "generate")
        .arg("--config")
        .arg(&generator)
        .stdin(read_out)
        .stdout(Stdio::piped())
        .spawn()
        .context("Failed to spawn generate stage")?;
    let generate_out: Stdio = generate
        .stdout
        .take()
        .context("generate stage stdout was not captured")?
        .try_into()?;

    let mut write = stage_command(exe, global_args, "write")
        .arg("--config")
        .arg(&destination)
        .arg("--catalog")
        .arg(&catalog)
        .arg("--batch-size")
        .arg(batch_size.to_string())
        .stdin(generate_out)
        .stdout(Stdio::inherit())
        .spawn()
        .context("Failed to spawn write stage")?;

    let (read_status, generate_status, write_status) =
        tokio::join!(wait(&mut read), wait(&mut generate), wait(&mut write));

    let failed: Vec<String> = [
        ("read", read_status?),
        ("generate", generate_status?),
        ("write", write_status?),
    ]
    .into_iter()
    .filter(|(_, status)| !status.success())
    .map(|(stage, status)| format!("{stage} stage {status}"))
    .collect();

    // stage files must outlive every stage process
    drop(dir);
    if !failed.is_empty() {
        bail!("Connection {} failed: {}", connection.id, failed.join(", "));
    }
    info!(connection_id = %connection.id, "Connection finished");
    Ok(())
}

fn stage_command(exe: &Path, global_args: &[String], subcommand: &str) -> Command {
    let mut command = Command::new(exe);
    command
        .args(global_args)
        .arg(subcommand)
        .stderr(Stdio::inherit())
        .kill_on_drop(true);
    command
}

async fn wait(child: &mut Child) -> Result<ExitStatus> {
    let pid = child.id();
    let status = child.wait().await?;
    debug!(?pid, %status, "Stage process exited");
    Ok(status)
}

fn write_json<T: Serialize>(dir: &Path, name: &str, value: &T) -> Result<PathBuf> {
    let path = dir.join(name);
    let raw = serde_json::to_vec(value)?;
    std::fs::write(&path, raw).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}
