//! Single-stage commands. Each runs a blocking loop over stdin/stdout.

use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use dat_protocol::{Catalog, CombinedState};
use pipeline_common::{GenerateStage, Pipeline, ReadPump, Registry, WriteStage, write_line};
use tracing::info;

/// Print the catalog offered by the source configured in `config`.
pub fn discover<W: Write + ?Sized>(registry: &Registry, config: &str, out: &mut W) -> Result<()> {
    let source = registry.source(config).context("Failed to resolve source")?;
    let catalog = source.discover().context("Discovery failed")?;
    let line = serde_json::to_string(&catalog)?;
    write_line(out, &line)?;
    Ok(())
}

/// Read every requested stream to `out`. Returns the number of lines written.
pub fn read<W: Write + ?Sized>(
    registry: &Registry,
    config: &str,
    catalog: Catalog,
    state: CombinedState,
    out: &mut W,
) -> Result<usize> {
    let source = registry.source(config).context("Failed to resolve source")?;
    let mut pump = ReadPump::new(source, catalog, state);
    for line in pump.by_ref() {
        write_line(out, &line)?;
    }
    info!(lines = pump.emitted(), "Read stage finished");
    Ok(pump.emitted())
}

pub fn generate<R: BufRead, W: Write + ?Sized>(
    registry: &Registry,
    config: &str,
    input: R,
    out: &mut W,
) -> Result<()> {
    let generator = registry
        .generator(config)
        .context("Failed to resolve generator")?;
    Pipeline::new()
        .add_processor(GenerateStage::new(generator))
        .run_lines(input, out)?;
    Ok(())
}

pub fn write<R: BufRead, W: Write + ?Sized>(
    registry: &Registry,
    config: &str,
    catalog: Catalog,
    batch_size: usize,
    input: R,
    out: &mut W,
) -> Result<()> {
    let destination = registry
        .destination(config)
        .context("Failed to resolve destination")?;
    Pipeline::new()
        .add_processor(WriteStage::with_batch_size(destination, catalog, batch_size))
        .run_lines(input, out)?;
    Ok(())
}
