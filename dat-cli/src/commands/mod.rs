mod orchestrate;
mod stage;
mod supervise;

use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;

pub use orchestrate::{orchestrate_in_process, orchestrate_processes};
pub use stage::{discover, generate, read, write};
pub use supervise::{SuperviseOptions, supervise};

pub fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = read_file(path)?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid JSON in {}", path.display()))
}
