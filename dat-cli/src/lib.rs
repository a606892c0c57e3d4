//! Library target for the `dat` binary.
//!
//! Command implementations live here so they can be exercised by tests
//! without going through a subprocess.

pub mod cli;
pub mod commands;
pub mod config;
pub mod logging;
