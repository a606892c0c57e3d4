//! # dat Connectors
//!
//! Built-in plugins, registered into a [`Registry`] from a static table.
//!
//! | Role | Plugin | Configuration |
//! |------|--------|---------------|
//! | source | `file.JsonLines` | `dir`: one `<stream>.jsonl` file per stream |
//! | source | `sequence.Counter` | `count`, optional `fail_after` |
//! | generator | `transform.Passthrough` | none |
//! | generator | `transform.SelectFields` | `fields`: keys kept in each record |
//! | destination | `file.JsonLines` | `dir`: records appended per stream |
//!
//! Every plugin reads its options from the `connection_specification` object
//! of its connector specification.

use pipeline_common::Registry;
use serde::Deserialize;

pub mod file;
pub mod sequence;
pub mod transform;

pub use file::{JsonLinesDestination, JsonLinesSource};
pub use sequence::CounterSource;
pub use transform::{Passthrough, SelectFields};

/// Declared specification shape shared by the built-in plugins.
///
/// Only `connection_specification` is plugin-specific; `module_name` and
/// `name` were already checked by the registry.
#[derive(Debug, Clone, Deserialize)]
pub struct PluginSpec<T> {
    pub connection_specification: T,
}

type Registration = fn(&mut Registry, &'static str, &'static str);

struct ConnectorEntry {
    module_name: &'static str,
    name: &'static str,
    register: Registration,
}

macro_rules! connector_table {
    ( $( $register:ident($module:literal, $name:literal) => $plugin:ty ),+ $(,)? ) => {
        &[
            $(
                ConnectorEntry {
                    module_name: $module,
                    name: $name,
                    register: |registry, module_name, name| {
                        registry.$register::<$plugin>(module_name, name);
                    },
                },
            )+
        ]
    };
}

// Static connector table.
static CONNECTORS: &[ConnectorEntry] = connector_table![
    register_source("file", "JsonLines") => file::JsonLinesSource,
    register_source("sequence", "Counter") => sequence::CounterSource,
    register_generator("transform", "Passthrough") => transform::Passthrough,
    register_generator("transform", "SelectFields") => transform::SelectFields,
    register_destination("file", "JsonLines") => file::JsonLinesDestination,
];

/// Register every built-in connector into `registry`.
pub fn register_builtins(registry: &mut Registry) {
    for entry in CONNECTORS {
        (entry.register)(registry, entry.module_name, entry.name);
    }
}

/// A registry holding all built-in connectors.
pub fn builtin_registry() -> Registry {
    let mut registry = Registry::new();
    register_builtins(&mut registry);
    registry
}
