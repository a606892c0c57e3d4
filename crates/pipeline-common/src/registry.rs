//! Plugin resolution by `(module_name, name)`.
//!
//! Resolution parses the configuration twice: first as a base
//! [`ConnectorSpecification`] to find the plugin, then as the plugin's own
//! declared specification type so plugin-specific required fields are
//! validated before the plugin runs.

use std::collections::HashMap;
use std::fmt;

use dat_protocol::{ConnectorError, ConnectorSpecification};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::plugin::{
    Destination, DestinationPlugin, Generator, GeneratorPlugin, Source, SourcePlugin,
};

/// Capability role a plugin is registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginRole {
    Source,
    Generator,
    Destination,
}

impl fmt::Display for PluginRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginRole::Source => write!(f, "source"),
            PluginRole::Generator => write!(f, "generator"),
            PluginRole::Destination => write!(f, "destination"),
        }
    }
}

/// Start-up failure while resolving a plugin. Never retried.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Invalid connector specification: {0}")]
    InvalidSpecification(#[source] serde_json::Error),

    #[error("No {role} plugin registered as {module_name}.{name}")]
    UnknownPlugin {
        role: PluginRole,
        module_name: String,
        name: String,
    },

    #[error("Invalid specification for {plugin}: {source}")]
    InvalidPluginSpecification {
        plugin: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Plugin {plugin} failed to initialize: {source}")]
    Init {
        plugin: String,
        #[source]
        source: ConnectorError,
    },
}

type Factory<T> =
    Box<dyn Fn(&ConnectorSpecification, &Value) -> Result<Box<T>, ResolveError> + Send + Sync>;

/// Registry of plugin factories, populated once at process start.
#[derive(Default)]
pub struct Registry {
    sources: HashMap<(String, String), Factory<dyn Source>>,
    generators: HashMap<(String, String), Factory<dyn Generator>>,
    destinations: HashMap<(String, String), Factory<dyn Destination>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_source<S: SourcePlugin>(
        &mut self,
        module_name: impl Into<String>,
        name: impl Into<String>,
    ) -> &mut Self {
        let factory: Factory<dyn Source> = Box::new(|base, raw| {
            let spec = plugin_spec::<S::Spec>(base, raw)?;
            let source: Box<dyn Source> =
                Box::new(S::from_spec(spec).map_err(|source| init_error(base, source))?);
            Ok(source)
        });
        self.sources.insert((module_name.into(), name.into()), factory);
        self
    }

    pub fn register_generator<G: GeneratorPlugin>(
        &mut self,
        module_name: impl Into<String>,
        name: impl Into<String>,
    ) -> &mut Self {
        let factory: Factory<dyn Generator> = Box::new(|base, raw| {
            let spec = plugin_spec::<G::Spec>(base, raw)?;
            let generator: Box<dyn Generator> =
                Box::new(G::from_spec(spec).map_err(|source| init_error(base, source))?);
            Ok(generator)
        });
        self.generators.insert((module_name.into(), name.into()), factory);
        self
    }

    pub fn register_destination<D: DestinationPlugin>(
        &mut self,
        module_name: impl Into<String>,
        name: impl Into<String>,
    ) -> &mut Self {
        let factory: Factory<dyn Destination> = Box::new(|base, raw| {
            let spec = plugin_spec::<D::Spec>(base, raw)?;
            let destination: Box<dyn Destination> =
                Box::new(D::from_spec(spec).map_err(|source| init_error(base, source))?);
            Ok(destination)
        });
        self.destinations
            .insert((module_name.into(), name.into()), factory);
        self
    }

    /// Resolve a source from its raw JSON configuration.
    pub fn source(&self, raw: &str) -> Result<Box<dyn Source>, ResolveError> {
        let value = parse_raw(raw)?;
        resolve(&self.sources, PluginRole::Source, &value)
    }

    pub fn generator(&self, raw: &str) -> Result<Box<dyn Generator>, ResolveError> {
        let value = parse_raw(raw)?;
        resolve(&self.generators, PluginRole::Generator, &value)
    }

    pub fn destination(&self, raw: &str) -> Result<Box<dyn Destination>, ResolveError> {
        let value = parse_raw(raw)?;
        resolve(&self.destinations, PluginRole::Destination, &value)
    }

    /// Resolve a source from an already parsed specification, e.g. one
    /// embedded in a connection document.
    pub fn source_for(
        &self,
        spec: &ConnectorSpecification,
    ) -> Result<Box<dyn Source>, ResolveError> {
        let value = serde_json::to_value(spec).map_err(ResolveError::InvalidSpecification)?;
        resolve(&self.sources, PluginRole::Source, &value)
    }

    pub fn generator_for(
        &self,
        spec: &ConnectorSpecification,
    ) -> Result<Box<dyn Generator>, ResolveError> {
        let value = serde_json::to_value(spec).map_err(ResolveError::InvalidSpecification)?;
        resolve(&self.generators, PluginRole::Generator, &value)
    }

    pub fn destination_for(
        &self,
        spec: &ConnectorSpecification,
    ) -> Result<Box<dyn Destination>, ResolveError> {
        let value = serde_json::to_value(spec).map_err(ResolveError::InvalidSpecification)?;
        resolve(&self.destinations, PluginRole::Destination, &value)
    }

    /// Registered `(role, module_name, name)` triples, sorted for display.
    pub fn plugins(&self) -> Vec<(PluginRole, String, String)> {
        let mut plugins: Vec<_> = self
            .sources
            .keys()
            .map(|(m, n)| (PluginRole::Source, m.clone(), n.clone()))
            .chain(
                self.generators
                    .keys()
                    .map(|(m, n)| (PluginRole::Generator, m.clone(), n.clone())),
            )
            .chain(
                self.destinations
                    .keys()
                    .map(|(m, n)| (PluginRole::Destination, m.clone(), n.clone())),
            )
            .collect();
        plugins.sort_by(|a, b| (a.0 as u8, &a.1, &a.2).cmp(&(b.0 as u8, &b.1, &b.2)));
        plugins
    }
}

fn parse_raw(raw: &str) -> Result<Value, ResolveError> {
    serde_json::from_str(raw).map_err(ResolveError::InvalidSpecification)
}

fn resolve<T: ?Sized>(
    factories: &HashMap<(String, String), Factory<T>>,
    role: PluginRole,
    raw: &Value,
) -> Result<Box<T>, ResolveError> {
    let base =
        ConnectorSpecification::deserialize(raw).map_err(ResolveError::InvalidSpecification)?;
    let key = (base.module_name.clone(), base.name.clone());
    let factory = factories
        .get(&key)
        .ok_or_else(|| ResolveError::UnknownPlugin {
            role,
            module_name: key.0.clone(),
            name: key.1.clone(),
        })?;
    debug!(%role, plugin = %base.qualified_name(), "Resolved plugin");
    factory(&base, raw)
}

fn plugin_spec<S: serde::de::DeserializeOwned>(
    base: &ConnectorSpecification,
    raw: &Value,
) -> Result<S, ResolveError> {
    S::deserialize(raw).map_err(|source| ResolveError::InvalidPluginSpecification {
        plugin: base.qualified_name(),
        source,
    })
}

fn init_error(base: &ConnectorSpecification, source: ConnectorError) -> ResolveError {
    ResolveError::Init {
        plugin: base.qualified_name(),
        source,
    }
}
