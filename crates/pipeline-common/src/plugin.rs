//! Capability contracts implemented by connector plugins.
//!
//! Plugins receive their typed configuration once at construction
//! (`from_spec`) and then serve one stage invocation. Every capability that
//! produces messages returns a [`MessageStream`]: a lazy, one-shot iterator
//! whose `Err` items are failures raised while producing output.

use dat_protocol::{Catalog, CombinedState, ConnectorError, Message};
use serde::de::DeserializeOwned;

/// Lazy, finite, non-restartable sequence of output messages.
pub type MessageStream<'a> = Box<dyn Iterator<Item = Result<Message, ConnectorError>> + Send + 'a>;

/// Reads records out of an external system.
pub trait Source: Send {
    /// Describe the streams this source can offer.
    fn discover(&self) -> Result<Catalog, ConnectorError>;

    /// Stream the requested `catalog` starting from `state`.
    ///
    /// Consumes the source: a read drives the whole stage.
    fn read(self: Box<Self>, catalog: Catalog, state: CombinedState) -> MessageStream<'static>;
}

/// Turns one input record into zero or more output messages.
pub trait Generator: Send {
    fn generate(&mut self, message: Message) -> MessageStream<'_>;
}

/// Persists a bounded batch of records into an external system.
///
/// The returned stream carries acknowledgement or status messages.
pub trait Destination: Send {
    fn write<'a>(&'a mut self, catalog: &'a Catalog, batch: Vec<Message>) -> MessageStream<'a>;
}

/// A [`Source`] constructible from its own declared specification type.
pub trait SourcePlugin: Source + Sized + 'static {
    type Spec: DeserializeOwned;

    fn from_spec(spec: Self::Spec) -> Result<Self, ConnectorError>;
}

/// A [`Generator`] constructible from its own declared specification type.
pub trait GeneratorPlugin: Generator + Sized + 'static {
    type Spec: DeserializeOwned;

    fn from_spec(spec: Self::Spec) -> Result<Self, ConnectorError>;
}

/// A [`Destination`] constructible from its own declared specification type.
pub trait DestinationPlugin: Destination + Sized + 'static {
    type Spec: DeserializeOwned;

    fn from_spec(spec: Self::Spec) -> Result<Self, ConnectorError>;
}
