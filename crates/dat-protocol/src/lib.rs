//! # DAT Protocol
//!
//! Typed envelope and data model shared by every stage of a dat pipeline.
//!
//! Stages exchange newline-delimited JSON: one [`Message`] object per line, with
//! a `type` discriminator selecting which payload field is meaningful.
//!
//! ## Features
//!
//! - [`Message`] envelope with `RECORD`, `STATE`, `LOG` and `CONNECTION_STATUS` kinds
//! - [`ConnectorSpecification`] carrying the plugin selector (`module_name`, `name`)
//! - Opaque [`Catalog`] and [`StreamState`] payloads handed to plugins untouched
//! - [`Connection`] describing one configured pipeline instance
//!

mod catalog;
mod connection;
mod error;
mod message;
mod specification;
mod state;

pub use catalog::{Catalog, DocumentStream, SyncMode};
pub use connection::Connection;
pub use error::{ConnectorError, diagnostic_trace};
pub use message::{
    ConnectionStatus, Level, LogMessage, Message, MessageType, RecordMessage, StateMessage,
    Status, StreamRef, peek_type,
};
pub use specification::ConnectorSpecification;
pub use state::{CombinedState, StreamState, StreamStatus};
