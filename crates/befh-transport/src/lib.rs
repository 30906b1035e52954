//! Connection contracts used by befh publishers.
//!
//! Publishers talk to a `Connector` and the `Connection`s it returns; the
//! in-memory implementation backs tests and simulations.

pub mod connection;
pub mod memory;

pub use connection::{Connection, ConnectionState, Connector, TransportError};
pub use memory::{InMemoryConnector, MemoryConnection, MemoryTransportError};
