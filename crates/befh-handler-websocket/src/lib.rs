//! WebSocket publisher handler for befh.
//!
//! `SocketPublisher` forwards table inserts as JSON envelopes over one
//! persistent WebSocket per table, reconnecting lazily whenever the cached
//! connection is missing or no longer open. Delivery is best-effort: send
//! failures evict the connection and drop the event.

pub mod connection;
pub mod publisher;

pub use connection::{WebSocketConnection, WebSocketConnector, WebSocketError};
pub use publisher::{serialize, Envelope, PublisherError, SocketPublisher};
