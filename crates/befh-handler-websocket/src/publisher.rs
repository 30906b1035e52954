use std::collections::HashMap;

use befh_core::{EventQueue, Field, FieldValue, Fields, Handler};
use befh_transport::{Connection, ConnectionState, Connector, TransportError};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::connection::WebSocketConnector;

#[derive(Debug, Error)]
pub enum PublisherError {
    #[error("table name must not be empty")]
    EmptyTableName,
    #[error("connecting to {uri} failed: {source}")]
    Connect {
        uri: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// JSON payload sent for every delivered insert.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    pub table_name: String,
    pub data: Map<String, Value>,
}

impl Envelope {
    /// Builds the envelope for a row, leaving out auto-increment fields.
    pub fn from_fields(table_name: &str, fields: &Fields) -> Self {
        let data = fields
            .iter()
            .filter(|(_, field)| !field.is_auto_increment)
            .map(|(name, field)| (name.clone(), serialize(field)))
            .collect();
        Self {
            table_name: table_name.to_string(),
            data,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Converts a field to its wire value.
///
/// Timestamps use the field's own string form; everything else passes the
/// raw value through. Non-finite floats become `null`.
pub fn serialize(field: &Field) -> Value {
    match &field.value {
        FieldValue::Timestamp(_) => Value::String(field.to_string()),
        FieldValue::Null => Value::Null,
        FieldValue::Bool(v) => Value::Bool(*v),
        FieldValue::Int(v) => Value::from(*v),
        FieldValue::UInt(v) => Value::from(*v),
        FieldValue::Float(v) => Value::from(*v),
        FieldValue::Text(v) => Value::String(v.clone()),
    }
}

/// Best-effort publisher keeping at most one connection per table.
///
/// Connections are opened lazily on `create_table`/`insert` against
/// `<connection><table>/`. A failed send evicts the table's connection and
/// drops the event; the next event for that table reconnects. Only connect
/// failures are returned to the caller.
///
/// Not safe for concurrent use; callers serialize access.
pub struct SocketPublisher<C: Connector = WebSocketConnector> {
    connection: String,
    connector: C,
    sockets: HashMap<String, C::Connection>,
}

impl SocketPublisher<WebSocketConnector> {
    pub fn new(connection: impl Into<String>) -> Self {
        Self::with_connector(connection, WebSocketConnector)
    }
}

impl<C: Connector> SocketPublisher<C> {
    pub fn with_connector(connection: impl Into<String>, connector: C) -> Self {
        Self {
            connection: connection.into(),
            connector,
            sockets: HashMap::new(),
        }
    }

    /// Base connection string every table endpoint is derived from.
    pub fn connection(&self) -> &str {
        &self.connection
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn endpoint(&self, table_name: &str) -> String {
        format!("{}{}/", self.connection, table_name)
    }

    /// State of the cached connection for `table_name`, if any.
    pub fn connection_state(&self, table_name: &str) -> Option<ConnectionState> {
        self.sockets.get(table_name).map(|socket| socket.state())
    }

    pub fn connection_count(&self) -> usize {
        self.sockets.len()
    }

    /// Ensures an open connection is cached for `table_name`.
    ///
    /// A missing or non-open entry is replaced by a fresh connection; the old
    /// handle is dropped without a close handshake. Blocks until the connect
    /// attempt finishes. On failure the previous entry is left untouched.
    pub fn connect_or_reuse(&mut self, table_name: &str) -> Result<(), PublisherError> {
        if table_name.is_empty() {
            return Err(PublisherError::EmptyTableName);
        }
        let prior = self.connection_state(table_name);
        if prior == Some(ConnectionState::Open) {
            return Ok(());
        }

        match prior {
            Some(state) => info!("connecting {} [{}]", table_name, state),
            None => info!("connecting {} [none]", table_name),
        }
        let uri = self.endpoint(table_name);
        let socket = self
            .connector
            .connect(&uri)
            .map_err(|err| PublisherError::Connect {
                uri: uri.clone(),
                source: Box::new(err),
            })?;
        self.sockets.insert(table_name.to_string(), socket);
        Ok(())
    }

    fn publish(&mut self, envelope: &Envelope) {
        let table_name = envelope.table_name.as_str();
        let Some(socket) = self.sockets.get_mut(table_name) else {
            return;
        };
        if socket.state() != ConnectionState::Open {
            return;
        }

        let payload = match envelope.to_json() {
            Ok(payload) => payload,
            Err(err) => {
                warn!("envelope encoding failed for {}: {}", table_name, err);
                return;
            }
        };
        if let Err(err) = socket.send_text(&payload) {
            warn!("socket send {} [{}]: {}", table_name, err.kind(), err);
            self.sockets.remove(table_name);
        }
    }
}

impl<C: Connector> Handler for SocketPublisher<C> {
    type Error = PublisherError;

    fn load(&mut self, _queue: &EventQueue) {
        info!("binding connection {} as a publisher", self.connection);
    }

    fn create_table(&mut self, table_name: &str, _fields: &Fields) -> Result<(), Self::Error> {
        self.connect_or_reuse(table_name)
    }

    fn insert(&mut self, table_name: &str, fields: &Fields) -> Result<(), Self::Error> {
        self.connect_or_reuse(table_name)?;
        let envelope = Envelope::from_fields(table_name, fields);
        self.publish(&envelope);
        Ok(())
    }
}

impl<C: Connector> std::fmt::Debug for SocketPublisher<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketPublisher")
            .field("connection", &self.connection)
            .field("tables", &self.sockets.keys().collect::<Vec<_>>())
            .finish()
    }
}
