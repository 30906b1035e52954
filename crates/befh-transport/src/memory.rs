use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use thiserror::Error;

use crate::connection::{Connection, ConnectionState, Connector, TransportError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MemoryTransportError {
    #[error("connection refused by {0}")]
    Refused(String),
    #[error("connection is {0}")]
    NotOpen(ConnectionState),
    #[error("peer rejected the message")]
    SendRejected,
}

impl TransportError for MemoryTransportError {
    fn kind(&self) -> &'static str {
        match self {
            MemoryTransportError::Refused(_) => "refused",
            MemoryTransportError::NotOpen(_) => "not_open",
            MemoryTransportError::SendRejected => "send_rejected",
        }
    }
}

#[derive(Debug)]
struct ConnectionCell {
    state: ConnectionState,
    fail_sends: bool,
}

#[derive(Debug)]
struct Network {
    initial_state: ConnectionState,
    refused: HashSet<String>,
    connects: HashMap<String, usize>,
    handles: HashMap<String, Vec<Weak<Mutex<ConnectionCell>>>>,
    sent: Vec<(String, String)>,
}

impl Default for Network {
    fn default() -> Self {
        Self {
            initial_state: ConnectionState::Open,
            refused: HashSet::new(),
            connects: HashMap::new(),
            handles: HashMap::new(),
            sent: Vec::new(),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory connector for tests and simulations.
///
/// Clones share one simulated network, so a test can keep a handle while the
/// publisher owns another.
#[derive(Debug, Clone, Default)]
pub struct InMemoryConnector {
    network: Arc<Mutex<Network>>,
}

impl InMemoryConnector {
    /// State new connections report right after `connect`.
    pub fn set_initial_state(&self, state: ConnectionState) {
        lock(&self.network).initial_state = state;
    }

    /// Makes subsequent connects to `uri` fail.
    pub fn refuse(&self, uri: impl Into<String>) {
        lock(&self.network).refused.insert(uri.into());
    }

    pub fn accept(&self, uri: &str) {
        lock(&self.network).refused.remove(uri);
    }

    /// Number of successful connects to `uri` so far.
    pub fn connect_count(&self, uri: &str) -> usize {
        lock(&self.network).connects.get(uri).copied().unwrap_or(0)
    }

    /// Number of connection handles to `uri` that have not been dropped.
    pub fn live_connections(&self, uri: &str) -> usize {
        lock(&self.network)
            .handles
            .get(uri)
            .map(|handles| handles.iter().filter(|h| h.strong_count() > 0).count())
            .unwrap_or(0)
    }

    /// Forces the state of every live connection to `uri`.
    pub fn set_state(&self, uri: &str, state: ConnectionState) {
        self.for_each_live(uri, |cell| cell.state = state);
    }

    /// Makes sends on live connections to `uri` fail, closing them.
    pub fn fail_sends(&self, uri: &str, fail: bool) {
        self.for_each_live(uri, |cell| cell.fail_sends = fail);
    }

    /// Messages delivered to `uri`, in order.
    pub fn sent_to(&self, uri: &str) -> Vec<String> {
        lock(&self.network)
            .sent
            .iter()
            .filter(|(to, _)| to == uri)
            .map(|(_, text)| text.clone())
            .collect()
    }

    /// Drains and returns every delivered `(uri, message)` pair.
    pub fn take_sent(&self) -> Vec<(String, String)> {
        std::mem::take(&mut lock(&self.network).sent)
    }

    fn for_each_live(&self, uri: &str, mut apply: impl FnMut(&mut ConnectionCell)) {
        let network = lock(&self.network);
        for handle in network.handles.get(uri).into_iter().flatten() {
            if let Some(cell) = handle.upgrade() {
                apply(&mut *lock(&cell));
            }
        }
    }
}

impl Connector for InMemoryConnector {
    type Connection = MemoryConnection;
    type Error = MemoryTransportError;

    fn connect(&mut self, uri: &str) -> Result<Self::Connection, Self::Error> {
        let mut network = lock(&self.network);
        if network.refused.contains(uri) {
            return Err(MemoryTransportError::Refused(uri.to_string()));
        }
        let cell = Arc::new(Mutex::new(ConnectionCell {
            state: network.initial_state,
            fail_sends: false,
        }));
        *network.connects.entry(uri.to_string()).or_default() += 1;
        let handles = network.handles.entry(uri.to_string()).or_default();
        handles.retain(|h| h.strong_count() > 0);
        handles.push(Arc::downgrade(&cell));
        Ok(MemoryConnection {
            uri: uri.to_string(),
            cell,
            network: Arc::clone(&self.network),
        })
    }
}

/// Connection handed out by [`InMemoryConnector`].
#[derive(Debug)]
pub struct MemoryConnection {
    uri: String,
    cell: Arc<Mutex<ConnectionCell>>,
    network: Arc<Mutex<Network>>,
}

impl MemoryConnection {
    pub fn uri(&self) -> &str {
        &self.uri
    }
}

impl Connection for MemoryConnection {
    type Error = MemoryTransportError;

    fn state(&self) -> ConnectionState {
        lock(&self.cell).state
    }

    fn send_text(&mut self, text: &str) -> Result<(), Self::Error> {
        {
            let mut cell = lock(&self.cell);
            if cell.state != ConnectionState::Open {
                return Err(MemoryTransportError::NotOpen(cell.state));
            }
            if cell.fail_sends {
                cell.state = ConnectionState::Closed;
                return Err(MemoryTransportError::SendRejected);
            }
        }
        lock(&self.network)
            .sent
            .push((self.uri.clone(), text.to_string()));
        Ok(())
    }
}
