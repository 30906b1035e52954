//! Blocking WebSocket connections.
//!
//! Each connection owns a worker thread running a current-thread tokio
//! runtime. The worker performs the handshake, keeps reading inbound frames
//! so peer closes are observed, and writes outbound text on request. Public
//! calls block the caller until the worker reports back, so none of them may
//! be made from inside an async runtime.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};

use befh_transport::{Connection, ConnectionState, Connector, TransportError};
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::{mpsc as tokio_mpsc, oneshot};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::debug;

const OUTBOUND_QUEUE_CAPACITY: usize = 16;

#[derive(Debug, Error)]
pub enum WebSocketError {
    #[error("websocket connect to {uri} failed: {source}")]
    Connect {
        uri: String,
        #[source]
        source: tungstenite::Error,
    },
    #[error("websocket send failed: {0}")]
    Send(#[source] tungstenite::Error),
    #[error("connection worker is closed")]
    Closed,
    #[error("failed to spawn connection worker: {0}")]
    Spawn(#[from] std::io::Error),
}

impl TransportError for WebSocketError {
    fn kind(&self) -> &'static str {
        match self {
            WebSocketError::Connect { .. } => "connect",
            WebSocketError::Send(tungstenite::Error::ConnectionClosed) => "connection_closed",
            WebSocketError::Send(tungstenite::Error::AlreadyClosed) => "already_closed",
            WebSocketError::Send(tungstenite::Error::Io(_)) => "io",
            WebSocketError::Send(tungstenite::Error::Protocol(_)) => "protocol",
            WebSocketError::Send(_) => "send",
            WebSocketError::Closed => "closed",
            WebSocketError::Spawn(_) => "spawn",
        }
    }
}

/// Opens [`WebSocketConnection`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl Connector for WebSocketConnector {
    type Connection = WebSocketConnection;
    type Error = WebSocketError;

    fn connect(&mut self, uri: &str) -> Result<Self::Connection, Self::Error> {
        WebSocketConnection::connect(uri)
    }
}

struct OutboundMessage {
    text: String,
    reply: oneshot::Sender<Result<(), tungstenite::Error>>,
}

/// Outbound-only WebSocket connection with a blocking API.
pub struct WebSocketConnection {
    uri: String,
    state: Arc<AtomicU8>,
    outbound_tx: tokio_mpsc::Sender<OutboundMessage>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl WebSocketConnection {
    /// Connects to `uri`, blocking until the handshake succeeds or fails.
    pub fn connect(uri: &str) -> Result<Self, WebSocketError> {
        let (startup_tx, startup_rx) = mpsc::sync_channel::<Result<(), tungstenite::Error>>(1);
        let (outbound_tx, outbound_rx) =
            tokio_mpsc::channel::<OutboundMessage>(OUTBOUND_QUEUE_CAPACITY);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let state = Arc::new(AtomicU8::new(ConnectionState::Connecting.as_u8()));

        let worker_state = Arc::clone(&state);
        let worker_uri = uri.to_string();
        let worker = thread::Builder::new()
            .name("befh-websocket".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(err) => {
                        set_state(&worker_state, ConnectionState::Closed);
                        let _ = startup_tx.send(Err(tungstenite::Error::Io(err)));
                        return;
                    }
                };
                runtime.block_on(run_connection_worker(
                    worker_uri,
                    worker_state,
                    outbound_rx,
                    startup_tx,
                    shutdown_rx,
                ));
            })?;

        match startup_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                uri: uri.to_string(),
                state,
                outbound_tx,
                shutdown_tx: Some(shutdown_tx),
                worker: Some(worker),
            }),
            Ok(Err(source)) => {
                let _ = worker.join();
                Err(WebSocketError::Connect {
                    uri: uri.to_string(),
                    source,
                })
            }
            Err(_) => {
                let _ = worker.join();
                Err(WebSocketError::Closed)
            }
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }
}

impl Connection for WebSocketConnection {
    type Error = WebSocketError;

    fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn send_text(&mut self, text: &str) -> Result<(), Self::Error> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.outbound_tx
            .blocking_send(OutboundMessage {
                text: text.to_string(),
                reply: reply_tx,
            })
            .map_err(|_| WebSocketError::Closed)?;
        reply_rx
            .blocking_recv()
            .map_err(|_| WebSocketError::Closed)?
            .map_err(WebSocketError::Send)
    }
}

impl std::fmt::Debug for WebSocketConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketConnection")
            .field("uri", &self.uri)
            .field("state", &self.state())
            .finish()
    }
}

impl Drop for WebSocketConnection {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn set_state(state: &AtomicU8, next: ConnectionState) {
    state.store(next.as_u8(), Ordering::Release);
}

async fn run_connection_worker(
    uri: String,
    state: Arc<AtomicU8>,
    mut outbound_rx: tokio_mpsc::Receiver<OutboundMessage>,
    startup_tx: mpsc::SyncSender<Result<(), tungstenite::Error>>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let stream = match connect_async(uri.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(err) => {
            set_state(&state, ConnectionState::Closed);
            let _ = startup_tx.send(Err(err));
            return;
        }
    };
    set_state(&state, ConnectionState::Open);
    let _ = startup_tx.send(Ok(()));

    let (mut write, mut read) = stream.split();
    loop {
        tokio::select! {
            _ = &mut shutdown_rx => break,
            maybe_out = outbound_rx.recv() => {
                let Some(OutboundMessage { text, reply }) = maybe_out else {
                    break;
                };
                let result = write.send(Message::Text(text)).await;
                if result.is_err() {
                    set_state(&state, ConnectionState::Closed);
                }
                let _ = reply.send(result);
            }
            maybe_in = read.next() => {
                match maybe_in {
                    Some(Ok(Message::Close(frame))) => {
                        debug!("websocket {}: close received {:?}", uri, frame);
                        set_state(&state, ConnectionState::Closing);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        debug!("websocket {}: read error: {}", uri, err);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    set_state(&state, ConnectionState::Closed);
}
