use std::net::SocketAddr;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use befh_core::{Field, Fields, Handler};
use befh_handler_websocket::{PublisherError, SocketPublisher, WebSocketConnection};
use befh_transport::{Connection, ConnectionState};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

struct TestServer {
    addr: SocketAddr,
    received: mpsc::Receiver<(String, String)>,
    accepted: mpsc::Receiver<String>,
}

impl TestServer {
    fn base(&self) -> String {
        format!("ws://{}/", self.addr)
    }
}

/// Loopback server reporting `(path, text)` for every text frame it gets.
fn spawn_server(close_after_first: bool) -> TestServer {
    let (addr_tx, addr_rx) = mpsc::channel::<SocketAddr>();
    let (msg_tx, msg_rx) = mpsc::channel::<(String, String)>();
    let (accept_tx, accept_rx) = mpsc::channel::<String>();

    thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("server runtime should build");
        runtime.block_on(async move {
            let listener = TcpListener::bind("127.0.0.1:0")
                .await
                .expect("server bind should work");
            addr_tx
                .send(listener.local_addr().expect("server addr should resolve"))
                .expect("addr channel open");
            while let Ok((stream, _)) = listener.accept().await {
                let msg_tx = msg_tx.clone();
                let accept_tx = accept_tx.clone();
                tokio::spawn(serve_connection(stream, msg_tx, accept_tx, close_after_first));
            }
        });
    });

    let addr = addr_rx
        .recv_timeout(RECV_TIMEOUT)
        .expect("server should report its address");
    TestServer {
        addr,
        received: msg_rx,
        accepted: accept_rx,
    }
}

async fn serve_connection(
    stream: TcpStream,
    msg_tx: mpsc::Sender<(String, String)>,
    accept_tx: mpsc::Sender<String>,
    close_after_first: bool,
) {
    let mut path = String::new();
    let ws = accept_hdr_async(
        stream,
        |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            path = req.uri().path().to_string();
            Ok(resp)
        },
    )
    .await;
    let Ok(mut ws) = ws else {
        return;
    };
    let _ = accept_tx.send(path.clone());

    while let Some(Ok(msg)) = ws.next().await {
        if let Message::Text(text) = msg {
            let _ = msg_tx.send((path.clone(), text));
            if close_after_first {
                let _ = ws.close(None).await;
            }
        }
    }
}

fn row(name: &str) -> Fields {
    let mut fields = Fields::new();
    fields.insert("id".to_string(), Field::auto_increment(1_i64));
    fields.insert("name".to_string(), Field::new(name));
    fields
}

fn wait_until_not_open(publisher: &SocketPublisher, table: &str) {
    let deadline = Instant::now() + RECV_TIMEOUT;
    while publisher.connection_state(table) == Some(ConnectionState::Open) {
        assert!(Instant::now() < deadline, "connection never left OPEN");
        thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn publisher_delivers_envelopes_to_table_endpoint() {
    let server = spawn_server(false);
    let mut publisher = SocketPublisher::new(server.base());

    publisher
        .create_table("users", &Fields::new())
        .expect("create_table should connect");
    assert_eq!(
        server.accepted.recv_timeout(RECV_TIMEOUT).expect("accepted"),
        "/users/"
    );

    publisher.insert("users", &row("Alice")).expect("insert");
    publisher.insert("users", &row("Bob")).expect("insert");

    for expected in ["Alice", "Bob"] {
        let (path, text) = server
            .received
            .recv_timeout(RECV_TIMEOUT)
            .expect("server should receive the envelope");
        assert_eq!(path, "/users/");
        let payload: Value = serde_json::from_str(&text).expect("payload should be json");
        assert_eq!(
            payload,
            json!({"table_name": "users", "data": {"name": expected}})
        );
    }
    assert!(server.accepted.try_recv().is_err(), "connection should be reused");
}

#[test]
fn publisher_reconnects_after_peer_closes() {
    let server = spawn_server(true);
    let mut publisher = SocketPublisher::new(server.base());

    publisher.insert("logs", &row("first")).expect("insert");
    let (_, first) = server.received.recv_timeout(RECV_TIMEOUT).expect("first");
    assert!(first.contains("first"));

    wait_until_not_open(&publisher, "logs");

    publisher.insert("logs", &row("second")).expect("insert");
    let (_, second) = server.received.recv_timeout(RECV_TIMEOUT).expect("second");
    assert!(second.contains("second"));

    let accepted: Vec<String> = server.accepted.try_iter().collect();
    assert_eq!(accepted, vec!["/logs/".to_string(), "/logs/".to_string()]);
    assert_eq!(publisher.connection_count(), 1);
}

#[test]
fn unreachable_endpoint_fails_the_call() {
    let addr = std::net::TcpListener::bind("127.0.0.1:0")
        .and_then(|listener| listener.local_addr())
        .expect("free port");
    let mut publisher = SocketPublisher::new(format!("ws://{addr}/"));

    let err = publisher
        .insert("orders", &row("nobody"))
        .expect_err("connect should fail");
    assert!(matches!(err, PublisherError::Connect { .. }));
    assert_eq!(publisher.connection_state("orders"), None);
}

#[test]
fn connection_reports_open_and_sends_text() {
    let server = spawn_server(false);
    let mut conn = WebSocketConnection::connect(&format!("{}raw/", server.base()))
        .expect("connect should work");
    assert_eq!(conn.state(), ConnectionState::Open);
    assert!(conn.uri().ends_with("/raw/"));

    conn.send_text("ping").expect("send should work");
    let (path, text) = server.received.recv_timeout(RECV_TIMEOUT).expect("text");
    assert_eq!(path, "/raw/");
    assert_eq!(text, "ping");
}
