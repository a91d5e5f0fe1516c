// Common test utilities for integration tests
// This module contains shared code for all integration tests: logging setup
// and an in-process WebSocket server the client can be pointed at.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use log::LevelFilter;
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

use chatwire::config::ClientConfig;

// Initialize logging once
static INIT_LOGGER: Once = Once::new();

/// Set up the logger for the tests
pub fn setup_logging() {
    INIT_LOGGER.call_once(|| {
        env_logger::Builder::new()
            .filter_level(LevelFilter::Debug)
            .is_test(true)
            .init();
    });
}

#[derive(Default)]
struct ServerState {
    open: AtomicUsize,
    accepted: AtomicUsize,
    /// Highest number of simultaneously open connections ever observed.
    high_water: AtomicUsize,
    received: Mutex<Vec<Value>>,
    replies: Mutex<HashMap<String, Value>>,
    conns: Mutex<Vec<mpsc::UnboundedSender<Message>>>,
}

/// A scripted chat server on a local port.
///
/// Records every JSON frame it receives. A reply template can be registered
/// per request type; replies echo the request's correlation id when present.
/// Frames can also be pushed to every open connection, server-initiated.
pub struct MockServer {
    addr: SocketAddr,
    state: Arc<ServerState>,
    accept_task: JoinHandle<()>,
}

impl MockServer {
    pub async fn spawn() -> MockServer {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock server");
        let addr = listener.local_addr().expect("mock server addr");
        let state = Arc::new(ServerState::default());

        let accept_state = state.clone();
        let accept_task = tokio::spawn(async move {
            while let Ok((stream, _peer)) = listener.accept().await {
                let state = accept_state.clone();
                tokio::spawn(serve_connection(stream, state));
            }
        });

        MockServer {
            addr,
            state,
            accept_task,
        }
    }

    /// Client configuration pointing at this server, with short timeouts.
    pub fn config(&self) -> ClientConfig {
        ClientConfig {
            server_url: format!("ws://{}", self.addr),
            keepalive_secs: 1,
            request_timeout_secs: 5,
            ..ClientConfig::default()
        }
    }

    /// Register a canned reply for a request type.
    pub fn set_reply(&self, request_type: &str, reply: Value) {
        self.state
            .replies
            .lock()
            .unwrap()
            .insert(request_type.to_string(), reply);
    }

    /// Push a frame to every open connection.
    pub fn push(&self, frame: Value) {
        let conns = self.state.conns.lock().unwrap();
        for tx in conns.iter() {
            let _ = tx.send(Message::Text(frame.to_string()));
        }
    }

    pub fn open_connections(&self) -> usize {
        self.state.open.load(Ordering::SeqCst)
    }

    pub fn total_accepted(&self) -> usize {
        self.state.accepted.load(Ordering::SeqCst)
    }

    pub fn connection_high_water(&self) -> usize {
        self.state.high_water.load(Ordering::SeqCst)
    }

    pub fn received(&self) -> Vec<Value> {
        self.state.received.lock().unwrap().clone()
    }

    pub fn received_of_type(&self, request_type: &str) -> usize {
        self.state
            .received
            .lock()
            .unwrap()
            .iter()
            .filter(|frame| frame.get("type").and_then(Value::as_str) == Some(request_type))
            .count()
    }

    pub fn clear_received(&self) {
        self.state.received.lock().unwrap().clear();
    }

    /// Poll until `predicate` holds or a 5 s deadline expires.
    pub async fn wait_for<F>(&self, what: &str, predicate: F)
    where
        F: Fn(&MockServer) -> bool,
    {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while tokio::time::Instant::now() < deadline {
            if predicate(self) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("timed out waiting for {}", what);
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn serve_connection(stream: TcpStream, state: Arc<ServerState>) {
    let ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(_) => return,
    };
    state.accepted.fetch_add(1, Ordering::SeqCst);
    let now_open = state.open.fetch_add(1, Ordering::SeqCst) + 1;
    state.high_water.fetch_max(now_open, Ordering::SeqCst);

    let (mut sink, mut source) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    state.conns.lock().unwrap().push(tx.clone());

    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sink.send(frame).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = source.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                let value: Value = match serde_json::from_str(&text) {
                    Ok(value) => value,
                    Err(_) => continue,
                };
                state.received.lock().unwrap().push(value.clone());

                let request_type = value
                    .get("type")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                if let Some(request_type) = request_type {
                    let canned = state.replies.lock().unwrap().get(&request_type).cloned();
                    if let Some(mut reply) = canned {
                        if let Some(id) = value.get("id") {
                            reply["id"] = id.clone();
                        }
                        let _ = tx.send(Message::Text(reply.to_string()));
                    }
                }
            }
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }

    state.open.fetch_sub(1, Ordering::SeqCst);
    writer.abort();
}
