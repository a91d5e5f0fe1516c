// WebSocket client module for chatwire.
// This file holds the client handle itself plus the send paths; the
// connection lifecycle, dispatch table, and per-feature requests live in the
// submodules.

use anyhow::{anyhow, Result};
use log::{debug, warn};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use url::Url;

pub mod connection;
pub mod dispatch;
pub mod history;
pub mod keepalive;
pub mod manager;
pub mod messages;
pub mod protocol;
pub(crate) mod queue;
pub mod users;

pub use dispatch::Subscription;
pub use keepalive::Keepalive;
pub use manager::SessionManager;
pub use protocol::{Envelope, MessageKind, Request, RequestEnvelope};

use crate::config::ClientConfig;
use dispatch::DispatchTable;
use queue::SendQueue;

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Failures on the outgoing send path.
///
/// A send while disconnected is not an error by itself; the request is parked
/// in the offline queue and flushed on the next connect. Callers only see an
/// error once that queue is full.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("disconnected and the offline queue is full")]
    QueueFull,
    #[error("request could not be serialized: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Handle to one logical chat-server connection, bound to a single user id.
///
/// Cheap to clone; every clone shares the same connection, dispatch table and
/// offline queue. Created by [`SessionManager`] on login, torn down on logout
/// or user switch.
#[derive(Clone)]
pub struct ChatClient {
    user_id: u64,
    endpoint: Url,
    request_timeout: Duration,
    connect_attempts: u32,
    state: Arc<Mutex<ConnectionState>>,
    dispatch: Arc<Mutex<DispatchTable>>,
    outbound: Arc<Mutex<Option<mpsc::UnboundedSender<WsMessage>>>>,
    queue: Arc<Mutex<SendQueue>>,
    pumps: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl ChatClient {
    /// Build a disconnected client addressed to `user_id`. Call
    /// [`connect`](Self::connect) to open the socket.
    pub fn new(config: &ClientConfig, user_id: u64) -> Result<Self> {
        let endpoint = config.ws_url(user_id)?;
        Ok(ChatClient {
            user_id,
            endpoint,
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            connect_attempts: config.connect_attempts.max(1),
            state: Arc::new(Mutex::new(ConnectionState::Disconnected)),
            dispatch: Arc::new(Mutex::new(DispatchTable::default())),
            outbound: Arc::new(Mutex::new(None)),
            queue: Arc::new(Mutex::new(SendQueue::new(config.offline_queue_capacity))),
            pumps: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn user_id(&self) -> u64 {
        self.user_id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
            .lock()
            .map(|guard| *guard)
            .unwrap_or(ConnectionState::Disconnected)
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub(crate) fn set_state(&self, next: ConnectionState) {
        if let Ok(mut guard) = self.state.lock() {
            *guard = next;
        }
    }

    /// Register for every broadcast frame of `kind`. The registration is
    /// removed when the returned [`Subscription`] is dropped.
    pub fn subscribe(&self, kind: MessageKind) -> Subscription {
        let (token, rx) = self.dispatch.lock().unwrap().add_subscriber(kind);
        Subscription::new(kind, token, rx, &self.dispatch)
    }

    /// Number of live subscriptions for `kind`. Exposed so tests and
    /// diagnostics can verify listener bookkeeping.
    pub fn subscriber_count(&self, kind: MessageKind) -> usize {
        self.dispatch
            .lock()
            .map(|table| table.subscriber_count(kind))
            .unwrap_or(0)
    }

    /// Requests parked in the offline queue.
    pub fn pending_sends(&self) -> usize {
        self.queue.lock().map(|queue| queue.len()).unwrap_or(0)
    }

    /// Fire-and-forget send. While disconnected the request is queued for the
    /// next connect instead of being transmitted.
    pub fn send(&self, request: Request) -> Result<(), SendError> {
        self.send_envelope(RequestEnvelope::push(request))
    }

    /// Send a correlated request and wait for the reply that echoes its id.
    ///
    /// The reply is routed to this caller alone; it never reaches type
    /// subscribers. Bounded by the configured request timeout.
    pub async fn request(&self, request: Request) -> Result<Envelope> {
        let envelope = RequestEnvelope::correlated(request);
        let correlation_id = match envelope.id {
            Some(id) => id,
            None => return Err(anyhow!("correlated envelope without an id")),
        };

        let (tx, rx) = oneshot::channel();
        self.dispatch
            .lock()
            .unwrap()
            .register_waiter(correlation_id, tx);

        if let Err(e) = self.send_envelope(envelope) {
            self.dispatch
                .lock()
                .unwrap()
                .abandon_waiter(&correlation_id);
            return Err(anyhow!("failed to send request: {}", e));
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(anyhow!("connection closed before the reply arrived")),
            Err(_) => {
                self.dispatch
                    .lock()
                    .unwrap()
                    .abandon_waiter(&correlation_id);
                Err(anyhow!(
                    "no reply within {:?} for correlation id {}",
                    self.request_timeout,
                    correlation_id
                ))
            }
        }
    }

    fn send_envelope(&self, envelope: RequestEnvelope) -> Result<(), SendError> {
        if !self.is_connected() {
            return self.enqueue(envelope);
        }
        let text = serde_json::to_string(&envelope)?;
        if let Ok(guard) = self.outbound.lock() {
            if let Some(tx) = guard.as_ref() {
                if tx.send(WsMessage::Text(text)).is_ok() {
                    return Ok(());
                }
            }
        }
        // The writer died under us; treat it like a disconnected send.
        self.enqueue(envelope)
    }

    fn enqueue(&self, envelope: RequestEnvelope) -> Result<(), SendError> {
        let mut queue = self.queue.lock().unwrap();
        match queue.push(envelope) {
            Ok(()) => {
                debug!(
                    "connection down, queued request ({} now pending)",
                    queue.len()
                );
                Ok(())
            }
            Err(rejected) => {
                warn!("offline queue full, dropping {:?}", rejected.request);
                Err(SendError::QueueFull)
            }
        }
    }

    /// Transmit now or not at all. Used for traffic that must never be
    /// replayed from the offline queue (keepalive pings).
    pub(crate) fn send_immediate(&self, request: Request) -> bool {
        if !self.is_connected() {
            debug!("dropping {:?}, connection is down", request);
            return false;
        }
        let text = match serde_json::to_string(&RequestEnvelope::push(request)) {
            Ok(text) => text,
            Err(e) => {
                warn!("request could not be serialized: {}", e);
                return false;
            }
        };
        self.outbound
            .lock()
            .map(|guard| {
                guard
                    .as_ref()
                    .map(|tx| tx.send(WsMessage::Text(text)).is_ok())
                    .unwrap_or(false)
            })
            .unwrap_or(false)
    }

    /// Feed one already-parsed envelope through the dispatch table, exactly as
    /// the reader task would. Test seam.
    #[doc(hidden)]
    pub fn deliver(&self, envelope: Envelope) {
        dispatch::deliver(&self.dispatch, envelope);
    }
}
