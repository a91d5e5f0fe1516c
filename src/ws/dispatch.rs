// Inbound message routing.
// One dispatch table per client: correlated replies go to exactly one waiting
// caller, everything else is broadcast to the subscribers of that message kind.

use log::{debug, error, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use super::protocol::{Envelope, MessageKind};

#[derive(Default)]
pub(crate) struct DispatchTable {
    pending: HashMap<Uuid, oneshot::Sender<Envelope>>,
    subscribers: HashMap<MessageKind, HashMap<u64, mpsc::UnboundedSender<Envelope>>>,
    next_token: u64,
}

impl DispatchTable {
    pub(crate) fn register_waiter(&mut self, id: Uuid, tx: oneshot::Sender<Envelope>) {
        self.pending.insert(id, tx);
    }

    pub(crate) fn abandon_waiter(&mut self, id: &Uuid) {
        self.pending.remove(id);
    }

    /// Drop every pending reply waiter. Called when the connection goes away
    /// so callers blocked in `request` fail instead of hanging.
    pub(crate) fn fail_pending(&mut self) {
        if !self.pending.is_empty() {
            debug!("dropping {} pending reply waiter(s)", self.pending.len());
        }
        self.pending.clear();
    }

    pub(crate) fn add_subscriber(
        &mut self,
        kind: MessageKind,
    ) -> (u64, mpsc::UnboundedReceiver<Envelope>) {
        let token = self.next_token;
        self.next_token += 1;
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.entry(kind).or_default().insert(token, tx);
        (token, rx)
    }

    pub(crate) fn remove_subscriber(&mut self, kind: MessageKind, token: u64) {
        if let Some(subs) = self.subscribers.get_mut(&kind) {
            subs.remove(&token);
            if subs.is_empty() {
                self.subscribers.remove(&kind);
            }
        }
    }

    pub(crate) fn subscriber_count(&self, kind: MessageKind) -> usize {
        self.subscribers.get(&kind).map_or(0, HashMap::len)
    }
}

/// Route one inbound envelope through the table.
pub(crate) fn deliver(table: &Mutex<DispatchTable>, envelope: Envelope) {
    let mut guard = match table.lock() {
        Ok(guard) => guard,
        Err(_) => {
            error!("dispatch table lock poisoned, dropping inbound message");
            return;
        }
    };

    // A frame echoing a known correlation id belongs to exactly one caller.
    if let Some(id) = envelope.id {
        if let Some(waiter) = guard.pending.remove(&id) {
            if waiter.send(envelope).is_err() {
                debug!("reply waiter for {} went away before the reply arrived", id);
            }
            return;
        }
        warn!("reply for unknown correlation id {}, broadcasting by type", id);
    }

    let kind = envelope.kind;
    let mut emptied = false;
    match guard.subscribers.get_mut(&kind) {
        Some(subs) => {
            // A closed receiver means the subscriber was dropped mid-delivery.
            subs.retain(|_, tx| tx.send(envelope.clone()).is_ok());
            emptied = subs.is_empty();
        }
        None => debug!("no subscriber for {:?} message, ignoring", kind),
    }
    if emptied {
        guard.subscribers.remove(&kind);
    }
}

/// A live registration in the dispatch table.
///
/// Receives every broadcast frame of its kind. Dropping the subscription
/// removes the registration, so consumers cannot leak listeners.
pub struct Subscription {
    kind: MessageKind,
    token: u64,
    rx: mpsc::UnboundedReceiver<Envelope>,
    table: Weak<Mutex<DispatchTable>>,
}

impl Subscription {
    pub(crate) fn new(
        kind: MessageKind,
        token: u64,
        rx: mpsc::UnboundedReceiver<Envelope>,
        table: &Arc<Mutex<DispatchTable>>,
    ) -> Self {
        Subscription {
            kind,
            token,
            rx,
            table: Arc::downgrade(table),
        }
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// Wait for the next frame of this kind. Returns `None` once the client
    /// is gone and the buffer is drained.
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }

    /// Non-blocking variant for event-loop style polling.
    pub fn try_recv(&mut self) -> Option<Envelope> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(table) = self.table.upgrade() {
            if let Ok(mut guard) = table.lock() {
                guard.remove_subscriber(self.kind, self.token);
            }
        }
    }
}
