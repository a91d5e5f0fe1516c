// Bounded FIFO for requests issued while the connection is down.
// Queued frames are flushed in order the next time a connection is established.

use std::collections::VecDeque;

use super::protocol::RequestEnvelope;

pub(crate) struct SendQueue {
    items: VecDeque<RequestEnvelope>,
    capacity: usize,
}

impl SendQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        SendQueue {
            items: VecDeque::new(),
            capacity,
        }
    }

    /// Returns the envelope back to the caller when the queue is full.
    pub(crate) fn push(&mut self, envelope: RequestEnvelope) -> Result<(), RequestEnvelope> {
        if self.items.len() >= self.capacity {
            return Err(envelope);
        }
        self.items.push_back(envelope);
        Ok(())
    }

    pub(crate) fn drain(&mut self) -> Vec<RequestEnvelope> {
        self.items.drain(..).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }
}
