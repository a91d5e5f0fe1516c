// Connection management: connect with retry, stream pump tasks, disconnect.

use anyhow::{anyhow, Result};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::protocol::Envelope;
use super::{dispatch, ChatClient, ConnectionState};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

impl ChatClient {
    /// Open the socket for this client's user id.
    ///
    /// Retries with exponential backoff before giving up. On success any
    /// requests parked in the offline queue are flushed in order.
    pub async fn connect(&self) -> Result<()> {
        self.set_state(ConnectionState::Connecting);
        let mut last_error = None;

        for attempt in 1..=self.connect_attempts {
            info!(
                "connecting to {} (attempt {}/{})",
                self.endpoint, attempt, self.connect_attempts
            );
            match timeout(CONNECT_TIMEOUT, connect_async(self.endpoint.as_str())).await {
                Ok(Ok((stream, _response))) => {
                    self.install_stream(stream);
                    let flushed = self.flush_queue();
                    if flushed > 0 {
                        info!("flushed {} queued request(s) after connect", flushed);
                    }
                    info!("connected as user {}", self.user_id);
                    return Ok(());
                }
                Ok(Err(e)) => {
                    warn!("connection attempt {} failed: {}", attempt, e);
                    last_error = Some(anyhow!(e));
                }
                Err(_) => {
                    warn!(
                        "connection attempt {} timed out after {:?}",
                        attempt, CONNECT_TIMEOUT
                    );
                    last_error = Some(anyhow!("connection timed out"));
                }
            }

            if attempt < self.connect_attempts {
                let backoff = Duration::from_millis(500 * 2u64.pow(attempt));
                info!("retrying connection in {:?}", backoff);
                tokio::time::sleep(backoff).await;
            }
        }

        self.set_state(ConnectionState::Disconnected);
        Err(last_error.unwrap_or_else(|| anyhow!("failed to connect to {}", self.endpoint)))
    }

    /// Close the connection and stop the pump tasks. Safe to call when
    /// already disconnected.
    pub async fn disconnect(&self) -> Result<()> {
        let sender = self.outbound.lock().ok().and_then(|mut guard| guard.take());
        if sender.is_none() && self.state() == ConnectionState::Disconnected {
            debug!("no active connection to disconnect");
            return Ok(());
        }

        info!("disconnecting user {}", self.user_id);
        self.set_state(ConnectionState::Disconnected);
        if let Some(tx) = sender {
            // The writer forwards the close frame, then exits when the
            // channel drops here.
            let _ = tx.send(WsMessage::Close(None));
        }

        let handles: Vec<_> = match self.pumps.lock() {
            Ok(mut pumps) => pumps.drain(..).collect(),
            Err(_) => Vec::new(),
        };
        for mut handle in handles {
            if timeout(SHUTDOWN_GRACE, &mut handle).await.is_err() {
                handle.abort();
            }
        }

        if let Ok(mut table) = self.dispatch.lock() {
            table.fail_pending();
        }
        Ok(())
    }

    fn install_stream(&self, stream: WebSocketStream<MaybeTlsStream<TcpStream>>) {
        // A reconnect replaces any stale pumps from the previous socket.
        if let Ok(mut pumps) = self.pumps.lock() {
            for handle in pumps.drain(..) {
                handle.abort();
            }
        }

        let (mut sink, mut source) = stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();

        let writer = tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                let closing = matches!(frame, WsMessage::Close(_));
                if let Err(e) = sink.send(frame).await {
                    debug!("writer stopping: {}", e);
                    break;
                }
                if closing {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let state = self.state.clone();
        let table = self.dispatch.clone();
        let reader = tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                match frame {
                    Ok(WsMessage::Text(text)) => match serde_json::from_str::<Envelope>(&text) {
                        Ok(envelope) => dispatch::deliver(&table, envelope),
                        // A frame we cannot parse never takes the reader down;
                        // it degrades to "no state update".
                        Err(e) => warn!("discarding malformed frame: {}", e),
                    },
                    Ok(WsMessage::Close(_)) => {
                        info!("server closed the connection");
                        break;
                    }
                    Ok(_) => {} // ping/pong/binary control traffic
                    Err(e) => {
                        error!("connection error: {}", e);
                        break;
                    }
                }
            }
            if let Ok(mut guard) = state.lock() {
                *guard = ConnectionState::Disconnected;
            }
            if let Ok(mut table) = table.lock() {
                table.fail_pending();
            }
        });

        if let Ok(mut guard) = self.outbound.lock() {
            *guard = Some(tx);
        }
        if let Ok(mut pumps) = self.pumps.lock() {
            pumps.push(writer);
            pumps.push(reader);
        }
        self.set_state(ConnectionState::Connected);
    }

    fn flush_queue(&self) -> usize {
        let drained = match self.queue.lock() {
            Ok(mut queue) => queue.drain(),
            Err(_) => return 0,
        };
        let mut sent = 0;
        for envelope in drained {
            let text = match serde_json::to_string(&envelope) {
                Ok(text) => text,
                Err(e) => {
                    warn!("dropping queued request that failed to serialize: {}", e);
                    continue;
                }
            };
            let delivered = self
                .outbound
                .lock()
                .ok()
                .and_then(|guard| guard.as_ref().map(|tx| tx.send(WsMessage::Text(text)).is_ok()))
                .unwrap_or(false);
            if !delivered {
                warn!("writer went away while flushing the offline queue");
                break;
            }
            sent += 1;
        }
        sent
    }
}
