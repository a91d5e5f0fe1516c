// Keepalive pulse: a periodic PING preventing idle-timeout disconnection.
// Exactly two states: armed (task running) and disarmed (no task).

use log::{debug, info, warn};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::protocol::{MessageKind, Request};
use super::ChatClient;

/// Handle to an armed keepalive task.
///
/// The task sends `PING` once per interval while the connection is up and
/// watches for the server's `PONG`. A missing pong is logged, nothing more;
/// dead-connection recovery is the session owner's call. Dropping the handle
/// disarms the pulse, as does losing the connection.
pub struct Keepalive {
    task: JoinHandle<()>,
}

impl Keepalive {
    pub fn arm(client: &ChatClient, interval: Duration) -> Self {
        let client = client.clone();
        let task = tokio::spawn(async move {
            let mut pong = client.subscribe(MessageKind::Pong);
            let mut ticker = interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut awaiting_pong = false;

            info!("keepalive armed at {:?}", interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if awaiting_pong {
                            warn!("no PONG since the previous ping");
                        }
                        if !client.send_immediate(Request::Ping) {
                            // Connection is gone; the pulse disarms itself.
                            info!("keepalive disarmed, connection lost");
                            break;
                        }
                        awaiting_pong = true;
                        debug!("keepalive ping sent");
                    }
                    frame = pong.recv() => {
                        match frame {
                            Some(_) => {
                                awaiting_pong = false;
                                debug!("keepalive pong received");
                            }
                            None => {
                                info!("keepalive disarmed, client went away");
                                break;
                            }
                        }
                    }
                }
            }
        });
        Keepalive { task }
    }

    pub fn is_armed(&self) -> bool {
        !self.task.is_finished()
    }

    /// Explicitly disarm the pulse.
    pub fn disarm(self) {
        self.task.abort();
    }
}

impl Drop for Keepalive {
    fn drop(&mut self) {
        self.task.abort();
    }
}
