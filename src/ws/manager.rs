// Session ownership: one live connection per signed-in user, torn down and
// rebuilt whenever the authenticated user id changes.

use anyhow::Result;
use log::{info, warn};
use std::time::Duration;

use super::{ChatClient, Keepalive};
use crate::config::ClientConfig;

struct ActiveSession {
    client: ChatClient,
    keepalive: Keepalive,
}

/// Owns the client for the currently authenticated user.
///
/// There is no ambient global connection; whoever needs the session holds a
/// `ChatClient` clone handed out by this manager. At most one connection
/// exists at a time: the previous session is fully closed before a new one is
/// opened.
pub struct SessionManager {
    config: ClientConfig,
    active: Option<ActiveSession>,
}

impl SessionManager {
    pub fn new(config: ClientConfig) -> Self {
        SessionManager {
            config,
            active: None,
        }
    }

    /// React to an authentication change.
    ///
    /// Any existing session is disconnected first. `None` or user id `0`
    /// means signed out: no connection is attempted. A user id always opens a
    /// fresh connection, even when it equals the previous one.
    pub async fn set_active_user(&mut self, user_id: Option<u64>) -> Result<()> {
        self.teardown().await;

        let user_id = match user_id {
            Some(0) => {
                warn!("ignoring user id 0, staying signed out");
                None
            }
            other => other,
        };
        let Some(user_id) = user_id else {
            return Ok(());
        };

        let client = ChatClient::new(&self.config, user_id)?;
        client.connect().await?;
        let keepalive = Keepalive::arm(&client, Duration::from_secs(self.config.keepalive_secs));
        info!("session established for user {}", user_id);
        self.active = Some(ActiveSession { client, keepalive });
        Ok(())
    }

    /// The active session's client, if signed in.
    pub fn client(&self) -> Option<ChatClient> {
        self.active.as_ref().map(|session| session.client.clone())
    }

    pub fn active_user(&self) -> Option<u64> {
        self.active.as_ref().map(|session| session.client.user_id())
    }

    /// Disconnect and drop the active session, if any.
    pub async fn shutdown(&mut self) {
        self.teardown().await;
    }

    async fn teardown(&mut self) {
        if let Some(session) = self.active.take() {
            info!("closing session for user {}", session.client.user_id());
            session.keepalive.disarm();
            if let Err(e) = session.client.disconnect().await {
                warn!("error while closing previous session: {}", e);
            }
        }
    }
}
