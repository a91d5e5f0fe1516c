// Directory queries: the server-wide user list and single profiles.

use anyhow::{anyhow, Result};
use log::{debug, warn};

use super::protocol::{MessageKind, Request};
use super::ChatClient;
use crate::models::User;

impl ChatClient {
    /// Fetch every registered user, for starting new conversations.
    pub async fn fetch_all_users(&self) -> Result<Vec<User>> {
        debug!("requesting user list");
        let reply = self.request(Request::GetAllUsers).await?;
        if reply.kind != MessageKind::UserList {
            warn!("user list reply arrived as {:?}", reply.kind);
        }
        serde_json::from_value(reply.payload)
            .map_err(|e| anyhow!("malformed user_list payload: {}", e))
    }

    /// Fetch one user's profile.
    pub async fn fetch_profile(&self, user_id: u64) -> Result<User> {
        debug!("requesting profile of {}", user_id);
        let reply = self.request(Request::GetProfile { user_id }).await?;
        if reply.kind != MessageKind::Profile {
            warn!("profile reply arrived as {:?}", reply.kind);
        }
        serde_json::from_value(reply.payload)
            .map_err(|e| anyhow!("malformed profile payload: {}", e))
    }
}
