// Conversation history queries: the chat-list overview and single
// conversations, fetched over the live connection.

use anyhow::{anyhow, Result};
use log::{debug, warn};

use super::protocol::{MessageKind, Request};
use super::ChatClient;
use crate::models::{ChatMessage, ChatSummary};

impl ChatClient {
    /// Fetch the signed-in user's conversation overview.
    pub async fn fetch_chat_list(&self) -> Result<Vec<ChatSummary>> {
        debug!("requesting chat list");
        let reply = self.request(Request::GetChatList).await?;
        if reply.kind != MessageKind::FriendList {
            warn!("chat list reply arrived as {:?}", reply.kind);
        }
        serde_json::from_value(reply.payload)
            .map_err(|e| anyhow!("malformed friend_list payload: {}", e))
    }

    /// Fetch the full message history of one conversation.
    pub async fn fetch_conversation(&self, friend_id: u64) -> Result<Vec<ChatMessage>> {
        debug!("requesting conversation with {}", friend_id);
        let reply = self.request(Request::GetSingleChat { friend_id }).await?;
        if reply.kind != MessageKind::SingleChat {
            warn!("conversation reply arrived as {:?}", reply.kind);
        }
        serde_json::from_value(reply.payload)
            .map_err(|e| anyhow!("malformed single_chat payload: {}", e))
    }
}
