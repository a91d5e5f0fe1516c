// Stateful views over the live connection, one per screen-sized slice of
// remote state. A view fires its request on open, then folds matching
// inbound frames into its local snapshot; frames of any other kind never
// touch it. Dropping a view deregisters its subscription.

use log::warn;
use serde::de::DeserializeOwned;

use crate::models::{ChatMessage, ChatSummary, User};
use crate::ws::{ChatClient, Envelope, MessageKind, Request, SendError, Subscription};

fn decode_payload<T: DeserializeOwned>(envelope: Envelope) -> Option<T> {
    match serde_json::from_value(envelope.payload) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(
                "ignoring {:?} payload that failed to decode: {}",
                envelope.kind, e
            );
            None
        }
    }
}

/// The conversation overview, one row per friend.
pub struct ChatListView {
    client: ChatClient,
    subscription: Subscription,
    chats: Vec<ChatSummary>,
}

impl ChatListView {
    /// Subscribe to `friend_list` pushes and request the current list.
    pub fn open(client: &ChatClient) -> Result<Self, SendError> {
        let subscription = client.subscribe(MessageKind::FriendList);
        client.send(Request::GetChatList)?;
        Ok(ChatListView {
            client: client.clone(),
            subscription,
            chats: Vec::new(),
        })
    }

    pub fn chats(&self) -> &[ChatSummary] {
        &self.chats
    }

    /// Ask the server for a fresh list.
    pub fn refresh(&self) -> Result<(), SendError> {
        self.client.send(Request::GetChatList)
    }

    /// Drain buffered frames into the snapshot. Returns whether it changed.
    pub fn poll(&mut self) -> bool {
        let mut updated = false;
        while let Some(envelope) = self.subscription.try_recv() {
            if let Some(chats) = decode_payload(envelope) {
                self.chats = chats;
                updated = true;
            }
        }
        updated
    }

    /// Wait for the next list update. `None` once the client is gone.
    pub async fn next_update(&mut self) -> Option<&[ChatSummary]> {
        loop {
            let envelope = self.subscription.recv().await?;
            if let Some(chats) = decode_payload(envelope) {
                self.chats = chats;
                return Some(&self.chats);
            }
        }
    }
}

/// One conversation, keyed by the friend's user id.
pub struct ConversationView {
    client: ChatClient,
    subscription: Subscription,
    friend_id: u64,
    messages: Vec<ChatMessage>,
}

impl ConversationView {
    pub fn open(client: &ChatClient, friend_id: u64) -> Result<Self, SendError> {
        let subscription = client.subscribe(MessageKind::SingleChat);
        client.send(Request::GetSingleChat { friend_id })?;
        Ok(ConversationView {
            client: client.clone(),
            subscription,
            friend_id,
            messages: Vec::new(),
        })
    }

    pub fn friend_id(&self) -> u64 {
        self.friend_id
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Switch the view to another conversation: the snapshot resets and the
    /// history of the new friend is requested.
    pub fn set_friend(&mut self, friend_id: u64) -> Result<(), SendError> {
        self.friend_id = friend_id;
        self.messages.clear();
        self.client.send(Request::GetSingleChat { friend_id })
    }

    pub fn poll(&mut self) -> bool {
        let mut updated = false;
        while let Some(envelope) = self.subscription.try_recv() {
            if let Some(messages) = decode_payload(envelope) {
                self.messages = messages;
                updated = true;
            }
        }
        updated
    }

    pub async fn next_update(&mut self) -> Option<&[ChatMessage]> {
        loop {
            let envelope = self.subscription.recv().await?;
            if let Some(messages) = decode_payload(envelope) {
                self.messages = messages;
                return Some(&self.messages);
            }
        }
    }
}

/// The server-wide user directory.
pub struct UserListView {
    client: ChatClient,
    subscription: Subscription,
    users: Vec<User>,
}

impl UserListView {
    /// Requests the directory unconditionally on open.
    pub fn open(client: &ChatClient) -> Result<Self, SendError> {
        let subscription = client.subscribe(MessageKind::UserList);
        client.send(Request::GetAllUsers)?;
        Ok(UserListView {
            client: client.clone(),
            subscription,
            users: Vec::new(),
        })
    }

    pub fn users(&self) -> &[User] {
        &self.users
    }

    pub fn refresh(&self) -> Result<(), SendError> {
        self.client.send(Request::GetAllUsers)
    }

    pub fn poll(&mut self) -> bool {
        let mut updated = false;
        while let Some(envelope) = self.subscription.try_recv() {
            if let Some(users) = decode_payload(envelope) {
                self.users = users;
                updated = true;
            }
        }
        updated
    }
}

/// A single user's profile.
pub struct ProfileView {
    subscription: Subscription,
    profile: Option<User>,
}

impl ProfileView {
    pub fn open(client: &ChatClient, user_id: u64) -> Result<Self, SendError> {
        let subscription = client.subscribe(MessageKind::Profile);
        client.send(Request::GetProfile { user_id })?;
        Ok(ProfileView {
            subscription,
            profile: None,
        })
    }

    pub fn profile(&self) -> Option<&User> {
        self.profile.as_ref()
    }

    pub fn poll(&mut self) -> bool {
        let mut updated = false;
        while let Some(envelope) = self.subscription.try_recv() {
            if let Some(profile) = decode_payload(envelope) {
                self.profile = Some(profile);
                updated = true;
            }
        }
        updated
    }
}
