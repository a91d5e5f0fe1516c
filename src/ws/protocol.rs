// Wire protocol for the chat server connection.
// Every frame is a JSON envelope: {"type": ..., "id": optional, "payload": ...}.
// The canonical payload field is "payload"; older server builds used "data",
// which is still accepted on inbound frames.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Outgoing request bodies, tagged by the wire `type` field.
///
/// Requests serialize flat into the envelope, so `GetSingleChat { friend_id: 7 }`
/// becomes `{"type":"get_single_chat","friendId":7}` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    #[serde(rename = "get_chat_list")]
    GetChatList,
    #[serde(rename = "get_single_chat")]
    GetSingleChat {
        #[serde(rename = "friendId")]
        friend_id: u64,
    },
    #[serde(rename = "get_all_users")]
    GetAllUsers,
    #[serde(rename = "get_profile")]
    GetProfile {
        #[serde(rename = "userId")]
        user_id: u64,
    },
    #[serde(rename = "send_message")]
    SendMessage {
        #[serde(rename = "fromUserId")]
        from_user_id: u64,
        #[serde(rename = "toUserId")]
        to_user_id: u64,
        message: String,
    },
    #[serde(rename = "PING")]
    Ping,
}

/// Inbound message kinds the client knows how to route.
///
/// Anything else deserializes to `Unknown` and is ignored by the dispatcher;
/// an unrecognized type is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    #[serde(rename = "friend_list")]
    FriendList,
    #[serde(rename = "single_chat")]
    SingleChat,
    #[serde(rename = "user_list")]
    UserList,
    #[serde(rename = "profile")]
    Profile,
    #[serde(rename = "PONG")]
    Pong,
    #[serde(other)]
    Unknown,
}

/// A parsed inbound frame.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// Correlation id echoed back by the server for request/reply traffic.
    /// Absent on unsolicited pushes.
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default, alias = "data")]
    pub payload: Value,
}

/// An outgoing frame: a request body plus an optional correlation id.
#[derive(Debug, Clone, Serialize)]
pub struct RequestEnvelope {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(flatten)]
    pub request: Request,
}

impl RequestEnvelope {
    /// Fire-and-forget frame, no correlation id.
    pub fn push(request: Request) -> Self {
        RequestEnvelope { id: None, request }
    }

    /// Frame carrying a fresh correlation id for request/reply matching.
    pub fn correlated(request: Request) -> Self {
        RequestEnvelope {
            id: Some(Uuid::new_v4()),
            request,
        }
    }
}
