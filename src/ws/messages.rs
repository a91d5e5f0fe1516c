// Outgoing chat messages.

use log::debug;

use super::protocol::Request;
use super::{ChatClient, SendError};

impl ChatClient {
    /// Send a chat message to `to_user_id`.
    ///
    /// Fire-and-forget: there is no optimistic local append and no delivery
    /// confirmation here. The message becomes visible once the server pushes
    /// the updated conversation back through the `single_chat` stream.
    pub fn send_chat_message(&self, to_user_id: u64, text: &str) -> Result<(), SendError> {
        debug!("sending message to {}", to_user_id);
        self.send(Request::SendMessage {
            from_user_id: self.user_id(),
            to_user_id,
            message: text.to_string(),
        })
    }
}
