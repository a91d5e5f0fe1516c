// Request/reply correlation and push-driven view updates over a live socket.

mod common;
use common::{setup_logging, MockServer};

use std::time::Duration;

use serde_json::{json, Value};

use chatwire::views::{ChatListView, ConversationView, UserListView};
use chatwire::ws::{ChatClient, MessageKind};

fn user_json(id: u64) -> Value {
    json!({
        "id": id,
        "firstName": "Ada",
        "lastName": "Lovelace",
        "countryCode": "+44",
        "contactNo": "7700900000"
    })
}

fn message_json(text: &str) -> Value {
    json!({
        "from": user_json(1),
        "to": user_json(42),
        "message": text,
        "createdAt": "2024-05-01T10:00:00Z",
        "updatedAt": "2024-05-01T10:00:00Z",
        "status": "READ"
    })
}

fn chat_row_json(friend_id: u64) -> Value {
    json!({
        "friendId": friend_id,
        "friendName": "Ada Lovelace",
        "lastMessage": "see you",
        "lastTimeStamp": "2024-05-01T10:00:00Z",
        "unreadCount": 3,
        "profileImage": null
    })
}

#[tokio::test]
async fn test_fetch_chat_list_roundtrip() {
    setup_logging();
    let server = MockServer::spawn().await;
    server.set_reply(
        "get_chat_list",
        json!({"type": "friend_list", "payload": [chat_row_json(42)]}),
    );
    let client = ChatClient::new(&server.config(), 1).unwrap();
    client.connect().await.unwrap();

    let chats = client.fetch_chat_list().await.unwrap();
    assert_eq!(chats.len(), 1);
    assert_eq!(chats[0].friend_id, 42);
    assert_eq!(chats[0].unread_count, 3);

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_concurrent_fetches_route_independently() {
    setup_logging();
    let server = MockServer::spawn().await;
    server.set_reply(
        "get_chat_list",
        json!({"type": "friend_list", "payload": []}),
    );
    server.set_reply(
        "get_all_users",
        json!({"type": "user_list", "payload": [user_json(5)]}),
    );
    let client = ChatClient::new(&server.config(), 1).unwrap();
    client.connect().await.unwrap();

    let (chats, users) = tokio::join!(client.fetch_chat_list(), client.fetch_all_users());
    assert!(chats.unwrap().is_empty());
    let users = users.unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].id, 5);

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_correlated_reply_skips_type_subscribers() {
    setup_logging();
    let server = MockServer::spawn().await;
    server.set_reply(
        "get_single_chat",
        json!({"type": "single_chat", "payload": [message_json("archived")]}),
    );
    let client = ChatClient::new(&server.config(), 1).unwrap();
    client.connect().await.unwrap();

    let mut bystander = client.subscribe(MessageKind::SingleChat);
    let messages = client.fetch_conversation(42).await.unwrap();
    assert_eq!(messages.len(), 1);
    // The reply carried our correlation id, so it went to the caller alone.
    assert!(bystander.try_recv().is_none());

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_view_receives_pushed_updates() {
    setup_logging();
    let server = MockServer::spawn().await;
    let client = ChatClient::new(&server.config(), 1).unwrap();
    client.connect().await.unwrap();

    let mut view = ConversationView::open(&client, 42).unwrap();
    server
        .wait_for("initial history request", |s| {
            s.received_of_type("get_single_chat") == 1
        })
        .await;
    assert!(view.messages().is_empty());

    server.push(json!({"type": "single_chat", "payload": [message_json("pushed")]}));
    let updated = tokio::time::timeout(Duration::from_secs(5), view.next_update())
        .await
        .expect("push within deadline")
        .expect("client still alive");
    assert_eq!(updated.len(), 1);
    assert_eq!(updated[0].message, "pushed");

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_chat_list_view_sees_server_refresh() {
    setup_logging();
    let server = MockServer::spawn().await;
    let client = ChatClient::new(&server.config(), 1).unwrap();
    client.connect().await.unwrap();

    let mut view = ChatListView::open(&client).unwrap();
    server
        .wait_for("chat list request", |s| {
            s.received_of_type("get_chat_list") == 1
        })
        .await;

    // An unrelated push must not disturb the view.
    server.push(json!({"type": "user_list", "payload": [user_json(5)]}));
    server.push(json!({"type": "friend_list", "payload": [chat_row_json(8)]}));
    let updated = tokio::time::timeout(Duration::from_secs(5), view.next_update())
        .await
        .expect("push within deadline")
        .expect("client still alive");
    assert_eq!(updated.len(), 1);
    assert_eq!(updated[0].friend_id, 8);

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_user_list_requests_directory_exactly_once_on_open() {
    setup_logging();
    let server = MockServer::spawn().await;
    let client = ChatClient::new(&server.config(), 1).unwrap();
    client.connect().await.unwrap();

    let view = UserListView::open(&client).unwrap();
    server
        .wait_for("directory request", |s| {
            s.received_of_type("get_all_users") == 1
        })
        .await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(server.received_of_type("get_all_users"), 1);

    drop(view);
    assert_eq!(client.subscriber_count(MessageKind::UserList), 0);

    client.disconnect().await.unwrap();
}
