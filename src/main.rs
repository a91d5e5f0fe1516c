use anyhow::{anyhow, Result};
use clap::Parser;
use log::{info, LevelFilter};
use std::env;

mod utils;

use chatwire::config::{self, ClientConfig};
use chatwire::ws::SessionManager;

/// Command line arguments for chatwire
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "chatwire: a WebSocket chat client.",
    long_about = "chatwire connects to a chat server over WebSocket, prints the \n\
    signed-in user's chat list, and can dump or post to a single conversation.\n\n\
    Server and user id can also come from CHATWIRE_SERVER / CHATWIRE_USER_ID."
)]
struct Args {
    /// Chat server endpoint, e.g. ws://localhost:8080
    #[arg(long, value_name = "URL")]
    server: Option<String>,

    /// Numeric id of the signed-in user
    #[arg(long, value_name = "ID")]
    user_id: Option<u64>,

    /// Show this friend's conversation after the chat list
    #[arg(long, value_name = "ID")]
    friend: Option<u64>,

    /// Send this message to --friend before fetching the conversation
    #[arg(long, value_name = "TEXT", requires = "friend")]
    message: Option<String>,

    /// Write logs to this file instead of stdout
    #[arg(long, value_name = "PATH")]
    log_file: Option<String>,
}

/// Resolve the server endpoint and user id from flags, environment, config
/// file, or finally an interactive prompt.
fn resolve_session_params(args: &Args, config: &ClientConfig) -> Result<(String, u64)> {
    let server = args
        .server
        .clone()
        .or_else(|| env::var("CHATWIRE_SERVER").ok())
        .unwrap_or_else(|| config.server_url.clone());

    let user_id = match args.user_id.or_else(|| {
        env::var("CHATWIRE_USER_ID")
            .ok()
            .and_then(|raw| raw.parse().ok())
    }) {
        Some(id) => id,
        None => {
            eprintln!("Enter your numeric user id:");
            utils::read_line()?
                .parse()
                .map_err(|e| anyhow!("invalid user id: {}", e))?
        }
    };

    Ok((server, user_id))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    utils::setup_logging(args.log_file.as_deref(), LevelFilter::Info)?;

    let mut config = config::load_config()?.unwrap_or_default();
    let (server, user_id) = resolve_session_params(&args, &config)?;
    config.server_url = server;

    let mut sessions = SessionManager::new(config);
    sessions.set_active_user(Some(user_id)).await?;
    let client = sessions
        .client()
        .ok_or_else(|| anyhow!("no session established"))?;
    info!("session ready for user {}", user_id);

    let chats = client.fetch_chat_list().await?;
    if chats.is_empty() {
        println!("No conversations yet.");
    } else {
        println!("Conversations:");
        for chat in &chats {
            println!(
                "  [{}] {}: {} ({} unread)",
                chat.friend_id, chat.friend_name, chat.last_message, chat.unread_count
            );
        }
    }

    if let Some(friend_id) = args.friend {
        if let Some(text) = &args.message {
            client.send_chat_message(friend_id, text)?;
            println!("Sent to {}: {}", friend_id, text);
        }

        let messages = client.fetch_conversation(friend_id).await?;
        println!("Conversation with {}:", friend_id);
        for message in &messages {
            println!(
                "  {} [{:?}] {}: {}",
                message.created_at.format("%Y-%m-%d %H:%M"),
                message.status,
                message.from.display_name(),
                message.message
            );
        }
    }

    sessions.shutdown().await;
    Ok(())
}
