// Client configuration, persisted as JSON in the platform config directory.

use anyhow::{anyhow, Result};
use log::info;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Read;
use std::path::PathBuf;
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base endpoint of the chat server, e.g. `ws://chat.example.com:8080`.
    pub server_url: String,
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_offline_queue_capacity")]
    pub offline_queue_capacity: usize,
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
}

fn default_keepalive_secs() -> u64 {
    30
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_offline_queue_capacity() -> usize {
    64
}

fn default_connect_attempts() -> u32 {
    3
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            server_url: "ws://localhost:8080".to_string(),
            keepalive_secs: default_keepalive_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            offline_queue_capacity: default_offline_queue_capacity(),
            connect_attempts: default_connect_attempts(),
        }
    }
}

impl ClientConfig {
    /// The per-user connection endpoint: `{server_url}/ws/{user_id}`.
    pub fn ws_url(&self, user_id: u64) -> Result<Url> {
        let base = self.server_url.trim_end_matches('/');
        Url::parse(&format!("{}/ws/{}", base, user_id))
            .map_err(|e| anyhow!("invalid server url '{}': {}", self.server_url, e))
    }
}

pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| anyhow!("could not determine config directory"))?
        .join("chatwire");

    if !config_dir.exists() {
        fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

static CONFIG_PATH_OVERRIDE: OnceCell<PathBuf> = OnceCell::new();

/// Redirect config load/save to an explicit path (used by tests).
pub fn override_config_path(path: PathBuf) {
    let _ = CONFIG_PATH_OVERRIDE.set(path);
}

fn get_config_path() -> Result<PathBuf> {
    if let Some(path) = CONFIG_PATH_OVERRIDE.get() {
        return Ok(path.clone());
    }
    Ok(get_config_dir()?.join("config.json"))
}

pub fn save_config(config: &ClientConfig) -> Result<()> {
    let config_path = get_config_path()?;
    let file = File::create(config_path)?;
    serde_json::to_writer_pretty(file, config)?;

    info!("Configuration saved for {}", config.server_url);
    Ok(())
}

pub fn load_config() -> Result<Option<ClientConfig>> {
    let config_path = get_config_path()?;

    if !config_path.exists() {
        return Ok(None);
    }

    let config_path_str = config_path.display().to_string();

    let mut file = File::open(config_path)?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;

    let config: ClientConfig = serde_json::from_str(&contents)?;
    info!(
        "Loaded configuration for {} from {}",
        config.server_url, config_path_str
    );

    Ok(Some(config))
}
