use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_PATH: &str = "config/ratings-sync.json";

const SERVER_URL_ENV: &str = "RATINGS_SERVER_URL";
const API_TOKEN_ENV: &str = "RATINGS_API_TOKEN";

/// What `ModerationGate::check_ban_status` assumes when the server cannot be
/// reached and no earlier status is known.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BanCheckFailure {
    /// Treat the user as not banned.
    #[default]
    FailOpen,
    /// Keep the composer disabled until a status is confirmed.
    FailClosed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Jellyfin server root, without the `/Ratings` suffix.
    pub server_url: String,
    pub api_token: Option<String>,
    pub notification_interval_ms: u64,
    pub chat_interval_ms: u64,
    pub online_users_interval_ms: u64,
    pub ban_status_interval_ms: u64,
    pub heartbeat_interval_ms: u64,
    /// `limit` passed to `GET /Chat/Messages`.
    pub message_limit: u32,
    pub max_message_length: usize,
    pub notifications_enabled: bool,
    pub chat_enabled: bool,
    pub ban_check_failure: BanCheckFailure,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8096".to_string(),
            api_token: None,
            notification_interval_ms: 30_000,
            chat_interval_ms: 3_000,
            online_users_interval_ms: 15_000,
            ban_status_interval_ms: 30_000,
            heartbeat_interval_ms: 30_000,
            message_limit: 50,
            max_message_length: 500,
            notifications_enabled: true,
            chat_enabled: true,
            ban_check_failure: BanCheckFailure::FailOpen,
        }
    }
}

impl SyncConfig {
    pub fn notification_interval(&self) -> Duration {
        Duration::from_millis(self.notification_interval_ms)
    }

    pub fn chat_interval(&self) -> Duration {
        Duration::from_millis(self.chat_interval_ms)
    }

    pub fn online_users_interval(&self) -> Duration {
        Duration::from_millis(self.online_users_interval_ms)
    }

    pub fn ban_status_interval(&self) -> Duration {
        Duration::from_millis(self.ban_status_interval_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Overlay `RATINGS_SERVER_URL` / `RATINGS_API_TOKEN` from the environment.
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(SERVER_URL_ENV) {
            if !url.trim().is_empty() {
                self.server_url = url;
            }
        }
        if let Ok(token) = std::env::var(API_TOKEN_ENV) {
            if !token.trim().is_empty() {
                self.api_token = Some(token);
            }
        }
    }
}

pub fn load_config(path: &str) -> SyncConfig {
    let path = Path::new(path);
    match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<SyncConfig>(&content) {
            Ok(config) => config,
            Err(err) => {
                log::warn!("Failed to parse config file {}: {err}", path.display());
                SyncConfig::default()
            }
        },
        Err(err) => {
            log::info!(
                "Config file {} not found ({err}); using defaults",
                path.display()
            );
            SyncConfig::default()
        }
    }
}
