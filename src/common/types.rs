use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A chat message as returned by `GET /Chat/Messages`.
///
/// Immutable once delivered, except for `deleted`, which is a tombstone: the
/// content stays and the renderer shows a placeholder instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub gif_url: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted: bool,
}

impl ChatMessage {
    pub fn is_gif(&self) -> bool {
        self.gif_url.as_deref().is_some_and(|url| !url.is_empty())
    }
}

/// Someone currently typing, as reported by the server's short-TTL snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingUser {
    pub user_id: String,
    #[serde(default)]
    pub user_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnlineUser {
    pub user_id: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub is_moderator: bool,
}

/// Body of `GET /Chat/Messages`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesSnapshot {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub typing_users: Vec<TypingUser>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BanStatus {
    #[serde(default)]
    pub chat_ban: bool,
    /// Mute.
    #[serde(default)]
    pub snooze_ban: bool,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl BanStatus {
    pub const NOT_BANNED: BanStatus = BanStatus {
        chat_ban: false,
        snooze_ban: false,
        expires_at: None,
    };

    pub fn is_restricted(&self) -> bool {
        self.chat_ban || self.snooze_ban
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub is_moderator: bool,
}

impl Role {
    /// Whether moderation affordances (delete others, ban) should be offered.
    pub fn can_moderate(&self) -> bool {
        self.is_admin || self.is_moderator
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    Movie,
    Series,
    Episode,
    Test,
    Other(String),
}

impl NotificationKind {
    pub fn as_str(&self) -> &str {
        match self {
            NotificationKind::Movie => "movie",
            NotificationKind::Series => "series",
            NotificationKind::Episode => "episode",
            NotificationKind::Test => "test",
            NotificationKind::Other(kind) => kind,
        }
    }
}

impl From<&str> for NotificationKind {
    fn from(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "movie" => NotificationKind::Movie,
            "series" => NotificationKind::Series,
            "episode" => NotificationKind::Episode,
            "test" => NotificationKind::Test,
            _ => NotificationKind::Other(value.to_string()),
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for NotificationKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for NotificationKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(NotificationKind::from(raw.as_str()))
    }
}

/// A "new media" alert from `GET /Notifications`. Consumed at most once per
/// session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    pub id: String,
    #[serde(rename = "type", alias = "kind")]
    pub kind: NotificationKind,
    #[serde(default)]
    pub item_id: Option<String>,
    #[serde(default)]
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Outgoing chat draft. Only cleared after the server accepted it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Draft {
    pub content: String,
    pub gif_url: Option<String>,
}

impl Draft {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            gif_url: None,
        }
    }

    pub fn gif(url: impl Into<String>) -> Self {
        Self {
            content: String::new(),
            gif_url: Some(url.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty() && self.gif_url.as_deref().is_none_or(str::is_empty)
    }

    pub fn clear(&mut self) {
        self.content.clear();
        self.gif_url = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BanKind {
    /// Full chat ban.
    Chat,
    /// Mute.
    Snooze,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BanRequest {
    pub user_id: String,
    #[serde(default)]
    pub user_name: String,
    pub ban_type: BanKind,
    /// `None` bans until lifted.
    #[serde(default)]
    pub duration_minutes: Option<u32>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BanEntry {
    pub user_id: String,
    #[serde(default)]
    pub user_name: String,
    pub ban_type: BanKind,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub banned_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Moderator {
    pub user_id: String,
    #[serde(default)]
    pub user_name: String,
}
