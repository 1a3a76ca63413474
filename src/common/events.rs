use std::fmt;

use chrono::{DateTime, Utc};

use super::types::{
    BanEntry, ChatMessage, Moderator, NotificationEvent, OnlineUser, Role, TypingUser,
};

/// Events the sync core sends up to the UI layer.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    SessionStarted { user_id: String },
    LoggedOut,
    /// The server rejected our credentials; the core has already logged out.
    AuthExpired,
    Notification(NotificationEvent),
    Chat(ChatDelta),
    OnlineUsers(Vec<OnlineUser>),
    Composer(ComposerState),
    Role(Role),
    Send(SendOutcome),
    Bans(Vec<BanEntry>),
    Moderators(Vec<Moderator>),
    Notice(Notice),
}

/// What changed between two consecutive message snapshots, keyed by ID.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatDelta {
    /// New messages, in snapshot order.
    pub added: Vec<ChatMessage>,
    /// Messages whose fields changed other than the tombstone flag.
    pub updated: Vec<ChatMessage>,
    /// IDs that flipped to `deleted` in this snapshot.
    pub tombstoned: Vec<String>,
    /// IDs that fell out of the snapshot window.
    pub removed: Vec<String>,
    /// Set only when the typing snapshot differs from the previous one.
    pub typing: Option<Vec<TypingUser>>,
}

impl ChatDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.updated.is_empty()
            && self.tombstoned.is_empty()
            && self.removed.is_empty()
            && self.typing.is_none()
    }
}

/// Why an outgoing action was refused before reaching the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    Empty,
    TooLong { max: usize, actual: usize },
    Banned { until: Option<DateTime<Utc>> },
    Muted { until: Option<DateTime<Utc>> },
    /// Fail-closed policy and the ban status could not be confirmed.
    StatusUnknown,
    NotPermitted,
    NotLoggedIn,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenyReason::Empty => write!(f, "message is empty"),
            DenyReason::TooLong { max, actual } => {
                write!(f, "message is too long ({actual}/{max} characters)")
            }
            DenyReason::Banned { until: Some(until) } => {
                write!(f, "you are banned from chat until {}", until.format("%Y-%m-%d %H:%M UTC"))
            }
            DenyReason::Banned { until: None } => write!(f, "you are banned from chat"),
            DenyReason::Muted { until: Some(until) } => {
                write!(f, "you are muted until {}", until.format("%Y-%m-%d %H:%M UTC"))
            }
            DenyReason::Muted { until: None } => write!(f, "you are muted"),
            DenyReason::StatusUnknown => write!(f, "chat status could not be verified"),
            DenyReason::NotPermitted => write!(f, "you do not have permission to do that"),
            DenyReason::NotLoggedIn => write!(f, "not logged in"),
        }
    }
}

/// Whether the composition UI should accept input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComposerState {
    Enabled,
    Disabled(DenyReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Accepted by the server; the draft was cleared.
    Sent(ChatMessage),
    Rejected(DenyReason),
    /// HTTP 429. Draft kept for resubmission.
    RateLimited,
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
}

/// Transient, user-visible message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

impl Notice {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            text: text.into(),
        }
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            text: text.into(),
        }
    }

    pub fn slow_down() -> Self {
        Self::warning("You are sending messages too fast. Please slow down.")
    }
}
