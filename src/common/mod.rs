pub mod commands;
pub mod events;
pub mod types;

pub use commands::SyncCommand;
pub use events::{
    ChatDelta, ComposerState, DenyReason, Notice, NoticeLevel, SendOutcome, SyncEvent,
};
pub use types::{
    BanEntry, BanKind, BanRequest, BanStatus, ChatMessage, Draft, MessagesSnapshot, Moderator,
    NotificationEvent, NotificationKind, OnlineUser, Role, TypingUser,
};
