use super::types::{BanRequest, Draft};
use crate::sync::lifecycle::LifecycleSignal;

/// Commands the UI sends down to the sync core.
#[derive(Debug, Clone)]
pub enum SyncCommand {
    Lifecycle(LifecycleSignal),
    SendMessage(Draft),
    Typing(bool),
    DeleteMessage(String),
    /// Admin only.
    ClearMessages,
    Ban(BanRequest),
    Unban { user_id: String },
    ListBans,
    AddModerator { user_id: String, user_name: String },
    RemoveModerator { user_id: String },
    ListModerators,
    /// Admin only.
    TestNotification,
    Logout,
}
