use crate::common::{
    ChatDelta, ChatMessage, ComposerState, Draft, Notice, NotificationEvent, OnlineUser, Role,
    SendOutcome, SyncEvent, TypingUser,
};

const MAX_NOTICES: usize = 100;
const MAX_NOTIFICATIONS: usize = 50;

/// Local UI state, rebuilt from `SyncEvent`s only.
pub struct AppState {
    pub user_id: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub typing: Vec<TypingUser>,
    pub online: Vec<OnlineUser>,
    /// Kept until the server accepts it, so a rate-limited message can be
    /// retried as typed.
    pub draft: Draft,
    pub composer: ComposerState,
    pub role: Role,
    pub notifications: Vec<NotificationEvent>,
    pub notices: Vec<Notice>,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    pub fn new() -> Self {
        Self {
            user_id: None,
            messages: Vec::new(),
            typing: Vec::new(),
            online: Vec::new(),
            draft: Draft::default(),
            composer: ComposerState::Enabled,
            role: Role::default(),
            notifications: Vec::new(),
            notices: Vec::new(),
        }
    }

    pub fn apply(&mut self, event: SyncEvent) {
        match event {
            SyncEvent::SessionStarted { user_id } => {
                self.reset();
                self.user_id = Some(user_id);
            }
            SyncEvent::LoggedOut => self.reset(),
            SyncEvent::AuthExpired => {
                self.reset();
                self.push_notice(Notice::warning("Your login expired. Please sign in again."));
            }
            SyncEvent::Notification(notification) => self.push_notification(notification),
            SyncEvent::Chat(delta) => self.apply_delta(delta),
            SyncEvent::OnlineUsers(users) => self.online = users,
            SyncEvent::Composer(state) => self.composer = state,
            SyncEvent::Role(role) => self.role = role,
            SyncEvent::Send(outcome) => self.apply_send(outcome),
            SyncEvent::Bans(bans) => {
                let text = if bans.is_empty() {
                    "No active bans".to_string()
                } else {
                    bans.iter()
                        .map(|ban| format!("{} ({:?})", display_name(&ban.user_name, &ban.user_id), ban.ban_type))
                        .collect::<Vec<_>>()
                        .join(", ")
                };
                self.push_notice(Notice::info(text));
            }
            SyncEvent::Moderators(moderators) => {
                let names: Vec<&str> = moderators
                    .iter()
                    .map(|m| display_name(&m.user_name, &m.user_id))
                    .collect();
                self.push_notice(Notice::info(format!("Moderators: {}", names.join(", "))));
            }
            SyncEvent::Notice(notice) => self.push_notice(notice),
        }
    }

    pub fn apply_delta(&mut self, delta: ChatDelta) {
        if !delta.removed.is_empty() {
            self.messages
                .retain(|message| !delta.removed.contains(&message.id));
        }
        for id in &delta.tombstoned {
            if let Some(message) = self.messages.iter_mut().find(|m| &m.id == id) {
                message.deleted = true;
            }
        }
        for updated in delta.updated {
            if let Some(message) = self.messages.iter_mut().find(|m| m.id == updated.id) {
                *message = updated;
            }
        }
        self.messages.extend(delta.added);
        self.messages.sort_by_key(|message| message.created_at);
        if let Some(typing) = delta.typing {
            self.typing = typing;
        }
    }

    fn apply_send(&mut self, outcome: SendOutcome) {
        match outcome {
            SendOutcome::Sent(_) => self.draft.clear(),
            SendOutcome::Rejected(reason) => {
                self.push_notice(Notice::warning(format!("Not sent: {reason}")));
            }
            // The core already raised the slow-down notice.
            SendOutcome::RateLimited => {}
            SendOutcome::Failed(reason) => {
                self.push_notice(Notice::warning(format!("Send failed: {reason}")));
            }
        }
    }

    pub fn push_notice(&mut self, notice: Notice) {
        self.notices.push(notice);
        if self.notices.len() > MAX_NOTICES {
            self.notices.remove(0);
        }
    }

    fn push_notification(&mut self, notification: NotificationEvent) {
        self.notifications.push(notification);
        if self.notifications.len() > MAX_NOTIFICATIONS {
            self.notifications.remove(0);
        }
    }

    fn reset(&mut self) {
        let notices = std::mem::take(&mut self.notices);
        *self = Self::new();
        self.notices = notices;
    }
}

pub fn display_name<'a>(user_name: &'a str, user_id: &'a str) -> &'a str {
    if user_name.is_empty() { user_id } else { user_name }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn message(id: &str, second: u32) -> ChatMessage {
        ChatMessage {
            id: id.to_string(),
            user_id: "u".to_string(),
            user_name: "user".to_string(),
            role: None,
            content: Some(format!("message {id}")),
            gif_url: None,
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, second).unwrap(),
            deleted: false,
        }
    }

    #[test]
    fn delta_is_applied_in_place() {
        let mut state = AppState::new();
        state.apply(SyncEvent::Chat(ChatDelta {
            added: vec![message("2", 2), message("1", 1)],
            ..ChatDelta::default()
        }));
        let ids: Vec<&str> = state.messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["1", "2"]);

        state.apply(SyncEvent::Chat(ChatDelta {
            tombstoned: vec!["2".to_string()],
            removed: vec!["1".to_string()],
            ..ChatDelta::default()
        }));
        assert_eq!(state.messages.len(), 1);
        assert!(state.messages[0].deleted);
    }

    #[test]
    fn draft_survives_rate_limit() {
        let mut state = AppState::new();
        state.draft = Draft::text("hello");

        state.apply(SyncEvent::Send(SendOutcome::RateLimited));
        assert_eq!(state.draft.content, "hello");

        state.apply(SyncEvent::Send(SendOutcome::Sent(message("1", 0))));
        assert!(state.draft.is_empty());
    }

    #[test]
    fn logout_forgets_user_data_but_keeps_notices() {
        let mut state = AppState::new();
        state.apply(SyncEvent::SessionStarted {
            user_id: "u1".to_string(),
        });
        state.apply(SyncEvent::Chat(ChatDelta {
            added: vec![message("1", 0)],
            ..ChatDelta::default()
        }));
        state.apply(SyncEvent::AuthExpired);

        assert!(state.user_id.is_none());
        assert!(state.messages.is_empty());
        assert_eq!(state.notices.len(), 1);
    }

    #[test]
    fn notices_are_capped() {
        let mut state = AppState::new();
        for i in 0..(MAX_NOTICES + 5) {
            state.push_notice(Notice::info(format!("n{i}")));
        }
        assert_eq!(state.notices.len(), MAX_NOTICES);
        assert_eq!(state.notices[0].text, "n5");
    }
}
