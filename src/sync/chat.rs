//! Chat window: message snapshots, typing, online users and outgoing actions.
//!
//! Every poll is a full replace of the local render list. The delta sent to
//! the UI is computed by message ID against the previous snapshot.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::moderation::{GuardDecision, ModerationGate};
use super::scheduler::{PollScheduler, PollTicket, TaskId};
use crate::common::{
    ChatDelta, ChatMessage, DenyReason, Draft, MessagesSnapshot, Notice, OnlineUser, SendOutcome,
    SyncEvent, TypingUser,
};
use crate::error::{SyncError, SyncResult};
use crate::network::RatingsApi;

#[derive(Debug, Default)]
struct ChatState {
    current_user: Option<String>,
    messages: Vec<ChatMessage>,
    typing: Vec<TypingUser>,
    online: Vec<OnlineUser>,
}

pub struct ChatSync {
    api: RatingsApi,
    gate: Arc<ModerationGate>,
    scheduler: Arc<PollScheduler>,
    message_limit: u32,
    state: Mutex<ChatState>,
    events: mpsc::Sender<SyncEvent>,
}

impl ChatSync {
    pub fn new(
        api: RatingsApi,
        gate: Arc<ModerationGate>,
        scheduler: Arc<PollScheduler>,
        message_limit: u32,
        events: mpsc::Sender<SyncEvent>,
    ) -> Self {
        Self {
            api,
            gate,
            scheduler,
            message_limit,
            state: Mutex::new(ChatState::default()),
            events,
        }
    }

    pub fn set_current_user(&self, user_id: Option<String>) {
        self.state.lock().current_user = user_id;
    }

    /// Drop the render list and the identity (logout).
    pub fn reset(&self) {
        *self.state.lock() = ChatState::default();
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.state.lock().messages.clone()
    }

    pub fn online_users(&self) -> Vec<OnlineUser> {
        self.state.lock().online.clone()
    }

    pub async fn poll_messages(&self, ticket: &PollTicket) -> SyncResult<()> {
        let snapshot = self.api.messages(self.message_limit).await?;
        let Some(permit) = self.reserve_event().await else {
            return Ok(());
        };

        // Checked and sent under the state lock: `reset` takes the same lock
        // before the core reports a logout, so no delta can follow it.
        let mut state = self.state.lock();
        if !ticket.is_current() || state.current_user.is_none() {
            log::debug!("Discarding stale message snapshot");
            return Ok(());
        }
        let delta = diff_snapshot(&state.messages, &state.typing, &snapshot);
        state.messages = snapshot.messages;
        state.typing = snapshot.typing_users;
        if !delta.is_empty() {
            permit.send(SyncEvent::Chat(delta));
        }
        Ok(())
    }

    pub async fn poll_online_users(&self, ticket: &PollTicket) -> SyncResult<()> {
        let users = self.api.online_users().await?;
        let Some(permit) = self.reserve_event().await else {
            return Ok(());
        };

        let mut state = self.state.lock();
        if !ticket.is_current() || state.current_user.is_none() || state.online == users {
            return Ok(());
        }
        state.online = users.clone();
        permit.send(SyncEvent::OnlineUsers(users));
        Ok(())
    }

    /// Try to send `draft`.
    ///
    /// The draft is cleared only when the server accepted it. `Err` is
    /// returned only for [`SyncError::AuthExpired`]; every other outcome is
    /// reported through [`SendOutcome`].
    pub async fn send(&self, draft: &mut Draft) -> SyncResult<SendOutcome> {
        if self.state.lock().current_user.is_none() {
            return Ok(SendOutcome::Rejected(DenyReason::NotLoggedIn));
        }
        if let GuardDecision::Denied(reason) = self.gate.guard_send(draft).await {
            log::debug!("Send refused: {reason}");
            return Ok(SendOutcome::Rejected(reason));
        }

        match self.api.post_message(draft).await {
            Ok(message) => {
                draft.clear();
                self.scheduler.trigger(TaskId::ChatMessages);
                Ok(SendOutcome::Sent(message))
            }
            Err(SyncError::RateLimited) => {
                log::info!("Message rate limited by the server");
                self.emit(SyncEvent::Notice(Notice::slow_down())).await;
                Ok(SendOutcome::RateLimited)
            }
            Err(SyncError::AuthExpired) => Err(SyncError::AuthExpired),
            Err(err) => {
                log::warn!("Failed to send message: {err}");
                Ok(SendOutcome::Failed(err.to_string()))
            }
        }
    }

    /// Fire-and-forget typing indicator.
    pub fn notify_typing(&self, is_typing: bool) {
        if self.state.lock().current_user.is_none() {
            return;
        }
        let api = self.api.clone();
        tokio::spawn(async move {
            if let Err(err) = api.typing(is_typing).await {
                log::debug!("Typing indicator failed: {err}");
            }
        });
    }

    /// Own messages may always be deleted; others need moderator rights. The
    /// tombstone shows up with the next snapshot.
    pub async fn delete_message(&self, message_id: &str) -> SyncResult<()> {
        let own = {
            let state = self.state.lock();
            let Some(current_user) = state.current_user.as_deref() else {
                return Err(SyncError::ModerationDenied(DenyReason::NotLoggedIn.to_string()));
            };
            state
                .messages
                .iter()
                .any(|message| message.id == message_id && message.user_id == current_user)
        };
        if !own && !self.gate.role().can_moderate() {
            return Err(SyncError::ModerationDenied(DenyReason::NotPermitted.to_string()));
        }

        self.api.delete_message(message_id).await?;
        self.scheduler.trigger(TaskId::ChatMessages);
        Ok(())
    }

    /// Admin only.
    pub async fn clear_all(&self) -> SyncResult<()> {
        if !self.gate.role().is_admin {
            return Err(SyncError::ModerationDenied(DenyReason::NotPermitted.to_string()));
        }
        self.api.clear_messages().await?;
        log::info!("Cleared chat history");
        self.scheduler.trigger(TaskId::ChatMessages);
        Ok(())
    }

    async fn reserve_event(&self) -> Option<mpsc::Permit<'_, SyncEvent>> {
        match self.events.reserve().await {
            Ok(permit) => Some(permit),
            Err(err) => {
                log::warn!("Failed to emit chat event: {err}");
                None
            }
        }
    }

    async fn emit(&self, event: SyncEvent) {
        if let Err(err) = self.events.send(event).await {
            log::warn!("Failed to emit chat event: {err}");
        }
    }
}

/// Compare two consecutive snapshots by message ID.
pub fn diff_snapshot(
    previous: &[ChatMessage],
    previous_typing: &[TypingUser],
    next: &MessagesSnapshot,
) -> ChatDelta {
    let before: HashMap<&str, &ChatMessage> = previous
        .iter()
        .map(|message| (message.id.as_str(), message))
        .collect();

    let mut delta = ChatDelta::default();
    for message in &next.messages {
        let Some(old) = before.get(message.id.as_str()) else {
            delta.added.push(message.clone());
            continue;
        };
        if message.deleted && !old.deleted {
            delta.tombstoned.push(message.id.clone());
        }
        let revived = old.deleted && !message.deleted;
        let edited = ChatMessage {
            deleted: old.deleted,
            ..message.clone()
        } != **old;
        if revived || edited {
            delta.updated.push(message.clone());
        }
    }

    let kept: HashSet<&str> = next
        .messages
        .iter()
        .map(|message| message.id.as_str())
        .collect();
    delta.removed = previous
        .iter()
        .filter(|message| !kept.contains(message.id.as_str()))
        .map(|message| message.id.clone())
        .collect();

    if previous_typing != next.typing_users.as_slice() {
        delta.typing = Some(next.typing_users.clone());
    }
    delta
}
