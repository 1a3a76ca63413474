//! Ban/mute/role state and the gate every outgoing chat action passes.
//!
//! The client never counts a local rate window; HTTP 429 from the server is
//! the only rate limit. Cached role only decides which affordances are
//! offered, the server re-checks on every privileged call.

use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::scheduler::PollTicket;
use crate::common::{
    BanEntry, BanRequest, BanStatus, ComposerState, DenyReason, Draft, Moderator, Role, SyncEvent,
};
use crate::config::BanCheckFailure;
use crate::error::{SyncError, SyncResult};
use crate::network::RatingsApi;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Allowed,
    Denied(DenyReason),
}

/// Where the status currently in effect came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusSource {
    Server,
    LastKnown,
    /// No status has ever been confirmed; the failure policy decided.
    Assumed,
}

#[derive(Debug)]
struct GateState {
    last_known: Option<BanStatus>,
    effective: BanStatus,
    source: StatusSource,
    role: Role,
    announced: Option<ComposerState>,
}

impl GateState {
    fn new() -> Self {
        Self {
            last_known: None,
            effective: BanStatus::NOT_BANNED,
            source: StatusSource::Assumed,
            role: Role::default(),
            announced: None,
        }
    }
}

pub struct ModerationGate {
    api: RatingsApi,
    max_message_length: usize,
    policy: BanCheckFailure,
    events: mpsc::Sender<SyncEvent>,
    state: Mutex<GateState>,
}

impl ModerationGate {
    pub fn new(
        api: RatingsApi,
        max_message_length: usize,
        policy: BanCheckFailure,
        events: mpsc::Sender<SyncEvent>,
    ) -> Self {
        Self {
            api,
            max_message_length,
            policy,
            events,
            state: Mutex::new(GateState::new()),
        }
    }

    /// Ask the server. On failure fall back to the last known status, then to
    /// the configured policy.
    pub async fn check_ban_status(&self) -> BanStatus {
        match self.api.ban_status().await {
            Ok(status) => self.apply_fetched(status),
            Err(err) => self.apply_failure(&err),
        }
    }

    /// Scheduled recheck. Emits a composer update when the decision changed,
    /// so a lifted ban re-enables input without a reload.
    pub async fn poll(&self, ticket: &PollTicket) -> SyncResult<()> {
        let fetched = self.api.ban_status().await;
        if !ticket.is_current() {
            return Ok(());
        }
        match fetched {
            Ok(status) => {
                self.apply_fetched(status);
            }
            Err(SyncError::AuthExpired) => return Err(SyncError::AuthExpired),
            Err(err) => {
                self.apply_failure(&err);
            }
        }
        self.announce_composer().await;
        Ok(())
    }

    /// Decide whether `draft` may be sent. Re-verifies ban status first.
    pub async fn guard_send(&self, draft: &Draft) -> GuardDecision {
        if draft.is_empty() {
            return GuardDecision::Denied(DenyReason::Empty);
        }
        let length = draft.content.chars().count();
        if length > self.max_message_length {
            return GuardDecision::Denied(DenyReason::TooLong {
                max: self.max_message_length,
                actual: length,
            });
        }

        self.check_ban_status().await;
        self.announce_composer().await;
        match self.composer_state() {
            ComposerState::Enabled => GuardDecision::Allowed,
            ComposerState::Disabled(reason) => GuardDecision::Denied(reason),
        }
    }

    pub fn composer_state(&self) -> ComposerState {
        let state = self.state.lock();
        let status = state.effective;
        if !status.is_restricted() {
            return ComposerState::Enabled;
        }
        if state.source == StatusSource::Assumed {
            return ComposerState::Disabled(DenyReason::StatusUnknown);
        }
        if status.chat_ban {
            ComposerState::Disabled(DenyReason::Banned {
                until: status.expires_at,
            })
        } else {
            ComposerState::Disabled(DenyReason::Muted {
                until: status.expires_at,
            })
        }
    }

    pub fn role(&self) -> Role {
        self.state.lock().role
    }

    /// Written by the presence heartbeat only. Returns whether it changed.
    pub fn set_role(&self, role: Role) -> bool {
        let mut state = self.state.lock();
        let changed = state.role != role;
        state.role = role;
        changed
    }

    /// Forget cached status and role (logout).
    pub fn reset(&self) {
        *self.state.lock() = GateState::new();
    }

    pub fn max_message_length(&self) -> usize {
        self.max_message_length
    }

    // ========== Moderation actions ==========

    pub async fn ban_user(&self, request: &BanRequest) -> SyncResult<()> {
        self.require(self.role().can_moderate())?;
        self.api.ban(request).await?;
        log::info!("Banned {} ({:?})", request.user_id, request.ban_type);
        Ok(())
    }

    pub async fn unban_user(&self, user_id: &str) -> SyncResult<()> {
        self.require(self.role().can_moderate())?;
        self.api.unban(user_id).await?;
        log::info!("Lifted ban for {user_id}");
        Ok(())
    }

    pub async fn list_bans(&self) -> SyncResult<Vec<BanEntry>> {
        self.require(self.role().can_moderate())?;
        self.api.bans().await
    }

    pub async fn add_moderator(&self, user_id: &str, user_name: &str) -> SyncResult<()> {
        self.require(self.role().is_admin)?;
        self.api.add_moderator(user_id, user_name).await
    }

    pub async fn remove_moderator(&self, user_id: &str) -> SyncResult<()> {
        self.require(self.role().is_admin)?;
        self.api.remove_moderator(user_id).await
    }

    pub async fn list_moderators(&self) -> SyncResult<Vec<Moderator>> {
        self.require(self.role().can_moderate())?;
        self.api.moderators().await
    }

    fn require(&self, allowed: bool) -> SyncResult<()> {
        if allowed {
            Ok(())
        } else {
            Err(SyncError::ModerationDenied(DenyReason::NotPermitted.to_string()))
        }
    }

    fn apply_fetched(&self, status: BanStatus) -> BanStatus {
        let mut state = self.state.lock();
        state.last_known = Some(status);
        state.effective = status;
        state.source = StatusSource::Server;
        status
    }

    fn apply_failure(&self, err: &SyncError) -> BanStatus {
        let mut state = self.state.lock();
        let (status, source) = match (state.last_known, self.policy) {
            (Some(known), _) => (known, StatusSource::LastKnown),
            (None, BanCheckFailure::FailOpen) => (BanStatus::NOT_BANNED, StatusSource::Assumed),
            (None, BanCheckFailure::FailClosed) => (
                BanStatus {
                    chat_ban: true,
                    ..BanStatus::NOT_BANNED
                },
                StatusSource::Assumed,
            ),
        };
        log::debug!("Ban status check failed ({err}); using {source:?} status");
        state.effective = status;
        state.source = source;
        status
    }

    async fn announce_composer(&self) {
        let composer = self.composer_state();
        {
            let mut state = self.state.lock();
            if state.announced.as_ref() == Some(&composer) {
                return;
            }
            state.announced = Some(composer.clone());
        }
        if let Err(err) = self.events.send(SyncEvent::Composer(composer)).await {
            log::warn!("Failed to emit composer state: {err}");
        }
    }
}
