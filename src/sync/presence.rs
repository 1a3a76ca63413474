use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::moderation::ModerationGate;
use super::scheduler::PollTicket;
use crate::common::SyncEvent;
use crate::error::{SyncError, SyncResult};
use crate::network::RatingsApi;

/// Keeps this user listed as online and refreshes the role the server
/// grants. The role is the only thing the gate trusts for admin affordances.
pub struct PresenceHeartbeat {
    api: RatingsApi,
    gate: Arc<ModerationGate>,
    is_admin_hint: Mutex<bool>,
    events: mpsc::Sender<SyncEvent>,
}

impl PresenceHeartbeat {
    pub fn new(api: RatingsApi, gate: Arc<ModerationGate>, events: mpsc::Sender<SyncEvent>) -> Self {
        Self {
            api,
            gate,
            is_admin_hint: Mutex::new(false),
            events,
        }
    }

    pub fn set_admin_hint(&self, is_admin: bool) {
        *self.is_admin_hint.lock() = is_admin;
    }

    /// Failures other than an expired login are logged and ignored.
    pub async fn tick(&self, ticket: &PollTicket) -> SyncResult<()> {
        let hint = *self.is_admin_hint.lock();
        let role = match self.api.heartbeat(hint).await {
            Ok(role) => role,
            Err(SyncError::AuthExpired) => return Err(SyncError::AuthExpired),
            Err(err) => {
                log::debug!("Heartbeat failed: {err}");
                return Ok(());
            }
        };
        if !ticket.is_current() {
            return Ok(());
        }

        if self.gate.set_role(role) {
            log::info!(
                "Role updated (admin: {}, moderator: {})",
                role.is_admin,
                role.is_moderator
            );
            if let Err(err) = self.events.send(SyncEvent::Role(role)).await {
                log::warn!("Failed to emit role: {err}");
            }
        }
        Ok(())
    }
}
