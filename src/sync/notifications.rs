//! "What's new since X" polling for media notifications.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::clock::Clock;
use super::moderation::ModerationGate;
use super::scheduler::PollTicket;
use super::session::{Session, SessionStore};
use crate::common::{DenyReason, SyncEvent};
use crate::error::{SyncError, SyncResult};
use crate::network::RatingsApi;

pub struct NotificationSync {
    api: RatingsApi,
    session: Arc<Mutex<SessionStore>>,
    gate: Arc<ModerationGate>,
    clock: Arc<dyn Clock>,
    events: mpsc::Sender<SyncEvent>,
}

impl NotificationSync {
    pub fn new(
        api: RatingsApi,
        session: Arc<Mutex<SessionStore>>,
        gate: Arc<ModerationGate>,
        clock: Arc<dyn Clock>,
        events: mpsc::Sender<SyncEvent>,
    ) -> Self {
        Self {
            api,
            session,
            gate,
            clock,
            events,
        }
    }

    /// One poll. Returns how many notifications were emitted.
    ///
    /// The cursor moves forward after every successful fetch, even an empty
    /// one. It is set to the time the request started, so anything created
    /// while the request was in flight is fetched again and filtered by the
    /// dedup set.
    pub async fn tick(&self, ticket: &PollTicket) -> SyncResult<usize> {
        let (since, epoch) = {
            let store = self.session.lock();
            match store.session() {
                Some(session) => (session.last_checked_at(), store.epoch()),
                None => return Ok(0),
            }
        };

        let request_time = self.clock.now();
        let fetched = self.api.notifications_since(since).await?;

        let fresh = {
            let mut store = self.session.lock();
            if !ticket.is_current() || store.epoch() != epoch {
                log::debug!("Discarding notification poll from a previous session");
                return Ok(0);
            }
            let Some(started_at) = store.session().map(Session::started_at) else {
                return Ok(0);
            };

            let mut fresh = Vec::new();
            for event in fetched {
                if store.has_seen(&event.id) {
                    continue;
                }
                if event.created_at < started_at {
                    log::debug!(
                        "Ignoring notification {} created before the session started",
                        event.id
                    );
                    continue;
                }
                if store.record_seen(&event.id) {
                    fresh.push(event);
                }
            }
            store.advance_cursor(request_time.max(since));
            fresh
        };

        let count = fresh.len();
        for event in fresh {
            if let Err(err) = self.events.send(SyncEvent::Notification(event)).await {
                log::warn!("Failed to emit notification: {err}");
            }
        }
        if count > 0 {
            log::info!("Delivered {count} new notification(s)");
        }
        Ok(count)
    }

    /// Ask the server for a synthetic notification. Admin only.
    pub async fn send_test(&self) -> SyncResult<()> {
        if !self.gate.role().is_admin {
            return Err(SyncError::ModerationDenied(DenyReason::NotPermitted.to_string()));
        }
        self.api.send_test_notification().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BanCheckFailure;
    use crate::storage::MemoryStorage;
    use crate::sync::scheduler::TaskId;
    use crate::testing::{ManualClock, ScriptedTransport};
    use serde_json::json;
    use std::time::Duration;

    struct Fixture {
        transport: Arc<ScriptedTransport>,
        clock: Arc<ManualClock>,
        store: Arc<Mutex<SessionStore>>,
        sync: NotificationSync,
        events: mpsc::Receiver<SyncEvent>,
    }

    fn fixture() -> Fixture {
        let transport = Arc::new(ScriptedTransport::new());
        let clock = Arc::new(ManualClock::fixed());
        let store = Arc::new(Mutex::new(SessionStore::new(
            Arc::new(MemoryStorage::new()),
            clock.clone(),
        )));
        let (tx, rx) = mpsc::channel(32);
        let api = RatingsApi::new(transport.clone());
        let gate = Arc::new(ModerationGate::new(
            api.clone(),
            500,
            BanCheckFailure::FailOpen,
            tx.clone(),
        ));
        let sync = NotificationSync::new(api, store.clone(), gate, clock.clone(), tx);
        Fixture {
            transport,
            clock,
            store,
            sync,
            events: rx,
        }
    }

    fn event(id: &str, created_at: &str) -> serde_json::Value {
        json!({ "id": id, "type": "movie", "itemId": "item-1", "createdAt": created_at })
    }

    fn ticket() -> PollTicket {
        PollTicket::detached(TaskId::Notifications)
    }

    #[tokio::test]
    async fn without_session_nothing_is_fetched() {
        let fx = fixture();
        assert_eq!(fx.sync.tick(&ticket()).await.unwrap(), 0);
        assert!(fx.transport.requests().is_empty());
    }

    #[tokio::test]
    async fn events_before_session_start_never_render() {
        let mut fx = fixture();
        fx.store.lock().load_or_start("u1");
        fx.transport.respond_json(
            "GET",
            "Notifications",
            json!([
                event("old", "2024-05-01T11:00:00Z"),
                event("new", "2024-05-01T12:00:01Z"),
            ]),
        );
        fx.clock.advance(Duration::from_secs(5));

        assert_eq!(fx.sync.tick(&ticket()).await.unwrap(), 1);
        match fx.events.try_recv() {
            Ok(SyncEvent::Notification(event)) => assert_eq!(event.id, "new"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(!fx.store.lock().has_seen("old"));
    }

    #[tokio::test]
    async fn failed_fetch_keeps_cursor() {
        let fx = fixture();
        let start = fx.store.lock().load_or_start("u1").started_at();
        fx.transport.fail("GET", "Notifications", "offline");
        fx.clock.advance(Duration::from_secs(30));

        assert!(fx.sync.tick(&ticket()).await.is_err());
        let cursor = fx.store.lock().session().map(Session::last_checked_at);
        assert_eq!(cursor, Some(start));
    }

    #[tokio::test]
    async fn test_notification_requires_admin() {
        let fx = fixture();
        fx.transport.respond("POST", "Notifications/Test", 204, "");
        assert!(matches!(
            fx.sync.send_test().await,
            Err(SyncError::ModerationDenied(_))
        ));

        fx.sync.gate.set_role(crate::common::Role {
            is_admin: true,
            is_moderator: false,
        });
        fx.sync.send_test().await.unwrap();
        assert_eq!(fx.transport.calls("POST", "Notifications/Test"), 1);
    }
}
