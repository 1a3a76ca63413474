#![allow(dead_code)]

use std::sync::Arc;

use ratings_sync::common::SyncEvent;
use ratings_sync::config::SyncConfig;
use ratings_sync::storage::{MemoryStorage, Storage};
use ratings_sync::sync::{AuthIdentity, Collaborators, SyncCore};
use ratings_sync::testing::{ManualClock, ScriptedTransport};
use serde_json::{Value, json};
use tokio::sync::mpsc;

pub struct Harness {
    pub transport: Arc<ScriptedTransport>,
    pub clock: Arc<ManualClock>,
    pub core: SyncCore,
    pub events: mpsc::Receiver<SyncEvent>,
}

impl Harness {
    pub async fn login(&mut self, user_id: &str) {
        self.core
            .on_auth_changed(Some(AuthIdentity::new(user_id, user_id)))
            .await;
    }

    /// Everything emitted so far.
    pub fn drain(&mut self) -> Vec<SyncEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    pub fn notification_ids(&mut self) -> Vec<String> {
        self.drain()
            .into_iter()
            .filter_map(|event| match event {
                SyncEvent::Notification(notification) => Some(notification.id),
                _ => None,
            })
            .collect()
    }
}

/// Notifications only; chat polling off.
pub fn notifications_config() -> SyncConfig {
    SyncConfig {
        chat_enabled: false,
        ..SyncConfig::default()
    }
}

pub fn harness(config: SyncConfig) -> Harness {
    harness_with(
        config,
        Arc::new(ScriptedTransport::new()),
        Arc::new(MemoryStorage::new()),
        Arc::new(ManualClock::fixed()),
    )
}

pub fn harness_with(
    config: SyncConfig,
    transport: Arc<ScriptedTransport>,
    storage: Arc<dyn Storage>,
    clock: Arc<ManualClock>,
) -> Harness {
    let (tx, rx) = mpsc::channel(1024);
    let core = SyncCore::new(
        config,
        Collaborators {
            transport: transport.clone(),
            storage,
            clock: clock.clone(),
        },
        tx,
    );
    Harness {
        transport,
        clock,
        core,
        events: rx,
    }
}

pub fn notification(id: &str, created_at: &str) -> Value {
    json!({
        "id": id,
        "type": "movie",
        "itemId": format!("item-{id}"),
        "payload": { "title": "Arrival" },
        "createdAt": created_at
    })
}

pub fn chat_message(id: &str, user_id: &str, content: &str) -> Value {
    json!({
        "id": id,
        "userId": user_id,
        "userName": user_id,
        "content": content,
        "createdAt": "2024-05-01T12:00:00Z"
    })
}
