//! Notification polling through the full core: dedup, session boundaries,
//! scheduling and logout.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use ratings_sync::storage::{MemoryStorage, SqliteStorage, Storage};
use ratings_sync::sync::{Clock, TaskId, TaskState};
use ratings_sync::sync::session::KEY_SESSION_USER;
use ratings_sync::testing::{ManualClock, ScriptedTransport};
use serde_json::json;
use tokio::time;

use common::{harness, harness_with, notification, notifications_config};

const INTERVAL: Duration = Duration::from_secs(30);

async fn settle() {
    time::sleep(Duration::from_millis(10)).await;
}

#[tokio::test(start_paused = true)]
async fn same_event_is_shown_once_per_session() {
    let mut h = harness(notifications_config());
    h.transport.respond_json(
        "GET",
        "Notifications",
        json!([notification("n1", "2024-05-01T12:00:01Z")]),
    );

    h.login("u1").await;
    settle().await;
    for _ in 0..3 {
        h.clock.advance(INTERVAL);
        time::sleep(INTERVAL).await;
    }

    assert!(h.transport.calls("GET", "Notifications") >= 3);
    assert_eq!(h.notification_ids(), vec!["n1".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn dedup_survives_reload_for_same_user() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.db");
    let transport = Arc::new(ScriptedTransport::new());
    let clock = Arc::new(ManualClock::fixed());
    transport.respond_json(
        "GET",
        "Notifications",
        json!([notification("n1", "2024-05-01T12:00:01Z")]),
    );

    {
        let storage: Arc<dyn Storage> = Arc::new(SqliteStorage::with_path(&path).unwrap());
        let mut first = harness_with(notifications_config(), transport.clone(), storage, clock.clone());
        first.login("u1").await;
        settle().await;
        assert_eq!(first.notification_ids(), vec!["n1".to_string()]);
    }

    clock.advance(INTERVAL);
    let storage: Arc<dyn Storage> = Arc::new(SqliteStorage::with_path(&path).unwrap());
    let mut reloaded = harness_with(notifications_config(), transport, storage, clock);
    reloaded.login("u1").await;
    settle().await;

    assert!(reloaded.notification_ids().is_empty());
}

#[tokio::test(start_paused = true)]
async fn switching_user_never_reuses_previous_session() {
    let storage = Arc::new(MemoryStorage::new());
    let mut h = harness_with(
        notifications_config(),
        Arc::new(ScriptedTransport::new()),
        storage.clone(),
        Arc::new(ManualClock::fixed()),
    );
    h.transport.respond_json(
        "GET",
        "Notifications",
        json!([notification("n1", "2024-05-01T12:00:01Z")]),
    );

    h.login("alice").await;
    settle().await;
    assert_eq!(h.notification_ids(), vec!["n1".to_string()]);

    h.clock.advance(Duration::from_secs(300));
    h.login("bob").await;
    settle().await;

    // n1 predates bob's session.
    assert!(h.notification_ids().is_empty());
    let session = h.core.session().unwrap();
    assert_eq!(session.owner_user_id(), "bob");
    assert!(session.seen().is_empty());
    assert_eq!(storage.get(KEY_SESSION_USER).unwrap().as_deref(), Some("bob"));

    h.transport.respond_json(
        "GET",
        "Notifications",
        json!([
            notification("n1", "2024-05-01T12:00:01Z"),
            notification("n2", "2024-05-01T12:06:00Z"),
        ]),
    );
    h.clock.advance(INTERVAL);
    time::sleep(INTERVAL).await;
    assert_eq!(h.notification_ids(), vec!["n2".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn slow_fetch_is_never_overlapped() {
    let mut h = harness(notifications_config());
    h.transport.respond_json("GET", "Notifications", json!([]));
    let gate = h.transport.hold("GET", "Notifications");

    h.login("u1").await;
    time::sleep(INTERVAL * 10).await;
    assert_eq!(h.transport.calls("GET", "Notifications"), 1);

    gate.release();
    settle().await;
    time::sleep(INTERVAL).await;
    assert_eq!(h.transport.calls("GET", "Notifications"), 2);
}

#[tokio::test(start_paused = true)]
async fn cursor_only_moves_forward() {
    let mut h = harness(notifications_config());
    h.transport.respond_json("GET", "Notifications", json!([]));
    let start = h.clock.now();

    // Signed in while hidden; the first poll runs when the window shows.
    h.core.on_hidden();
    h.login("u1").await;
    h.clock.advance(Duration::from_secs(1));
    h.core.on_visible();
    settle().await;
    for _ in 0..4 {
        h.clock.advance(INTERVAL);
        time::sleep(INTERVAL).await;
    }
    // A clock jumping backwards must not rewind the cursor.
    h.clock.set(start - chrono::Duration::hours(1));
    time::sleep(INTERVAL).await;
    time::sleep(INTERVAL).await;

    let cursors: Vec<DateTime<Utc>> = h
        .transport
        .requests_to("GET", "Notifications")
        .iter()
        .filter_map(|request| request.query_value("since"))
        .filter_map(|since| DateTime::parse_from_rfc3339(since).ok())
        .map(|since| since.with_timezone(&Utc))
        .collect();

    assert!(cursors.len() >= 7, "only {} polls", cursors.len());
    assert_eq!(cursors[0], start);
    // Empty responses still move the cursor.
    assert!(cursors[1] > cursors[0]);
    assert!(cursors[..6].windows(2).all(|pair| pair[0] < pair[1]));
    assert_eq!(cursors[6], cursors[5]);
}

#[tokio::test(start_paused = true)]
async fn logout_cancels_in_flight_poll() {
    let storage = Arc::new(MemoryStorage::new());
    let mut h = harness_with(
        notifications_config(),
        Arc::new(ScriptedTransport::new()),
        storage.clone(),
        Arc::new(ManualClock::fixed()),
    );
    h.transport.respond_json(
        "GET",
        "Notifications",
        json!([notification("n1", "2024-05-01T12:00:01Z")]),
    );
    let gate = h.transport.hold("GET", "Notifications");

    h.login("u1").await;
    settle().await;
    assert_eq!(h.transport.calls("GET", "Notifications"), 1);

    h.core.logout().await;
    gate.release();
    settle().await;

    assert!(h.notification_ids().is_empty());
    assert!(storage.keys().is_empty());
    for task in TaskId::ALL {
        assert_eq!(h.core.task_state(task), TaskState::Stopped);
    }

    let requests = h.transport.requests().len();
    time::sleep(INTERVAL * 5).await;
    assert_eq!(h.transport.requests().len(), requests);
}
