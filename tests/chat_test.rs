//! Chat sending and moderation through the full core.

mod common;

use std::time::Duration;

use ratings_sync::common::{
    ComposerState, DenyReason, Draft, Notice, SendOutcome, SyncCommand, SyncEvent,
};
use ratings_sync::config::SyncConfig;
use ratings_sync::sync::{TaskId, TaskState};
use ratings_sync::ui::state::AppState;
use serde_json::json;
use tokio::time;

use common::{chat_message, harness};

const NOT_BANNED: &str = r#"{"chatBan":false,"snoozeBan":false}"#;

async fn settle() {
    time::sleep(Duration::from_millis(10)).await;
}

fn sends(events: &[SyncEvent]) -> Vec<SendOutcome> {
    events
        .iter()
        .filter_map(|event| match event {
            SyncEvent::Send(outcome) => Some(outcome.clone()),
            _ => None,
        })
        .collect()
}

fn composer_states(events: &[SyncEvent]) -> Vec<ComposerState> {
    events
        .iter()
        .filter_map(|event| match event {
            SyncEvent::Composer(state) => Some(state.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn rate_limit_keeps_draft_and_is_not_retried() {
    let mut h = harness(SyncConfig::default());
    h.transport.respond_json("GET", "Chat/Messages", json!({ "messages": [] }));
    h.transport.respond("GET", "Chat/BanStatus", 200, NOT_BANNED);
    h.transport.respond("POST", "Chat/Messages", 429, "");
    h.login("u1").await;
    settle().await;

    let mut ui = AppState::new();
    for event in h.drain() {
        ui.apply(event);
    }
    ui.draft = Draft::text("first!");

    h.core
        .handle_command(SyncCommand::SendMessage(ui.draft.clone()))
        .await;
    time::sleep(Duration::from_secs(10)).await;

    let events = h.drain();
    assert_eq!(sends(&events), vec![SendOutcome::RateLimited]);
    assert!(events
        .iter()
        .any(|event| matches!(event, SyncEvent::Notice(notice) if *notice == Notice::slow_down())));
    assert_eq!(h.transport.calls("POST", "Chat/Messages"), 1);
    for event in events {
        ui.apply(event);
    }
    assert_eq!(ui.draft.content, "first!");

    h.transport.respond_json(
        "POST",
        "Chat/Messages",
        chat_message("m1", "u1", "first!"),
    );
    h.core
        .handle_command(SyncCommand::SendMessage(ui.draft.clone()))
        .await;
    for event in h.drain() {
        ui.apply(event);
    }
    assert!(ui.draft.is_empty());
    assert_eq!(h.transport.calls("POST", "Chat/Messages"), 2);
}

#[tokio::test(start_paused = true)]
async fn ban_disables_composer_until_lifted() {
    let mut h = harness(SyncConfig::default());
    h.transport.respond_json("GET", "Chat/Messages", json!({ "messages": [] }));
    h.transport.respond(
        "GET",
        "Chat/BanStatus",
        200,
        r#"{"chatBan":true,"snoozeBan":false,"expiresAt":"2024-05-02T12:00:00Z"}"#,
    );
    h.transport.respond_json("POST", "Chat/Messages", chat_message("m1", "u1", "hi"));
    h.login("u1").await;
    settle().await;

    let composer = composer_states(&h.drain());
    assert!(matches!(
        composer.last(),
        Some(ComposerState::Disabled(DenyReason::Banned { until: Some(_) }))
    ));

    h.core
        .handle_command(SyncCommand::SendMessage(Draft::text("hi")))
        .await;
    assert!(matches!(
        sends(&h.drain()).as_slice(),
        [SendOutcome::Rejected(DenyReason::Banned { .. })]
    ));
    assert_eq!(h.transport.calls("POST", "Chat/Messages"), 0);

    h.transport.respond("GET", "Chat/BanStatus", 200, NOT_BANNED);
    time::sleep(Duration::from_secs(30)).await;
    assert_eq!(composer_states(&h.drain()), vec![ComposerState::Enabled]);

    h.core
        .handle_command(SyncCommand::SendMessage(Draft::text("hi")))
        .await;
    assert!(matches!(
        sends(&h.drain()).as_slice(),
        [SendOutcome::Sent(message)] if message.id == "m1"
    ));
}

#[tokio::test(start_paused = true)]
async fn deleted_message_arrives_as_tombstone() {
    let mut h = harness(SyncConfig::default());
    h.transport.respond("GET", "Chat/BanStatus", 200, NOT_BANNED);
    h.transport.respond_json(
        "GET",
        "Chat/Messages",
        json!({ "messages": [chat_message("m1", "u1", "oops")] }),
    );
    h.transport.respond("DELETE", "Chat/Messages/m1", 204, "");
    h.login("u1").await;
    settle().await;

    let mut ui = AppState::new();
    for event in h.drain() {
        ui.apply(event);
    }
    assert_eq!(ui.messages.len(), 1);

    h.core
        .handle_command(SyncCommand::DeleteMessage("m1".to_string()))
        .await;
    assert_eq!(h.transport.calls("DELETE", "Chat/Messages/m1"), 1);

    let mut deleted = chat_message("m1", "u1", "oops");
    deleted["deleted"] = json!(true);
    h.transport
        .respond_json("GET", "Chat/Messages", json!({ "messages": [deleted] }));
    time::sleep(Duration::from_secs(3)).await;

    for event in h.drain() {
        ui.apply(event);
    }
    assert_eq!(ui.messages.len(), 1);
    assert!(ui.messages[0].deleted);
}

#[tokio::test(start_paused = true)]
async fn moderation_commands_need_a_server_granted_role() {
    let mut h = harness(SyncConfig::default());
    h.transport.respond("GET", "Chat/BanStatus", 200, NOT_BANNED);
    h.transport.respond_json("GET", "Chat/Messages", json!({ "messages": [] }));
    h.transport.respond_json(
        "POST",
        "Chat/Heartbeat",
        json!({ "isAdmin": false, "isModerator": false }),
    );
    h.transport.respond_json("GET", "Chat/Ban/List", json!([]));
    h.core
        .on_auth_changed(Some(
            ratings_sync::sync::AuthIdentity::new("u1", "alice").with_admin_hint(true),
        ))
        .await;
    settle().await;
    h.drain();

    h.core.handle_command(SyncCommand::ListBans).await;
    let events = h.drain();
    assert!(events.iter().any(|event| matches!(event, SyncEvent::Notice(_))));
    assert_eq!(h.transport.calls("GET", "Chat/Ban/List"), 0);

    h.transport.respond_json(
        "POST",
        "Chat/Heartbeat",
        json!({ "isAdmin": false, "isModerator": true }),
    );
    time::sleep(Duration::from_secs(30)).await;
    h.drain();

    h.core.handle_command(SyncCommand::ListBans).await;
    assert!(h
        .drain()
        .iter()
        .any(|event| matches!(event, SyncEvent::Bans(bans) if bans.is_empty())));
}

#[tokio::test(start_paused = true)]
async fn logout_discards_in_flight_chat_poll() {
    let mut h = harness(SyncConfig::default());
    h.transport.respond("GET", "Chat/BanStatus", 200, NOT_BANNED);
    h.transport.respond_json(
        "GET",
        "Chat/Messages",
        json!({ "messages": [chat_message("m1", "u2", "too late")] }),
    );
    let hold = h.transport.hold("GET", "Chat/Messages");

    h.login("u1").await;
    settle().await;
    assert_eq!(h.transport.calls("GET", "Chat/Messages"), 1);

    h.core.logout().await;
    hold.release();
    settle().await;

    let events = h.drain();
    assert!(events.iter().any(|event| matches!(event, SyncEvent::LoggedOut)));
    assert!(!events.iter().any(|event| matches!(event, SyncEvent::Chat(_))));
    assert!(h.core.chat().messages().is_empty());
    for task in TaskId::ALL {
        assert_eq!(h.core.task_state(task), TaskState::Stopped);
    }

    time::sleep(Duration::from_secs(30)).await;
    assert_eq!(h.transport.calls("GET", "Chat/Messages"), 1);
}
