//! Integration tests for the deskhook core

use chrono::Utc;
use deskhook::terminal::{should_reconnect, ReconnectPolicy, ServerMessage, TerminalBuffers};
use deskhook::tracker::{ActionSource, ActionStatus, ActionStore, ActionUpdate, NewAction};
use deskhook::webhook::{
    evaluate_readiness, ChatHealth, HealthStatus, ServerHealth, WorkspaceHealth,
};
use deskhook::DeskhookConfig;
use pretty_assertions::assert_eq;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

fn manual_action(prompt: &str) -> NewAction {
    NewAction {
        source: ActionSource::Manual,
        action_type: "prompt".to_string(),
        prompt: prompt.to_string(),
        image_count: None,
    }
}

/// The store keeps exactly the 50 most recent actions, newest first.
#[tokio::test]
async fn test_store_capacity_bound() {
    let mut store = ActionStore::in_memory(50);

    for i in 0..60 {
        store.add_action(manual_action(&format!("prompt {}", i))).await.unwrap();
    }

    assert_eq!(store.len(), 50);
    let recent = store.recent_actions(50);
    assert_eq!(recent[0].preview, "prompt 59");
    assert_eq!(recent[49].preview, "prompt 10");
}

/// clear_completed is idempotent: a second call with no intervening writes
/// leaves the list unchanged.
#[tokio::test]
async fn test_clear_completed_idempotent() {
    let mut store = ActionStore::in_memory(10);
    let delivered = store.add_action(manual_action("done")).await.unwrap();
    store.add_action(manual_action("in flight")).await.unwrap();

    store
        .update_action(&delivered.id, ActionUpdate::status(ActionStatus::SentToVscode))
        .await
        .unwrap();

    store.clear_completed().await.unwrap();
    let after_first: Vec<String> = store.recent_actions(10).iter().map(|a| a.id.clone()).collect();

    let removed = store.clear_completed().await.unwrap();
    let after_second: Vec<String> = store.recent_actions(10).iter().map(|a| a.id.clone()).collect();

    assert_eq!(removed, 0);
    assert_eq!(after_first, after_second);
}

/// Updating a sending action to failed keeps every other field intact.
#[tokio::test]
async fn test_update_round_trip() {
    let mut store = ActionStore::in_memory(10);
    let original = store.add_action(manual_action("fix the login bug")).await.unwrap();
    assert_eq!(original.status, ActionStatus::Sending);

    let applied = store
        .update_action(
            &original.id,
            ActionUpdate {
                status: Some(ActionStatus::Failed),
                error: Some("x".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(applied);

    let updated = store.get(&original.id).unwrap();
    assert_eq!(updated.status, ActionStatus::Failed);
    assert_eq!(updated.error.as_deref(), Some("x"));
    assert_eq!(updated.id, original.id);
    assert_eq!(updated.prompt, original.prompt);
    assert_eq!(updated.preview, original.preview);
    assert_eq!(updated.created_at, original.created_at);
    assert_eq!(updated.source, original.source);
}

/// The store survives a reload from disk.
#[tokio::test]
async fn test_store_persistence() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("devconsole-code-actions.json");

    let action = {
        let mut store = ActionStore::new(path.clone(), 50).await.unwrap();
        store.add_action(manual_action("persist me")).await.unwrap()
    };

    let store = ActionStore::new(path, 50).await.unwrap();
    assert_eq!(store.len(), 1);
    let reloaded = store.get(&action.id).unwrap();
    assert_eq!(reloaded.prompt, "persist me");
    assert_eq!(reloaded.status, ActionStatus::Sending);
}

/// A corrupt blob does not block startup.
#[tokio::test]
async fn test_store_recovers_from_corrupt_blob() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("devconsole-code-actions.json");
    tokio::fs::write(&path, "not json at all").await.unwrap();

    let store = ActionStore::new(path, 50).await.unwrap();
    assert!(store.is_empty());
}

/// Busy chat with activity 70s ago crosses the 60s staleness threshold:
/// ready with the stuck override engaged.
#[test]
fn test_stuck_chat_override() {
    let now = Utc::now();
    let health = ServerHealth {
        status: HealthStatus::Ok,
        workspace: WorkspaceHealth { ready: true },
        chat: ChatHealth {
            busy: true,
            last_activity: Some(now.timestamp_millis() - 70_000),
        },
    };

    let readiness = evaluate_readiness(Some(&health), Duration::from_secs(60), now);
    assert!(readiness.ready);
    assert!(readiness.stuck_detected);

    // Under the threshold the busy flag is trusted
    let health_fresh = ServerHealth {
        chat: ChatHealth {
            busy: true,
            last_activity: Some(now.timestamp_millis() - 50_000),
        },
        ..health
    };
    let readiness = evaluate_readiness(Some(&health_fresh), Duration::from_secs(60), now);
    assert!(!readiness.ready);
    assert!(!readiness.stuck_detected);
}

/// Buffer cap of 3: after 5 output events only the last 3 remain, in
/// arrival order.
#[test]
fn test_terminal_buffer_cap() {
    let mut buffers = TerminalBuffers::new(3);
    for i in 0..5 {
        buffers.apply(&ServerMessage::Output {
            id: "managed-build".to_string(),
            data: format!("event {}", i),
        });
    }

    let terminal = buffers.get("managed-build").unwrap();
    assert_eq!(terminal.line_count(), 3);
    let lines: Vec<&str> = terminal.lines().map(|l| l.data.as_str()).collect();
    assert_eq!(lines, vec!["event 2", "event 3", "event 4"]);
}

/// Close code 1000 never schedules a reconnect; 1006 does, starting at the
/// base delay.
#[test]
fn test_reconnect_decision() {
    let policy = ReconnectPolicy::default();

    assert!(!should_reconnect(1000, true, 0, &policy));
    assert!(should_reconnect(1006, true, 0, &policy));
    assert_eq!(policy.delay_for(0), Duration::from_millis(3000));
}

#[test]
fn test_config_defaults() {
    let config = DeskhookConfig::new(PathBuf::from("/tmp/deskhook-home"));

    assert_eq!(config.webhook_url, "http://localhost:9090/webhook");
    assert_eq!(config.terminal_ws_url, "ws://localhost:9091");
    assert_eq!(config.history_capacity, 50);
    assert_eq!(config.stuck_threshold, Duration::from_secs(60));
    assert!(config
        .history_file()
        .ends_with("devconsole-code-actions.json"));
}

#[tokio::test]
async fn test_config_file_loading() {
    let temp_dir = TempDir::new().unwrap();
    tokio::fs::write(
        temp_dir.path().join("config.toml"),
        r#"
        webhook_url = "http://localhost:8080/webhook"
        stuck_threshold_secs = 120
        max_lines_per_terminal = 200
        "#,
    )
    .await
    .unwrap();

    let config = deskhook::config::load(temp_dir.path().to_path_buf()).await.unwrap();
    assert_eq!(config.webhook_url, "http://localhost:8080/webhook");
    assert_eq!(config.stuck_threshold, Duration::from_secs(120));
    assert_eq!(config.max_lines_per_terminal, 200);
    // Untouched fields keep defaults
    assert_eq!(config.history_capacity, 50);
}
