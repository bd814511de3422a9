//! Webhook client tests against a mock extension server

use deskhook::webhook::{
    error_codes, PollOptions, PollStatus, RequestStatus, StatusProbe, WebhookAction,
    WebhookClient, WebhookPayload,
};
use deskhook::DeskhookConfig;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> WebhookClient {
    let config = DeskhookConfig::new(PathBuf::from("/tmp/deskhook-test"))
        .with_webhook_url(format!("{}/webhook", server.uri()))
        .with_request_timeout(Duration::from_secs(2));
    WebhookClient::new(&config)
}

#[tokio::test]
async fn test_send_prompt_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/webhook"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "message": "accepted",
            "requestId": "req-1"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let result = client_for(&server).send_prompt("hello", None).await;

    assert!(result.success);
    assert_eq!(result.request_id.as_deref(), Some("req-1"));
    assert!(!result.is_queued());
}

#[tokio::test]
async fn test_send_prompt_queued() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/webhook"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "requestId": "req-7",
            "status": "queued",
            "queue": {"position": 3}
        })))
        .mount(&server)
        .await;

    let result = client_for(&server).send_prompt("hello", None).await;

    assert!(result.success);
    assert!(result.is_queued());
    assert_eq!(result.queue_position, Some(3));
}

/// HTTP 503 with a NO_WORKSPACE body keeps the structured code and the
/// suggestions verbatim.
#[tokio::test]
async fn test_send_prompt_no_workspace() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/webhook"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({
            "success": false,
            "error": "NO_WORKSPACE",
            "message": "No workspace folder is open",
            "suggestions": ["Open a folder in the editor", "Reload the window"],
            "action_required": "open_workspace"
        })))
        .mount(&server)
        .await;

    let result = client_for(&server).send_prompt("hello", None).await;

    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some(error_codes::NO_WORKSPACE));
    assert_eq!(
        result.suggestions,
        vec!["Open a folder in the editor", "Reload the window"]
    );
    assert_eq!(result.action_required.as_deref(), Some("open_workspace"));
}

/// A bare 400 maps to MISSING_PROMPT even without a structured body.
#[tokio::test]
async fn test_send_prompt_missing_prompt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/webhook"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&server)
        .await;

    let result = client_for(&server).send_prompt("", None).await;

    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some(error_codes::MISSING_PROMPT));
}

#[tokio::test]
async fn test_send_prompt_generic_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/webhook"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let result = client_for(&server).send_prompt("hello", None).await;

    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some(error_codes::REQUEST_FAILED));
}

/// A server that answers slower than the client timeout yields a typed
/// TIMEOUT result, not an error.
#[tokio::test]
async fn test_send_prompt_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/webhook"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"success": true}))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let config = DeskhookConfig::new(PathBuf::from("/tmp/deskhook-test"))
        .with_webhook_url(format!("{}/webhook", server.uri()))
        .with_request_timeout(Duration::from_millis(100));
    let result = WebhookClient::new(&config).send_prompt("hello", None).await;

    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some(error_codes::TIMEOUT));
}

#[tokio::test]
async fn test_send_prompt_connection_error() {
    // Nothing listens here
    let config = DeskhookConfig::new(PathBuf::from("/tmp/deskhook-test"))
        .with_webhook_url("http://127.0.0.1:9/webhook".to_string())
        .with_request_timeout(Duration::from_secs(1));
    let result = WebhookClient::new(&config).send_prompt("hello", None).await;

    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some(error_codes::CONNECTION_ERROR));
}

/// The generic envelope serializes with the documented wire field names.
#[tokio::test]
async fn test_send_webhook_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/webhook"))
        .and(body_partial_json(json!({
            "action": "create_file",
            "filePath": "src/new.rs",
            "content": "fn main() {}"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "requestId": "req-11"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let payload = WebhookPayload::new(WebhookAction::CreateFile)
        .with_file_path("src/new.rs")
        .with_content("fn main() {}");
    let result = client_for(&server).send_webhook(&payload).await;

    assert!(result.success);
    assert_eq!(result.request_id.as_deref(), Some("req-11"));
}

#[tokio::test]
async fn test_get_health() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "ok",
            "workspace": {"ready": true},
            "chat": {"busy": false}
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let health = client.get_health().await.expect("health should parse");
    assert!(health.workspace.ready);
    assert!(!health.chat.busy);

    let summary = client.check_workspace_ready().await;
    assert!(summary.connected);
    assert!(summary.workspace_ready);
    assert!(!summary.chat_busy);
}

/// Any health failure is `None`, never an error.
#[tokio::test]
async fn test_get_health_failure_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = client_for(&server);
    assert!(client.get_health().await.is_none());

    let summary = client.check_workspace_ready().await;
    assert!(!summary.connected);
}

#[tokio::test]
async fn test_get_queue_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/queue"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "isProcessing": true,
            "queueLength": 2,
            "currentTaskId": "task-1",
            "pendingTasks": ["task-2", "task-3"]
        })))
        .mount(&server)
        .await;

    let queue = client_for(&server).get_queue_status().await.unwrap();
    assert!(queue.is_processing);
    assert_eq!(queue.queue_length, 2);
    assert_eq!(queue.current_task_id.as_deref(), Some("task-1"));
    assert_eq!(queue.pending_tasks, vec!["task-2", "task-3"]);
}

/// An always-processing status endpoint: exactly max_attempts polls, the
/// callback fires once per poll, and the outcome is a timeout.
#[tokio::test]
async fn test_poll_for_completion_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/webhook/req-9/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "processing"})))
        .expect(5)
        .mount(&server)
        .await;

    let mut observed = Vec::new();
    let outcome = client_for(&server)
        .poll_for_completion(
            "req-9",
            PollOptions {
                max_attempts: 5,
                interval: Duration::from_millis(10),
            },
            |status| observed.push(status),
        )
        .await;

    assert!(!outcome.completed);
    assert_eq!(outcome.status, PollStatus::Timeout);
    assert_eq!(observed.len(), 5);
    assert!(observed.iter().all(|s| *s == RequestStatus::Processing));
}

/// The poll short-circuits as soon as the status turns terminal.
#[tokio::test]
async fn test_poll_for_completion_completes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/webhook/req-3/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "processing"})))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/webhook/req-3/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "completed"})))
        .mount(&server)
        .await;

    let mut observed = Vec::new();
    let outcome = client_for(&server)
        .poll_for_completion(
            "req-3",
            PollOptions {
                max_attempts: 10,
                interval: Duration::from_millis(10),
            },
            |status| observed.push(status),
        )
        .await;

    assert!(outcome.completed);
    assert_eq!(outcome.status, PollStatus::Completed);
    assert_eq!(
        observed,
        vec![
            RequestStatus::Processing,
            RequestStatus::Processing,
            RequestStatus::Completed
        ]
    );
}

/// A 404 means the extension restarted: terminal not-found, no more polls.
#[tokio::test]
async fn test_poll_for_completion_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/webhook/req-gone/status"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    match client.get_request_status("req-gone").await {
        StatusProbe::NotFound => {}
        other => panic!("expected NotFound, got {:?}", other),
    }

    // Re-mount with a fresh expectation for the poll itself
    drop(server);
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/webhook/req-gone/status"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let mut calls = 0;
    let outcome = client_for(&server)
        .poll_for_completion(
            "req-gone",
            PollOptions {
                max_attempts: 10,
                interval: Duration::from_millis(10),
            },
            |_| calls += 1,
        )
        .await;

    assert!(!outcome.completed);
    assert_eq!(outcome.status, PollStatus::NotFound);
    assert_eq!(calls, 0);
}

#[tokio::test]
async fn test_failed_request_carries_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/webhook/req-bad/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "failed",
            "error": "assistant rejected the prompt"
        })))
        .mount(&server)
        .await;

    let outcome = client_for(&server)
        .poll_for_completion("req-bad", PollOptions::default(), |_| {})
        .await;

    assert!(!outcome.completed);
    assert_eq!(outcome.status, PollStatus::Failed);
    assert_eq!(outcome.error.as_deref(), Some("assistant rejected the prompt"));
}

#[tokio::test]
async fn test_test_connection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "message": "hello deskhook"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let result = client_for(&server).test_connection().await;
    assert!(result.success);
    assert_eq!(result.message.as_deref(), Some("hello deskhook"));
}
