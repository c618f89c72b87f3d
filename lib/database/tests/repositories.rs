use database::Client;
use serde_json::json;
use treeos_client::entities::{
  chat::{ChatMessage, SenderType, StatusLevel},
  model::{DownloadJob, DownloadJobStatus, ModelStatus},
  operation::{
    Operation, OperationLogEntry, OperationLogLevel,
    OperationStatus, OperationType,
  },
  treeos_timestamp,
};

async fn client() -> (tempfile::TempDir, Client) {
  let dir = tempfile::tempdir().unwrap();
  let client =
    Client::new(&dir.path().join("treeos.sqlite")).await.unwrap();
  (dir, client)
}

#[tokio::test]
async fn operation_lifecycle() {
  let (_dir, client) = client().await;

  let op = Operation::new(
    OperationType::Start,
    "web1",
    json!({ "requested_by": "tester" }),
  );
  client.operations.create(&op).await.unwrap();

  let stored =
    client.operations.get(&op.id).await.unwrap().unwrap();
  assert_eq!(stored.status, OperationStatus::Pending);
  assert_eq!(stored.operation_type, OperationType::Start);
  assert_eq!(stored.metadata["requested_by"], "tester");

  // Pending blocks a second operation for the app.
  let active = client
    .operations
    .active_for_app("web1")
    .await
    .unwrap()
    .unwrap();
  assert_eq!(active.id, op.id);

  client.operations.set_in_progress(&op.id).await.unwrap();
  client
    .operations
    .update_progress(&op.id, 40, "pulling images")
    .await
    .unwrap();
  client.operations.complete(&op.id).await.unwrap();

  let stored =
    client.operations.get(&op.id).await.unwrap().unwrap();
  assert_eq!(stored.status, OperationStatus::Completed);
  assert_eq!(stored.progress, 100);
  // Terminal status implies completed_at set.
  assert!(stored.completed_at.is_some());
  assert!(
    client
      .operations
      .active_for_app("web1")
      .await
      .unwrap()
      .is_none()
  );
}

#[tokio::test]
async fn failed_operation_keeps_error_message() {
  let (_dir, client) = client().await;

  let op =
    Operation::new(OperationType::Recreate, "web1", json!({}));
  client.operations.create(&op).await.unwrap();
  client.operations.set_in_progress(&op.id).await.unwrap();
  client
    .operations
    .fail(&op.id, "exit status 125: no such image")
    .await
    .unwrap();

  let stored =
    client.operations.get(&op.id).await.unwrap().unwrap();
  assert_eq!(stored.status, OperationStatus::Failed);
  assert_eq!(
    stored.error_message,
    "exit status 125: no such image"
  );
  assert!(stored.completed_at.is_some());
}

#[tokio::test]
async fn operation_logs_preserve_emit_order() {
  let (_dir, client) = client().await;

  let ts = treeos_timestamp();
  for (i, message) in
    ["validating", "pulling", "starting"].iter().enumerate()
  {
    client
      .operation_logs
      .append(&OperationLogEntry {
        operation_id: "op-1".into(),
        // Same millisecond on purpose - the id tiebreaks.
        timestamp: ts,
        level: OperationLogLevel::Info,
        message: format!("{i}: {message}"),
        details: None,
      })
      .await
      .unwrap();
  }

  let logs = client.operation_logs.list("op-1").await.unwrap();
  let messages: Vec<_> =
    logs.iter().map(|l| l.message.as_str()).collect();
  assert_eq!(
    messages,
    ["0: validating", "1: pulling", "2: starting"]
  );

  let deleted =
    client.operation_logs.delete_before(ts + 1).await.unwrap();
  assert_eq!(deleted, 3);
}

#[tokio::test]
async fn chat_messages_query_newest_first() {
  let (_dir, client) = client().await;

  for i in 0..3 {
    client
      .chat
      .append(&ChatMessage {
        app_id: "web1".into(),
        timestamp: 1000 + i,
        message: format!("msg {i}"),
        sender_type: SenderType::Agent,
        sender_name: "watchdog".into(),
        status_level: StatusLevel::Info,
        agent_model: Some("gemma:2b".into()),
        agent_provider: None,
        details: None,
      })
      .await
      .unwrap();
  }

  let messages = client.chat.list("web1", 10).await.unwrap();
  assert_eq!(messages.len(), 3);
  assert_eq!(messages[0].message, "msg 2");
  assert_eq!(messages[2].message, "msg 0");

  assert_eq!(client.chat.delete_for_app("web1").await.unwrap(), 3);
}

#[tokio::test]
async fn model_records_and_jobs() {
  let (_dir, client) = client().await;

  client.models.mark_completed("gemma:2b").await.unwrap();
  let record =
    client.models.get("gemma:2b").await.unwrap().unwrap();
  assert_eq!(record.status, ModelStatus::Completed);
  assert_eq!(record.progress, 100);
  assert!(record.completed_at.is_some());

  client
    .models
    .reset_not_downloaded("gemma:2b")
    .await
    .unwrap();
  let record =
    client.models.get("gemma:2b").await.unwrap().unwrap();
  assert_eq!(record.status, ModelStatus::NotDownloaded);
  assert_eq!(record.progress, 0);
  assert!(record.completed_at.is_none());

  let ts = treeos_timestamp();
  let job = DownloadJob {
    id: "job-1".into(),
    model_name: "gemma:2b".into(),
    status: DownloadJobStatus::Queued,
    created_at: ts,
    updated_at: ts,
  };
  client.download_jobs.create(&job).await.unwrap();
  assert!(
    client
      .download_jobs
      .active_for_model("gemma:2b")
      .await
      .unwrap()
      .is_some()
  );

  // Jobs from a dead process cannot resume.
  assert_eq!(
    client.download_jobs.fail_inflight().await.unwrap(),
    1
  );
  assert!(
    client
      .download_jobs
      .active_for_model("gemma:2b")
      .await
      .unwrap()
      .is_none()
  );
}
