//! Crash recovery, run after the database is up and before any
//! worker can pick up new work.

use database::Client;
use tokio::sync::mpsc;
use treeos_client::entities::operation::OperationStatus;

use crate::{
  config::core_config,
  models::{manifests_root, reconcile::reconcile_models},
  state::db_client,
};

pub async fn on_startup() {
  let db = db_client();

  match recover_operations(
    db,
    &crate::state::op_queue().tx,
    core_config().op_stale_threshold_ms(),
  )
  .await
  {
    Ok((requeued, failed)) => {
      if requeued > 0 || failed > 0 {
        info!(
          "recovery: re-enqueued {requeued} pending, \
           failed {failed} interrupted operations"
        );
      }
    }
    Err(e) => {
      error!("operation recovery errored | {e:#}");
    }
  }

  match db.download_jobs.fail_inflight().await {
    Ok(0) => {}
    Ok(failed) => {
      info!("recovery: failed {failed} interrupted model jobs");
    }
    Err(e) => {
      error!("download job recovery errored | {e:#}");
    }
  }

  match reconcile_models(db, &manifests_root()).await {
    Ok(summary) => {
      info!(
        "model reconciliation: {} completed on disk, {} reset",
        summary.completed, summary.reset
      );
    }
    Err(e) => {
      error!("model reconciliation errored | {e:#}");
    }
  }
}

/// Scan for operations a previous process left behind.
///
/// `in_progress` rows cannot be resumed: partial runtime actions
/// are unobservable, so old ones fail as stale and young ones as
/// interrupted. `pending` rows re-enter the queue.
pub async fn recover_operations(
  db: &Client,
  queue: &mpsc::Sender<String>,
  stale_threshold_ms: i64,
) -> anyhow::Result<(u64, u64)> {
  let mut requeued = 0;
  let mut failed = 0;
  for op in db.operations.list_active().await? {
    match op.status {
      OperationStatus::Pending => {
        if queue.try_send(op.id.clone()).is_ok() {
          requeued += 1;
        } else {
          db.operations
            .fail(&op.id, "queue full on recovery")
            .await?;
          failed += 1;
        }
      }
      OperationStatus::InProgress => {
        let message = if op.stale(stale_threshold_ms) {
          "stale"
        } else {
          "interrupted by restart"
        };
        db.operations.fail(&op.id, message).await?;
        failed += 1;
      }
      _ => {}
    }
  }
  Ok((requeued, failed))
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use treeos_client::entities::operation::{
    Operation, OperationType,
  };

  async fn client() -> (tempfile::TempDir, Client) {
    let dir = tempfile::tempdir().unwrap();
    let client =
      Client::new(&dir.path().join("treeos.sqlite"))
        .await
        .unwrap();
    (dir, client)
  }

  #[tokio::test]
  async fn stale_in_progress_fails_with_stale() {
    let (_dir, db) = client().await;

    let mut op =
      Operation::new(OperationType::Start, "web1", json!({}));
    // Older than any threshold.
    op.created_at -= 10 * 60_000;
    op.updated_at -= 10 * 60_000;
    db.operations.create(&op).await.unwrap();
    db.operations.set_in_progress(&op.id).await.unwrap();
    sqlx::query(
      "UPDATE docker_operations SET updated_at = ? WHERE id = ?",
    )
    .bind(op.updated_at)
    .bind(&op.id)
    .execute(&db.pool)
    .await
    .unwrap();

    let (tx, _rx) = mpsc::channel(8);
    let (requeued, failed) =
      recover_operations(&db, &tx, 5 * 60_000).await.unwrap();
    assert_eq!((requeued, failed), (0, 1));

    let op =
      db.operations.get(&op.id).await.unwrap().unwrap();
    assert_eq!(op.status, OperationStatus::Failed);
    assert_eq!(op.error_message, "stale");
    assert!(op.completed_at.is_some());
    // Nothing active left to block a fresh StartApp.
    assert!(
      db.operations
        .active_for_app("web1")
        .await
        .unwrap()
        .is_none()
    );
  }

  #[tokio::test]
  async fn young_in_progress_also_fails() {
    let (_dir, db) = client().await;

    let op =
      Operation::new(OperationType::Recreate, "web1", json!({}));
    db.operations.create(&op).await.unwrap();
    db.operations.set_in_progress(&op.id).await.unwrap();

    let (tx, _rx) = mpsc::channel(8);
    let (_, failed) =
      recover_operations(&db, &tx, 5 * 60_000).await.unwrap();
    assert_eq!(failed, 1);

    let op =
      db.operations.get(&op.id).await.unwrap().unwrap();
    assert_eq!(op.status, OperationStatus::Failed);
    assert_eq!(op.error_message, "interrupted by restart");
  }

  #[tokio::test]
  async fn pending_operations_re_enqueue() {
    let (_dir, db) = client().await;

    let op =
      Operation::new(OperationType::Stop, "web1", json!({}));
    db.operations.create(&op).await.unwrap();

    let (tx, mut rx) = mpsc::channel(8);
    let (requeued, failed) =
      recover_operations(&db, &tx, 5 * 60_000).await.unwrap();
    assert_eq!((requeued, failed), (1, 0));
    assert_eq!(rx.recv().await.unwrap(), op.id);

    let op =
      db.operations.get(&op.id).await.unwrap().unwrap();
    assert_eq!(op.status, OperationStatus::Pending);
  }
}
