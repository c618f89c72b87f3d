//! The asynchronous operation pipeline: bounded queue, fixed
//! worker pool, durable status, append-only logs, cancellation,
//! and retention.

use anyhow::Context;
use async_timing_util::{
  ONE_DAY_MS, Timelength, unix_timestamp_ms, wait_until_timelength,
};
use tokio_util::sync::CancellationToken;
use treeos_client::{
  CoreError,
  api::execute::CancelOutcome,
  entities::operation::{Operation, OperationType},
};

use crate::{
  config::core_config,
  state::{app_lock, db_client, op_cancels, op_queue},
};

mod handlers;
mod logger;
mod worker;

pub use logger::OpLogger;
pub use worker::spawn_operation_workers;

/// Create the durable record and push it onto the queue.
///
/// Enforces at-most-one-in-flight per app: a live pending or
/// in-progress operation is a Conflict; a stale one is recovered
/// as failed and no longer blocks. The per-app lock is held from
/// the check to the insert, so two concurrent enqueues for the
/// same app cannot both observe "no active operation".
pub async fn enqueue_operation(
  operation_type: OperationType,
  app_id: &str,
  metadata: serde_json::Value,
) -> anyhow::Result<Operation> {
  let db = db_client();

  let lock = app_lock(app_id);
  let _guard = lock.lock().await;

  if let Some(active) =
    db.operations.active_for_app(app_id).await?
  {
    if active.stale(core_config().op_stale_threshold_ms()) {
      db.operations
        .fail(&active.id, "stale")
        .await
        .context("failed to recover stale operation")?;
      op_cancels().remove(&active.id);
    } else {
      return Err(
        CoreError::Conflict(format!(
          "operation {} ({}) is already {} for app {app_id}",
          active.id, active.operation_type, active.status
        ))
        .into(),
      );
    }
  }

  // Reserve the queue slot before writing the row, so a full
  // queue never leaves an orphaned pending operation behind.
  let permit = op_queue().tx.try_reserve().map_err(|_| {
    anyhow::Error::from(CoreError::QueueFull)
  })?;

  let operation =
    Operation::new(operation_type, app_id, metadata);
  db.operations.create(&operation).await?;
  op_cancels()
    .insert(operation.id.clone(), CancellationToken::new());
  permit.send(operation.id.clone());

  info!(
    "enqueued {} operation {} for app {app_id}",
    operation.operation_type, operation.id
  );
  Ok(operation)
}

/// Flag the operation cancelled, durably and in memory. The
/// worker observes the flag at the next boundary.
pub async fn cancel_operation(
  operation_id: &str,
) -> anyhow::Result<CancelOutcome> {
  let db = db_client();
  let Some(operation) =
    db.operations.get(operation_id).await?
  else {
    return Err(
      CoreError::NotFound {
        resource: "operation",
        name: operation_id.to_string(),
      }
      .into(),
    );
  };
  if !operation.status.active() {
    return Ok(CancelOutcome::NotActive);
  }
  db.operations.request_cancel(operation_id).await?;
  if let Some(token) = op_cancels().get(operation_id) {
    token.cancel();
  }
  warn!("cancel requested for operation {operation_id}");
  Ok(CancelOutcome::Cancelled)
}

/// Daily cleanup of operation logs and vitals past the retention
/// window. Operations themselves persist for audit.
pub fn spawn_retention_loop() {
  tokio::spawn(async move {
    loop {
      wait_until_timelength(Timelength::OneDay, 5000).await;
      if let Err(e) = prune_logs().await {
        error!("error in retention cleanup | {e:#}");
      }
    }
  });
}

async fn prune_logs() -> anyhow::Result<()> {
  let retention_days = core_config().log_retention_days;
  if retention_days == 0 {
    return Ok(());
  }
  let delete_before_ts = (unix_timestamp_ms()
    - retention_days as u128 * ONE_DAY_MS)
    as i64;
  let db = db_client();
  let logs = db
    .operation_logs
    .delete_before(delete_before_ts)
    .await?;
  let vitals =
    db.vitals.delete_before(delete_before_ts).await?;
  if logs > 0 || vitals > 0 {
    info!(
      "retention: deleted {logs} operation log rows, \
       {vitals} vital rows"
    );
  }
  Ok(())
}
