use std::time::Duration;

use command::{OutputLine, StreamingChild};
use formatting::format_serror;
use tokio_util::sync::CancellationToken;
use treeos_client::{
  CoreError,
  entities::operation::{
    Log, Operation, OperationStatus, OperationType,
  },
  error::error_kind,
};

use crate::{
  config::core_config,
  ops::{OpLogger, handlers},
  runtime::progress::parse_compose_line,
  state::{db_client, op_cancels, op_queue},
};

/// How long the host child is given to exit on SIGTERM before
/// SIGKILL.
pub const KILL_GRACE: Duration = Duration::from_millis(500);

pub fn spawn_operation_workers() {
  let pool_size = core_config().worker_pool_size;
  for index in 0..pool_size {
    tokio::spawn(worker_loop(index));
  }
  info!("spawned {pool_size} operation workers");
}

async fn worker_loop(index: usize) {
  loop {
    let operation_id = {
      let mut rx = op_queue().rx.lock().await;
      rx.recv().await
    };
    let Some(operation_id) = operation_id else {
      break;
    };
    debug!("worker {index} picked operation {operation_id}");
    run_operation(&operation_id).await;
  }
}

/// Everything the handlers need about the running operation.
pub struct OpCtx {
  pub op: Operation,
  pub logger: OpLogger,
  pub cancel: CancellationToken,
}

impl OpCtx {
  /// Phase boundary check. The in-memory token is authoritative
  /// for this process; the row flag covers requests that raced
  /// the token insertion.
  pub async fn check_cancelled(&self) -> anyhow::Result<()> {
    if self.cancel.is_cancelled()
      || db_client()
        .operations
        .cancel_requested(&self.op.id)
        .await
        .unwrap_or_default()
    {
      return Err(CoreError::Cancelled.into());
    }
    Ok(())
  }

  /// Drive a long runtime child to completion, mapping its parsed
  /// progress into the `(from, to)` window of the overall
  /// operation, cancelling it if the operation is cancelled.
  pub async fn drive_child(
    &self,
    mut child: StreamingChild,
    window: (i64, i64),
  ) -> anyhow::Result<Log> {
    let (from, to) = window;
    let span = (to - from).max(0);
    let mut last_percent = from;
    loop {
      tokio::select! {
        line = child.next_line() => {
          let Some(line) = line else {
            break;
          };
          let (OutputLine::Stdout(line)
            | OutputLine::Stderr(line)) = line;
          let Some(event) = parse_compose_line(&line) else {
            continue;
          };
          let percent = event
            .percent
            .map(|p| from + p as i64 * span / 100)
            .unwrap_or(last_percent);
          // Monotonic within the phase; lines that do not
          // advance it are not worth a log row each.
          if percent > last_percent {
            last_percent = percent;
            self
              .logger
              .progress(
                percent,
                format!("{}: {}", event.subject, event.stage),
              )
              .await;
          }
        }
        _ = self.cancel.cancelled() => {
          if let Err(e) = child.terminate(KILL_GRACE).await {
            warn!(
              "failed to terminate child of operation {} | {e:#}",
              self.op.id
            );
          }
          let log = child.finish().await;
          self.logger.command(&log).await;
          return Err(CoreError::Cancelled.into());
        }
      }
    }
    let log = child.finish().await;
    self.logger.command(&log).await;
    if !log.success {
      return Err(CoreError::Runtime(log.combined()).into());
    }
    Ok(log)
  }
}

async fn run_operation(operation_id: &str) {
  let db = db_client();
  let op = match db.operations.get(operation_id).await {
    Ok(Some(op)) => op,
    Ok(None) => {
      warn!("queued operation {operation_id} has no row");
      return;
    }
    Err(e) => {
      error!(
        "failed to load operation {operation_id} | {e:#}"
      );
      return;
    }
  };
  // Recovery may have failed it while it sat in the queue.
  if op.status != OperationStatus::Pending {
    op_cancels().remove(operation_id);
    return;
  }

  let logger = OpLogger::new(operation_id);

  if op.cancel_requested {
    logger.warning("operation cancelled before start").await;
    let _ =
      db.operations.fail(operation_id, "cancelled").await;
    op_cancels().remove(operation_id);
    return;
  }

  if let Err(e) =
    db.operations.set_in_progress(operation_id).await
  {
    error!(
      "failed to mark operation {operation_id} in progress | {e:#}"
    );
    return;
  }
  logger
    .info(format!(
      "{} started for app {}",
      op.operation_type, op.app_id
    ))
    .await;

  let cancel = op_cancels()
    .get(operation_id)
    .map(|token| token.clone())
    .unwrap_or_default();
  let deadline = deadline_for(op.operation_type);
  let ctx = OpCtx {
    op: op.clone(),
    logger,
    cancel,
  };

  let result =
    tokio::time::timeout(deadline, dispatch(&ctx)).await;

  match result {
    Ok(Ok(())) => {
      ctx.logger.info("operation completed").await;
      if let Err(e) =
        db.operations.complete(operation_id).await
      {
        error!(
          "failed to complete operation {operation_id} | {e:#}"
        );
      }
    }
    Ok(Err(e)) => {
      let cancelled = matches!(
        error_kind(&e),
        Some(treeos_client::ErrorKind::Cancelled)
      );
      let message = if cancelled {
        String::from("cancelled")
      } else {
        format!("{e:#}")
      };
      if cancelled {
        ctx.logger.warning("operation cancelled").await;
      } else {
        // Full trace into the log row, flat message onto the
        // operation row.
        ctx.logger.error(format_serror(&e.into())).await;
      }
      if let Err(e) =
        db.operations.fail(operation_id, &message).await
      {
        error!(
          "failed to fail operation {operation_id} | {e:#}"
        );
      }
    }
    Err(_) => {
      let message = format!(
        "timed out after {}s",
        deadline.as_secs()
      );
      ctx.logger.error(&message).await;
      if let Err(e) =
        db.operations.fail(operation_id, &message).await
      {
        error!(
          "failed to fail operation {operation_id} | {e:#}"
        );
      }
    }
  }
  op_cancels().remove(operation_id);
}

/// Absolute deadline per operation type. Pull-heavy operations
/// get the pull budget.
fn deadline_for(operation_type: OperationType) -> Duration {
  let timeouts = &core_config().operation_timeouts;
  let secs = match operation_type {
    OperationType::PullImage
    | OperationType::UpdateImage
    | OperationType::CreateApp => timeouts.pull_secs,
    OperationType::Start | OperationType::Recreate => {
      timeouts.pull_secs + timeouts.start_secs
    }
    OperationType::Stop | OperationType::DeleteApp => {
      timeouts.stop_secs
    }
  };
  Duration::from_secs(secs)
}

async fn dispatch(ctx: &OpCtx) -> anyhow::Result<()> {
  match ctx.op.operation_type {
    OperationType::Start => handlers::start::run(ctx).await,
    OperationType::Stop => handlers::stop::run(ctx).await,
    OperationType::Recreate => {
      handlers::recreate::run(ctx).await
    }
    OperationType::PullImage => {
      handlers::pull_image::run(ctx).await
    }
    OperationType::UpdateImage => {
      handlers::update_image::run(ctx).await
    }
    OperationType::CreateApp => {
      handlers::create_app::run(ctx).await
    }
    OperationType::DeleteApp => {
      handlers::delete_app::run(ctx).await
    }
  }
}
