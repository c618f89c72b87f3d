use treeos_client::entities::{
  operation::{
    Log, OperationLogEntry, OperationLogLevel,
  },
  treeos_timestamp,
};

use crate::state::db_client;

/// Dedicated append-only logger for one operation. Every
/// observable state change goes through here; a failed log write
/// must never fail the operation itself.
pub struct OpLogger {
  operation_id: String,
}

impl OpLogger {
  pub fn new(operation_id: impl Into<String>) -> OpLogger {
    OpLogger {
      operation_id: operation_id.into(),
    }
  }

  pub async fn log(
    &self,
    level: OperationLogLevel,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
  ) {
    let entry = OperationLogEntry {
      operation_id: self.operation_id.clone(),
      timestamp: treeos_timestamp(),
      level,
      message: message.into(),
      details,
    };
    if let Err(e) =
      db_client().operation_logs.append(&entry).await
    {
      error!(
        "failed to append log for operation {} | {e:#}",
        self.operation_id
      );
    }
  }

  pub async fn debug(&self, message: impl Into<String>) {
    self
      .log(OperationLogLevel::Debug, message, None)
      .await;
  }

  pub async fn info(&self, message: impl Into<String>) {
    self.log(OperationLogLevel::Info, message, None).await;
  }

  pub async fn warning(&self, message: impl Into<String>) {
    self
      .log(OperationLogLevel::Warning, message, None)
      .await;
  }

  pub async fn error(&self, message: impl Into<String>) {
    self
      .log(OperationLogLevel::Error, message, None)
      .await;
  }

  /// Record a finished runtime command, equivalent command line
  /// included in the details.
  pub async fn command(&self, log: &Log) {
    let level = if log.success {
      OperationLogLevel::Info
    } else {
      OperationLogLevel::Error
    };
    self
      .log(
        level,
        format!("{}: finished", log.stage),
        serde_json::to_value(log).ok(),
      )
      .await;
  }

  /// Persist progress on the operation row and mirror it into the
  /// log stream.
  pub async fn progress(
    &self,
    percent: i64,
    message: impl Into<String>,
  ) {
    let message = message.into();
    if let Err(e) = db_client()
      .operations
      .update_progress(&self.operation_id, percent, &message)
      .await
    {
      error!(
        "failed to update progress for operation {} | {e:#}",
        self.operation_id
      );
    }
    self
      .log(
        OperationLogLevel::Info,
        message,
        Some(serde_json::json!({ "progress": percent })),
      )
      .await;
  }
}
