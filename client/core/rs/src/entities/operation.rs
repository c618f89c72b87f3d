use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::treeos_timestamp;

/// Types of long-running operations executed by the worker pool.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  Display,
  EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OperationType {
  PullImage,
  Start,
  Stop,
  Recreate,
  UpdateImage,
  CreateApp,
  DeleteApp,
}

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  Display,
  EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OperationStatus {
  #[default]
  Pending,
  InProgress,
  Completed,
  Failed,
}

impl OperationStatus {
  /// Pending / in progress operations block new ones for the app.
  pub fn active(self) -> bool {
    matches!(
      self,
      OperationStatus::Pending | OperationStatus::InProgress
    )
  }
}

/// A durable record of a long-running task against one app.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
  /// Opaque UUID.
  pub id: String,
  pub operation_type: OperationType,
  pub app_id: String,
  pub status: OperationStatus,
  /// 0 - 100, monotonically non-decreasing within a phase.
  pub progress: i64,
  #[serde(default)]
  pub progress_message: String,
  #[serde(default)]
  pub error_message: String,
  /// Opaque structured value attached at enqueue time.
  #[serde(default)]
  pub metadata: serde_json::Value,
  /// Durable half of the cancellation flag. The worker observes
  /// it between phases and at I/O boundaries.
  #[serde(default)]
  pub cancel_requested: bool,
  pub created_at: i64,
  pub updated_at: i64,
  #[serde(default)]
  pub completed_at: Option<i64>,
}

impl Operation {
  pub fn new(
    operation_type: OperationType,
    app_id: impl Into<String>,
    metadata: serde_json::Value,
  ) -> Operation {
    let ts = treeos_timestamp();
    Operation {
      id: uuid::Uuid::new_v4().to_string(),
      operation_type,
      app_id: app_id.into(),
      status: OperationStatus::Pending,
      progress: 0,
      progress_message: String::new(),
      error_message: String::new(),
      metadata,
      cancel_requested: false,
      created_at: ts,
      updated_at: ts,
      completed_at: None,
    }
  }

  /// Whether the record is older than the given threshold,
  /// judged by last update. Stale in-flight operations must not
  /// block the UI spinner.
  pub fn stale(&self, threshold_ms: i64) -> bool {
    treeos_timestamp() - self.updated_at > threshold_ms
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  Display,
  EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OperationLogLevel {
  Debug,
  #[default]
  Info,
  Warning,
  Error,
}

/// Append-only, per-operation structured log row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationLogEntry {
  pub operation_id: String,
  pub timestamp: i64,
  pub level: OperationLogLevel,
  pub message: String,
  /// Equivalent runtime command, parsed progress, etc.
  #[serde(default)]
  pub details: Option<serde_json::Value>,
}

/// The result of one command execution, kept in operation log
/// details and returned by the runtime adapter's capture calls.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Log {
  /// Short label for the stage of the run, eg `Compose Up`.
  pub stage: String,
  pub command: String,
  pub stdout: String,
  pub stderr: String,
  pub success: bool,
  pub start_ts: i64,
  pub end_ts: i64,
}

impl Log {
  pub fn simple(
    stage: &str,
    msg: impl Into<String>,
  ) -> Log {
    let ts = treeos_timestamp();
    Log {
      stage: stage.to_string(),
      stdout: msg.into(),
      success: true,
      start_ts: ts,
      end_ts: ts,
      ..Default::default()
    }
  }

  pub fn error(stage: &str, msg: impl Into<String>) -> Log {
    let ts = treeos_timestamp();
    Log {
      stage: stage.to_string(),
      stderr: msg.into(),
      success: false,
      start_ts: ts,
      end_ts: ts,
      ..Default::default()
    }
  }

  /// stdout and stderr combined, stdout first.
  pub fn combined(&self) -> String {
    match (self.stdout.is_empty(), self.stderr.is_empty()) {
      (true, true) => String::new(),
      (false, true) => self.stdout.clone(),
      (true, false) => self.stderr.clone(),
      (false, false) => {
        format!("stdout:\n{}\nstderr:\n{}", self.stdout, self.stderr)
      }
    }
  }
}
