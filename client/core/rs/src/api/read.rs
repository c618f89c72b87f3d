use resolver_api::Resolve;
use serde::{Deserialize, Serialize};

use crate::entities::{
  app::{AppDetail, AppSummary},
  chat::ChatMessage,
  model::{DownloadJob, ModelRecord},
  operation::{Log, Operation, OperationLogEntry},
};

/// Version of the running core.
#[derive(Debug, Clone, Serialize, Deserialize, Resolve)]
#[response(GetVersionResponse)]
#[error(serror::Error)]
pub struct GetVersion {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetVersionResponse {
  pub version: String,
}

//

/// Scan the apps root and return a summary per installed app,
/// including the aggregate status computed against the runtime.
#[derive(Debug, Clone, Serialize, Deserialize, Resolve)]
#[response(Vec<AppSummary>)]
#[error(serror::Error)]
pub struct ListApps {}

//

/// Parsed compose, env, metadata, per-service runtime status, and
/// any active operation for one app.
#[derive(Debug, Clone, Serialize, Deserialize, Resolve)]
#[response(AppDetail)]
#[error(serror::Error)]
pub struct GetApp {
  pub id: String,
}

//

/// Tail the compose logs of an app's project.
#[derive(Debug, Clone, Serialize, Deserialize, Resolve)]
#[response(Log)]
#[error(serror::Error)]
pub struct GetAppLog {
  pub id: String,
  /// Filter the logs to specific services. Empty: all services.
  #[serde(default)]
  pub services: Vec<String>,
  /// Pass `--tail` for only recent log contents.
  #[serde(default = "default_tail")]
  pub tail: u64,
  /// Enable `--timestamps`
  #[serde(default)]
  pub timestamps: bool,
}

fn default_tail() -> u64 {
  50
}

//

#[derive(Debug, Clone, Serialize, Deserialize, Resolve)]
#[response(Operation)]
#[error(serror::Error)]
pub struct GetOperation {
  pub operation_id: String,
}

//

/// Operations newest first, optionally filtered to one app.
#[derive(Debug, Clone, Serialize, Deserialize, Resolve)]
#[response(Vec<Operation>)]
#[error(serror::Error)]
pub struct ListOperations {
  #[serde(default)]
  pub app_id: Option<String>,
  #[serde(default = "default_limit")]
  pub limit: i64,
}

//

/// Log rows of one operation in emit order.
#[derive(Debug, Clone, Serialize, Deserialize, Resolve)]
#[response(Vec<OperationLogEntry>)]
#[error(serror::Error)]
pub struct GetOperationLogs {
  pub operation_id: String,
}

//

/// Chat messages for an app, newest first.
#[derive(Debug, Clone, Serialize, Deserialize, Resolve)]
#[response(Vec<ChatMessage>)]
#[error(serror::Error)]
pub struct ListChatMessages {
  pub app_id: String,
  #[serde(default = "default_limit")]
  pub limit: i64,
}

fn default_limit() -> i64 {
  100
}

//

/// All model records known to this node.
#[derive(Debug, Clone, Serialize, Deserialize, Resolve)]
#[response(Vec<ModelRecord>)]
#[error(serror::Error)]
pub struct ListModels {}

//

/// Queued and recent model download jobs.
#[derive(Debug, Clone, Serialize, Deserialize, Resolve)]
#[response(Vec<DownloadJob>)]
#[error(serror::Error)]
pub struct ListDownloadJobs {}
