use resolver_api::Resolve;
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::entities::{
  model::DownloadJob,
  operation::{Log, Operation},
};

/// Result of a cancel call. Cancelling something already finished
/// (or never started) is a no-op, not an error.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CancelOutcome {
  Cancelled,
  NotActive,
}

/// Re-read and re-validate the compose file from disk, then
/// enqueue a `start` operation.
#[derive(Debug, Clone, Serialize, Deserialize, Resolve)]
#[response(Operation)]
#[error(serror::Error)]
pub struct StartApp {
  pub id: String,
}

//

/// `compose down` without removing named volumes. Completes
/// inline or as an operation per the deployment's `stop_mode`.
#[derive(Debug, Clone, Serialize, Deserialize, Resolve)]
#[response(StopAppResponse)]
#[error(serror::Error)]
pub struct StopApp {
  pub id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StopAppResponse {
  /// Set in `operation` stop mode.
  pub operation: Option<Operation>,
  /// Set in `inline` stop mode.
  pub log: Option<Log>,
}

//

/// Stop, remove containers, pull, start.
#[derive(Debug, Clone, Serialize, Deserialize, Resolve)]
#[response(Operation)]
#[error(serror::Error)]
pub struct RecreateApp {
  pub id: String,
}

//

/// Explicit image pull for every service of the app.
#[derive(Debug, Clone, Serialize, Deserialize, Resolve)]
#[response(Operation)]
#[error(serror::Error)]
pub struct PullAppImages {
  pub id: String,
}

//

/// Pull, then up with force-recreate semantics. Reports
/// "up to date" if no new image was pulled.
#[derive(Debug, Clone, Serialize, Deserialize, Resolve)]
#[response(Operation)]
#[error(serror::Error)]
pub struct UpdateAppImage {
  pub id: String,
}

//

/// Stop and remove containers and network, optionally wipe named
/// volumes, then remove the app directory tree.
#[derive(Debug, Clone, Serialize, Deserialize, Resolve)]
#[response(Operation)]
#[error(serror::Error)]
pub struct DeleteApp {
  pub id: String,
  #[serde(default)]
  pub wipe_volumes: bool,
  /// Must equal `delete <id>`. Guards against a stray id passed
  /// where a confirmation was meant.
  pub confirm: String,
}

//

/// Atomically flag an operation for cancellation. The worker
/// observes the flag at the next phase / I-O boundary.
#[derive(Debug, Clone, Serialize, Deserialize, Resolve)]
#[response(CancelOutcome)]
#[error(serror::Error)]
pub struct CancelOperation {
  pub operation_id: String,
}

//

/// Queue a model download executed inside the running inference
/// container.
#[derive(Debug, Clone, Serialize, Deserialize, Resolve)]
#[response(DownloadJob)]
#[error(serror::Error)]
pub struct PullModel {
  pub model_name: String,
}

//

/// Cancel an active or queued model download. Kills the
/// in-container pull process, not only the host exec wrapper.
#[derive(Debug, Clone, Serialize, Deserialize, Resolve)]
#[response(CancelOutcome)]
#[error(serror::Error)]
pub struct CancelModelPull {
  pub model_name: String,
}

//

/// Walk the shared models volume and reconcile model records with
/// the manifests actually on disk.
#[derive(Debug, Clone, Serialize, Deserialize, Resolve)]
#[response(ReconcileModelsResponse)]
#[error(serror::Error)]
pub struct ReconcileModels {}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconcileModelsResponse {
  /// Models found on disk and marked completed.
  pub completed: u64,
  /// Records previously completed whose manifest is gone,
  /// reset to not_downloaded.
  pub reset: u64,
}
