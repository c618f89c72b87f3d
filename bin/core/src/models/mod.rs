//! Model downloads: a FIFO job queue whose workers drive
//! `ollama pull` inside the running inference container, parse
//! its progress from stderr, and persist state to the model
//! records.

use tokio_util::sync::CancellationToken;
use treeos_client::{
  CoreError,
  api::execute::CancelOutcome,
  entities::{
    model::{
      DownloadJob, DownloadJobStatus, ModelPullEvent,
      ModelRecord, ModelStatus,
    },
    treeos_timestamp,
  },
};

use crate::state::{db_client, model_cancels, model_queue};

pub mod progress;
pub mod reconcile;
mod worker;

pub use worker::spawn_download_workers;

/// Reconciliation walks the manifests dir of the shared models
/// volume as the host sees it.
pub fn manifests_root() -> std::path::PathBuf {
  crate::config::core_config()
    .shared_models_root
    .join("manifests")
}

/// Queue a pull of the given model. One active job per model.
pub async fn queue_model_pull(
  model_name: &str,
) -> anyhow::Result<DownloadJob> {
  let db = db_client();

  if let Some(active) =
    db.download_jobs.active_for_model(model_name).await?
  {
    return Err(
      CoreError::Conflict(format!(
        "download {} already {} for model {model_name}",
        active.id, active.status
      ))
      .into(),
    );
  }

  let permit = model_queue().tx.try_reserve().map_err(|_| {
    anyhow::Error::from(CoreError::QueueFull)
  })?;

  // Make sure a record exists before flipping its status.
  if db.models.get(model_name).await?.is_none() {
    let ts = treeos_timestamp();
    db.models
      .upsert(&ModelRecord {
        name: model_name.to_string(),
        display_name: model_name.to_string(),
        category: String::new(),
        size_estimate: String::new(),
        description: String::new(),
        status: ModelStatus::NotDownloaded,
        progress: 0,
        last_error: String::new(),
        updated_at: ts,
        completed_at: None,
      })
      .await?;
  }

  let ts = treeos_timestamp();
  let job = DownloadJob {
    id: uuid::Uuid::new_v4().to_string(),
    model_name: model_name.to_string(),
    status: DownloadJobStatus::Queued,
    created_at: ts,
    updated_at: ts,
  };
  db.download_jobs.create(&job).await?;
  db.models
    .set_status(model_name, ModelStatus::Queued, 0, "")
    .await?;
  model_cancels()
    .insert(model_name.to_string(), CancellationToken::new());
  permit.send(job.id.clone());

  broadcast_event(model_name, ModelStatus::Queued, 0, None);
  info!("queued model pull {model_name} (job {})", job.id);
  Ok(job)
}

/// Cancel an active or queued download. The worker owns the full
/// protocol (in-container pkill before host kill); this only
/// trips its token.
pub async fn cancel_model_pull(
  model_name: &str,
) -> anyhow::Result<CancelOutcome> {
  let Some(token) = model_cancels().get(model_name) else {
    return Ok(CancelOutcome::NotActive);
  };
  token.cancel();
  warn!("cancel requested for model pull {model_name}");
  Ok(CancelOutcome::Cancelled)
}

/// Best-effort: delivery through the broadcast ring buffer, slow
/// subscribers lose old events rather than blocking the worker.
/// Durable state is on the model record.
pub(crate) fn broadcast_event(
  model_name: &str,
  status: ModelStatus,
  progress: i64,
  error: Option<String>,
) {
  let _ = crate::state::model_events().send(ModelPullEvent {
    model_name: model_name.to_string(),
    status,
    progress,
    error,
  });
}
