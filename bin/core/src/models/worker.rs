use std::time::Duration;

use command::{OutputLine, StreamingChild};
use tokio_util::sync::CancellationToken;
use treeos_client::{
  CoreError,
  entities::model::{
    DownloadJobStatus, INFERENCE_LABEL, ModelStatus,
  },
};

use crate::{
  config::core_config,
  models::{broadcast_event, progress::parse_pull_line},
  runtime,
  state::{db_client, model_cancels, model_queue},
};

/// Grace given to the host-side exec wrapper after SIGTERM.
const KILL_GRACE: Duration = Duration::from_millis(500);

pub fn spawn_download_workers() {
  let pool_size = core_config().model_pool_size;
  for index in 0..pool_size {
    tokio::spawn(worker_loop(index));
  }
  info!("spawned {pool_size} model download workers");
}

async fn worker_loop(index: usize) {
  loop {
    let job_id = {
      let mut rx = model_queue().rx.lock().await;
      rx.recv().await
    };
    let Some(job_id) = job_id else {
      break;
    };
    debug!("model worker {index} picked job {job_id}");
    if let Err(e) = run_job(&job_id).await {
      error!("model download job {job_id} errored | {e:#}");
    }
  }
}

/// Exactly one labeled inference container must be running.
async fn discover_inference_container(
) -> anyhow::Result<String> {
  let mut containers =
    runtime::list_by_label(INFERENCE_LABEL).await?;
  match containers.len() {
    0 => Err(
      CoreError::Runtime(String::from(
        "NoInferenceContainer: no running container labeled \
         ontree.inference=true",
      ))
      .into(),
    ),
    1 => Ok(containers.remove(0)),
    n => Err(
      CoreError::Runtime(format!(
        "MultipleInferenceContainers: {n} containers labeled \
         ontree.inference=true"
      ))
      .into(),
    ),
  }
}

async fn run_job(job_id: &str) -> anyhow::Result<()> {
  let db = db_client();
  let Some(job) = db.download_jobs.get(job_id).await? else {
    warn!("queued download job {job_id} has no row");
    return Ok(());
  };
  let model = job.model_name.clone();

  let cancel = model_cancels()
    .get(&model)
    .map(|token| token.clone())
    .unwrap_or_default();

  // Cancelled while still queued.
  if cancel.is_cancelled() {
    finish_cancelled(job_id, &model).await;
    model_cancels().remove(&model);
    return Ok(());
  }

  db.download_jobs
    .set_status(job_id, DownloadJobStatus::Processing)
    .await?;
  db.models
    .set_status(&model, ModelStatus::Downloading, 0, "")
    .await?;
  broadcast_event(&model, ModelStatus::Downloading, 0, None);

  let container = match discover_inference_container().await {
    Ok(container) => container,
    Err(e) => {
      finish_failed(job_id, &model, &format!("{e:#}")).await;
      model_cancels().remove(&model);
      return Ok(());
    }
  };

  let child = match runtime::exec_child(
    "Ollama Pull",
    &container,
    &format!("ollama pull {model}"),
  ) {
    Ok(child) => child,
    Err(e) => {
      finish_failed(job_id, &model, &format!("{e:#}")).await;
      model_cancels().remove(&model);
      return Ok(());
    }
  };

  drive_pull(job_id, &model, &container, child, &cancel).await;
  model_cancels().remove(&model);
  Ok(())
}

async fn drive_pull(
  job_id: &str,
  model: &str,
  container: &str,
  mut child: StreamingChild,
  cancel: &CancellationToken,
) {
  let db = db_client();
  let mut last_percent = 0i64;
  let deadline = tokio::time::sleep(Duration::from_secs(
    core_config().operation_timeouts.model_pull_secs,
  ));
  tokio::pin!(deadline);
  loop {
    tokio::select! {
      line = child.next_line() => {
        let Some(line) = line else {
          break;
        };
        let (OutputLine::Stdout(line)
          | OutputLine::Stderr(line)) = line;
        let Some(update) = parse_pull_line(&line) else {
          continue;
        };
        // Publish only changes, monotonic per job.
        if update.percent > last_percent {
          last_percent = update.percent;
          if let Err(e) = db
            .models
            .set_status(
              model,
              ModelStatus::Downloading,
              update.percent,
              "",
            )
            .await
          {
            error!(
              "failed to persist progress for {model} | {e:#}"
            );
          }
          broadcast_event(
            model,
            ModelStatus::Downloading,
            update.percent,
            None,
          );
        }
      }
      _ = cancel.cancelled() => {
        cancel_in_container(model, container, &mut child).await;
        let log = child.finish().await;
        debug!(
          "cancelled ollama pull exited | success: {}",
          log.success
        );
        finish_cancelled(job_id, model).await;
        return;
      }
      _ = &mut deadline => {
        cancel_in_container(model, container, &mut child).await;
        let _ = child.finish().await;
        finish_failed(
          job_id,
          model,
          "pull deadline exceeded",
        )
        .await;
        return;
      }
    }
  }

  let log = child.finish().await;
  if log.success {
    if let Err(e) = db.models.mark_completed(model).await {
      error!("failed to mark {model} completed | {e:#}");
    }
    if let Err(e) = db
      .download_jobs
      .set_status(job_id, DownloadJobStatus::Completed)
      .await
    {
      error!("failed to complete job {job_id} | {e:#}");
    }
    broadcast_event(model, ModelStatus::Completed, 100, None);
    info!("model {model} downloaded");
  } else {
    // Last stderr line usually carries the actual reason.
    let reason = log
      .stderr
      .lines()
      .rev()
      .find(|line| !line.trim().is_empty())
      .unwrap_or("ollama pull failed")
      .to_string();
    finish_failed(job_id, model, &reason).await;
  }
}

/// Killing the host-side exec wrapper does not reach the process
/// inside the container. Signal it by name first, then take the
/// wrapper down, then drop any partial blobs.
async fn cancel_in_container(
  model: &str,
  container: &str,
  child: &mut StreamingChild,
) {
  let log = runtime::exec_capture(
    "Kill Model Pull",
    container,
    &format!("sh -c \"pkill -f 'ollama pull {model}' || true\""),
  )
  .await;
  if !log.success {
    warn!(
      "in-container pkill for {model} failed: {}",
      log.combined()
    );
  }

  if let Err(e) = child.terminate(KILL_GRACE).await {
    warn!("failed to terminate pull wrapper | {e:#}");
  }

  // Best-effort blob cleanup; "not found" is fine.
  let log = runtime::exec_capture(
    "Remove Partial Model",
    container,
    &format!("ollama rm {model}"),
  )
  .await;
  if !log.success
    && !log.combined().to_lowercase().contains("not found")
  {
    warn!(
      "failed to remove partial blobs for {model}: {}",
      log.combined()
    );
  }
}

async fn finish_cancelled(job_id: &str, model: &str) {
  let db = db_client();
  if let Err(e) = db
    .download_jobs
    .set_status(job_id, DownloadJobStatus::Cancelled)
    .await
  {
    error!("failed to cancel job {job_id} | {e:#}");
  }
  if let Err(e) =
    db.models.reset_not_downloaded(model).await
  {
    error!("failed to reset model {model} | {e:#}");
  }
  broadcast_event(
    model,
    ModelStatus::NotDownloaded,
    0,
    Some(String::from("cancelled")),
  );
  warn!("model pull {model} cancelled");
}

async fn finish_failed(
  job_id: &str,
  model: &str,
  reason: &str,
) {
  let db = db_client();
  if let Err(e) = db
    .download_jobs
    .set_status(job_id, DownloadJobStatus::Failed)
    .await
  {
    error!("failed to fail job {job_id} | {e:#}");
  }
  if let Err(e) = db
    .models
    .set_status(model, ModelStatus::Failed, 0, reason)
    .await
  {
    error!("failed to fail model {model} | {e:#}");
  }
  broadcast_event(
    model,
    ModelStatus::Failed,
    0,
    Some(reason.to_string()),
  );
  error!("model pull {model} failed: {reason}");
}
