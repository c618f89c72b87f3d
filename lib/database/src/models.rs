use anyhow::Context;
use sqlx::{FromRow, SqlitePool};
use treeos_client::entities::{
  model::{
    DownloadJob, DownloadJobStatus, ModelRecord, ModelStatus,
  },
  treeos_timestamp,
};

#[derive(Debug, Clone)]
pub struct Models {
  pool: SqlitePool,
}

#[derive(FromRow)]
struct ModelRow {
  name: String,
  display_name: String,
  category: String,
  size_estimate: String,
  description: String,
  status: String,
  progress: i64,
  last_error: String,
  updated_at: i64,
  completed_at: Option<i64>,
}

impl TryFrom<ModelRow> for ModelRecord {
  type Error = anyhow::Error;
  fn try_from(row: ModelRow) -> anyhow::Result<ModelRecord> {
    Ok(ModelRecord {
      status: row
        .status
        .parse::<ModelStatus>()
        .with_context(|| {
          format!("bad model status: {}", row.status)
        })?,
      name: row.name,
      display_name: row.display_name,
      category: row.category,
      size_estimate: row.size_estimate,
      description: row.description,
      progress: row.progress,
      last_error: row.last_error,
      updated_at: row.updated_at,
      completed_at: row.completed_at,
    })
  }
}

impl Models {
  pub fn new(pool: &SqlitePool) -> Models {
    Models { pool: pool.clone() }
  }

  pub async fn get(
    &self,
    name: &str,
  ) -> anyhow::Result<Option<ModelRecord>> {
    sqlx::query_as::<_, ModelRow>(
      "SELECT * FROM ollama_models WHERE name = ?",
    )
    .bind(name)
    .fetch_optional(&self.pool)
    .await
    .context("failed to get model record")?
    .map(ModelRecord::try_from)
    .transpose()
  }

  pub async fn list(&self) -> anyhow::Result<Vec<ModelRecord>> {
    let rows = sqlx::query_as::<_, ModelRow>(
      "SELECT * FROM ollama_models ORDER BY name",
    )
    .fetch_all(&self.pool)
    .await
    .context("failed to list model records")?;
    rows.into_iter().map(ModelRecord::try_from).collect()
  }

  pub async fn list_completed(
    &self,
  ) -> anyhow::Result<Vec<ModelRecord>> {
    let rows = sqlx::query_as::<_, ModelRow>(
      "SELECT * FROM ollama_models WHERE status = 'completed'",
    )
    .fetch_all(&self.pool)
    .await
    .context("failed to list completed models")?;
    rows.into_iter().map(ModelRecord::try_from).collect()
  }

  /// Insert the record or update its descriptive fields,
  /// preserving download state.
  pub async fn upsert(
    &self,
    record: &ModelRecord,
  ) -> anyhow::Result<()> {
    sqlx::query(
      "INSERT INTO ollama_models
        (name, display_name, category, size_estimate, description,
         status, progress, last_error, updated_at, completed_at)
       VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
       ON CONFLICT(name) DO UPDATE SET
         display_name = excluded.display_name,
         category = excluded.category,
         size_estimate = excluded.size_estimate,
         description = excluded.description,
         updated_at = excluded.updated_at",
    )
    .bind(&record.name)
    .bind(&record.display_name)
    .bind(&record.category)
    .bind(&record.size_estimate)
    .bind(&record.description)
    .bind(record.status.to_string())
    .bind(record.progress)
    .bind(&record.last_error)
    .bind(record.updated_at)
    .bind(record.completed_at)
    .execute(&self.pool)
    .await
    .context("failed to upsert model record")?;
    Ok(())
  }

  pub async fn set_status(
    &self,
    name: &str,
    status: ModelStatus,
    progress: i64,
    last_error: &str,
  ) -> anyhow::Result<()> {
    sqlx::query(
      "UPDATE ollama_models
       SET status = ?, progress = ?, last_error = ?, updated_at = ?
       WHERE name = ?",
    )
    .bind(status.to_string())
    .bind(progress)
    .bind(last_error)
    .bind(treeos_timestamp())
    .bind(name)
    .execute(&self.pool)
    .await
    .context("failed to set model status")?;
    Ok(())
  }

  /// Mark a model completed, creating the record if the model was
  /// discovered on disk without ever being queued here.
  pub async fn mark_completed(
    &self,
    name: &str,
  ) -> anyhow::Result<()> {
    let ts = treeos_timestamp();
    sqlx::query(
      "INSERT INTO ollama_models
        (name, status, progress, updated_at, completed_at)
       VALUES (?, 'completed', 100, ?, ?)
       ON CONFLICT(name) DO UPDATE SET
         status = 'completed', progress = 100, last_error = '',
         updated_at = excluded.updated_at,
         completed_at = excluded.completed_at",
    )
    .bind(name)
    .bind(ts)
    .bind(ts)
    .execute(&self.pool)
    .await
    .context("failed to mark model completed")?;
    Ok(())
  }

  pub async fn reset_not_downloaded(
    &self,
    name: &str,
  ) -> anyhow::Result<()> {
    sqlx::query(
      "UPDATE ollama_models
       SET status = 'not_downloaded', progress = 0,
           completed_at = NULL, updated_at = ?
       WHERE name = ?",
    )
    .bind(treeos_timestamp())
    .bind(name)
    .execute(&self.pool)
    .await
    .context("failed to reset model record")?;
    Ok(())
  }
}

//

#[derive(Debug, Clone)]
pub struct DownloadJobs {
  pool: SqlitePool,
}

#[derive(FromRow)]
struct DownloadJobRow {
  id: String,
  model_name: String,
  status: String,
  created_at: i64,
  updated_at: i64,
}

impl TryFrom<DownloadJobRow> for DownloadJob {
  type Error = anyhow::Error;
  fn try_from(row: DownloadJobRow) -> anyhow::Result<DownloadJob> {
    Ok(DownloadJob {
      status: row
        .status
        .parse::<DownloadJobStatus>()
        .with_context(|| {
          format!("bad download job status: {}", row.status)
        })?,
      id: row.id,
      model_name: row.model_name,
      created_at: row.created_at,
      updated_at: row.updated_at,
    })
  }
}

impl DownloadJobs {
  pub fn new(pool: &SqlitePool) -> DownloadJobs {
    DownloadJobs { pool: pool.clone() }
  }

  pub async fn create(
    &self,
    job: &DownloadJob,
  ) -> anyhow::Result<()> {
    sqlx::query(
      "INSERT INTO ollama_download_jobs
        (id, model_name, status, created_at, updated_at)
       VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&job.id)
    .bind(&job.model_name)
    .bind(job.status.to_string())
    .bind(job.created_at)
    .bind(job.updated_at)
    .execute(&self.pool)
    .await
    .context("failed to insert download job")?;
    Ok(())
  }

  pub async fn get(
    &self,
    id: &str,
  ) -> anyhow::Result<Option<DownloadJob>> {
    sqlx::query_as::<_, DownloadJobRow>(
      "SELECT * FROM ollama_download_jobs WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&self.pool)
    .await
    .context("failed to get download job")?
    .map(DownloadJob::try_from)
    .transpose()
  }

  pub async fn set_status(
    &self,
    id: &str,
    status: DownloadJobStatus,
  ) -> anyhow::Result<()> {
    sqlx::query(
      "UPDATE ollama_download_jobs
       SET status = ?, updated_at = ? WHERE id = ?",
    )
    .bind(status.to_string())
    .bind(treeos_timestamp())
    .bind(id)
    .execute(&self.pool)
    .await
    .context("failed to update download job")?;
    Ok(())
  }

  pub async fn list(&self) -> anyhow::Result<Vec<DownloadJob>> {
    let rows = sqlx::query_as::<_, DownloadJobRow>(
      "SELECT * FROM ollama_download_jobs
       ORDER BY created_at DESC LIMIT 100",
    )
    .fetch_all(&self.pool)
    .await
    .context("failed to list download jobs")?;
    rows.into_iter().map(DownloadJob::try_from).collect()
  }

  /// An active download job for the model, if one exists.
  pub async fn active_for_model(
    &self,
    model_name: &str,
  ) -> anyhow::Result<Option<DownloadJob>> {
    sqlx::query_as::<_, DownloadJobRow>(
      "SELECT * FROM ollama_download_jobs
       WHERE model_name = ? AND status IN ('queued', 'processing')
       ORDER BY created_at LIMIT 1",
    )
    .bind(model_name)
    .fetch_optional(&self.pool)
    .await
    .context("failed to query active download job")?
    .map(DownloadJob::try_from)
    .transpose()
  }

  /// Fail jobs left queued / processing by a previous process.
  /// The queue is in-memory, so they cannot resume.
  pub async fn fail_inflight(&self) -> anyhow::Result<u64> {
    let res = sqlx::query(
      "UPDATE ollama_download_jobs
       SET status = 'failed', updated_at = ?
       WHERE status IN ('queued', 'processing')",
    )
    .bind(treeos_timestamp())
    .execute(&self.pool)
    .await
    .context("failed to fail inflight download jobs")?;
    Ok(res.rows_affected())
  }
}
