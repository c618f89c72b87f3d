use anyhow::Context;
use sqlx::{FromRow, SqlitePool};
use treeos_client::entities::{
  operation::{
    Operation, OperationLogEntry, OperationLogLevel,
    OperationStatus, OperationType,
  },
  treeos_timestamp,
};

#[derive(Debug, Clone)]
pub struct Operations {
  pool: SqlitePool,
}

#[derive(FromRow)]
struct OperationRow {
  id: String,
  operation_type: String,
  app_id: String,
  status: String,
  progress: i64,
  progress_message: String,
  error_message: String,
  metadata: String,
  cancel_requested: i64,
  created_at: i64,
  updated_at: i64,
  completed_at: Option<i64>,
}

impl TryFrom<OperationRow> for Operation {
  type Error = anyhow::Error;
  fn try_from(row: OperationRow) -> anyhow::Result<Operation> {
    Ok(Operation {
      operation_type: row
        .operation_type
        .parse::<OperationType>()
        .with_context(|| {
          format!("bad operation_type: {}", row.operation_type)
        })?,
      status: row
        .status
        .parse::<OperationStatus>()
        .with_context(|| format!("bad status: {}", row.status))?,
      metadata: serde_json::from_str(&row.metadata)
        .unwrap_or_default(),
      cancel_requested: row.cancel_requested != 0,
      id: row.id,
      app_id: row.app_id,
      progress: row.progress,
      progress_message: row.progress_message,
      error_message: row.error_message,
      created_at: row.created_at,
      updated_at: row.updated_at,
      completed_at: row.completed_at,
    })
  }
}

impl Operations {
  pub fn new(pool: &SqlitePool) -> Operations {
    Operations { pool: pool.clone() }
  }

  pub async fn create(
    &self,
    operation: &Operation,
  ) -> anyhow::Result<()> {
    sqlx::query(
      "INSERT INTO docker_operations
        (id, operation_type, app_id, status, progress,
         progress_message, error_message, metadata,
         cancel_requested, created_at, updated_at, completed_at)
       VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&operation.id)
    .bind(operation.operation_type.to_string())
    .bind(&operation.app_id)
    .bind(operation.status.to_string())
    .bind(operation.progress)
    .bind(&operation.progress_message)
    .bind(&operation.error_message)
    .bind(operation.metadata.to_string())
    .bind(operation.cancel_requested as i64)
    .bind(operation.created_at)
    .bind(operation.updated_at)
    .bind(operation.completed_at)
    .execute(&self.pool)
    .await
    .context("failed to insert operation")?;
    Ok(())
  }

  pub async fn get(
    &self,
    id: &str,
  ) -> anyhow::Result<Option<Operation>> {
    sqlx::query_as::<_, OperationRow>(
      "SELECT * FROM docker_operations WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&self.pool)
    .await
    .context("failed to get operation")?
    .map(Operation::try_from)
    .transpose()
  }

  pub async fn list(
    &self,
    app_id: Option<&str>,
    limit: i64,
  ) -> anyhow::Result<Vec<Operation>> {
    let rows = match app_id {
      Some(app_id) => {
        sqlx::query_as::<_, OperationRow>(
          "SELECT * FROM docker_operations WHERE app_id = ?
           ORDER BY created_at DESC LIMIT ?",
        )
        .bind(app_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
      }
      None => {
        sqlx::query_as::<_, OperationRow>(
          "SELECT * FROM docker_operations
           ORDER BY created_at DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
      }
    }
    .context("failed to list operations")?;
    rows.into_iter().map(Operation::try_from).collect()
  }

  /// The pending / in-progress operation for an app, if any.
  /// At most one exists, enforced at enqueue.
  pub async fn active_for_app(
    &self,
    app_id: &str,
  ) -> anyhow::Result<Option<Operation>> {
    sqlx::query_as::<_, OperationRow>(
      "SELECT * FROM docker_operations
       WHERE app_id = ? AND status IN ('pending', 'in_progress')
       ORDER BY created_at LIMIT 1",
    )
    .bind(app_id)
    .fetch_optional(&self.pool)
    .await
    .context("failed to query active operation")?
    .map(Operation::try_from)
    .transpose()
  }

  /// All pending / in-progress operations, oldest first.
  /// Crash recovery input.
  pub async fn list_active(
    &self,
  ) -> anyhow::Result<Vec<Operation>> {
    let rows = sqlx::query_as::<_, OperationRow>(
      "SELECT * FROM docker_operations
       WHERE status IN ('pending', 'in_progress')
       ORDER BY created_at",
    )
    .fetch_all(&self.pool)
    .await
    .context("failed to list active operations")?;
    rows.into_iter().map(Operation::try_from).collect()
  }

  pub async fn set_in_progress(
    &self,
    id: &str,
  ) -> anyhow::Result<()> {
    sqlx::query(
      "UPDATE docker_operations
       SET status = 'in_progress', updated_at = ?
       WHERE id = ?",
    )
    .bind(treeos_timestamp())
    .bind(id)
    .execute(&self.pool)
    .await
    .context("failed to set operation in progress")?;
    Ok(())
  }

  pub async fn update_progress(
    &self,
    id: &str,
    progress: i64,
    message: &str,
  ) -> anyhow::Result<()> {
    sqlx::query(
      "UPDATE docker_operations
       SET progress = ?, progress_message = ?, updated_at = ?
       WHERE id = ?",
    )
    .bind(progress)
    .bind(message)
    .bind(treeos_timestamp())
    .bind(id)
    .execute(&self.pool)
    .await
    .context("failed to update operation progress")?;
    Ok(())
  }

  pub async fn complete(&self, id: &str) -> anyhow::Result<()> {
    let ts = treeos_timestamp();
    sqlx::query(
      "UPDATE docker_operations
       SET status = 'completed', progress = 100,
           updated_at = ?, completed_at = ?
       WHERE id = ?",
    )
    .bind(ts)
    .bind(ts)
    .bind(id)
    .execute(&self.pool)
    .await
    .context("failed to complete operation")?;
    Ok(())
  }

  /// Durable half of [CancelOperation]. Only effective while the
  /// operation is still active.
  pub async fn request_cancel(
    &self,
    id: &str,
  ) -> anyhow::Result<bool> {
    let res = sqlx::query(
      "UPDATE docker_operations
       SET cancel_requested = 1, updated_at = ?
       WHERE id = ? AND status IN ('pending', 'in_progress')",
    )
    .bind(treeos_timestamp())
    .bind(id)
    .execute(&self.pool)
    .await
    .context("failed to flag operation cancel")?;
    Ok(res.rows_affected() > 0)
  }

  pub async fn cancel_requested(
    &self,
    id: &str,
  ) -> anyhow::Result<bool> {
    let row: Option<(i64,)> = sqlx::query_as(
      "SELECT cancel_requested FROM docker_operations
       WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&self.pool)
    .await
    .context("failed to read cancel flag")?;
    Ok(row.map(|(flag,)| flag != 0).unwrap_or_default())
  }

  pub async fn fail(
    &self,
    id: &str,
    error_message: &str,
  ) -> anyhow::Result<()> {
    let ts = treeos_timestamp();
    sqlx::query(
      "UPDATE docker_operations
       SET status = 'failed', error_message = ?,
           updated_at = ?, completed_at = ?
       WHERE id = ?",
    )
    .bind(error_message)
    .bind(ts)
    .bind(ts)
    .bind(id)
    .execute(&self.pool)
    .await
    .context("failed to fail operation")?;
    Ok(())
  }
}

//

#[derive(Debug, Clone)]
pub struct OperationLogs {
  pool: SqlitePool,
}

#[derive(FromRow)]
struct OperationLogRow {
  operation_id: String,
  timestamp: i64,
  level: String,
  message: String,
  details: Option<String>,
}

impl TryFrom<OperationLogRow> for OperationLogEntry {
  type Error = anyhow::Error;
  fn try_from(
    row: OperationLogRow,
  ) -> anyhow::Result<OperationLogEntry> {
    Ok(OperationLogEntry {
      level: row
        .level
        .parse::<OperationLogLevel>()
        .with_context(|| format!("bad log level: {}", row.level))?,
      details: row
        .details
        .as_deref()
        .and_then(|details| serde_json::from_str(details).ok()),
      operation_id: row.operation_id,
      timestamp: row.timestamp,
      message: row.message,
    })
  }
}

impl OperationLogs {
  pub fn new(pool: &SqlitePool) -> OperationLogs {
    OperationLogs { pool: pool.clone() }
  }

  /// Append-only. Application code never updates or deletes rows,
  /// only the retention cleanup does.
  pub async fn append(
    &self,
    entry: &OperationLogEntry,
  ) -> anyhow::Result<()> {
    sqlx::query(
      "INSERT INTO docker_operation_logs
        (operation_id, timestamp, level, message, details)
       VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&entry.operation_id)
    .bind(entry.timestamp)
    .bind(entry.level.to_string())
    .bind(&entry.message)
    .bind(entry.details.as_ref().map(|d| d.to_string()))
    .execute(&self.pool)
    .await
    .context("failed to append operation log")?;
    Ok(())
  }

  /// Rows in emit order via the (timestamp, id) index.
  pub async fn list(
    &self,
    operation_id: &str,
  ) -> anyhow::Result<Vec<OperationLogEntry>> {
    let rows = sqlx::query_as::<_, OperationLogRow>(
      "SELECT operation_id, timestamp, level, message, details
       FROM docker_operation_logs WHERE operation_id = ?
       ORDER BY timestamp, id",
    )
    .bind(operation_id)
    .fetch_all(&self.pool)
    .await
    .context("failed to list operation logs")?;
    rows.into_iter().map(OperationLogEntry::try_from).collect()
  }

  /// Retention cleanup. Returns deleted row count.
  pub async fn delete_before(
    &self,
    timestamp: i64,
  ) -> anyhow::Result<u64> {
    let res = sqlx::query(
      "DELETE FROM docker_operation_logs WHERE timestamp < ?",
    )
    .bind(timestamp)
    .execute(&self.pool)
    .await
    .context("failed to delete old operation logs")?;
    Ok(res.rows_affected())
  }
}
