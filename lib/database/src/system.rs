//! Tables owned by external collaborators (auth, setup wizard,
//! self-update, vitals collection). The core only guarantees the
//! schema and the retention cleanup; the row surface is minimal.

use anyhow::Context;
use sqlx::{FromRow, SqlitePool};
use treeos_client::entities::treeos_timestamp;

#[derive(Debug, Clone)]
pub struct Users {
  pool: SqlitePool,
}

#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
  pub id: i64,
  pub username: String,
  pub created_at: i64,
}

impl Users {
  pub fn new(pool: &SqlitePool) -> Users {
    Users { pool: pool.clone() }
  }

  pub async fn list(&self) -> anyhow::Result<Vec<UserRow>> {
    sqlx::query_as::<_, UserRow>(
      "SELECT id, username, created_at FROM users",
    )
    .fetch_all(&self.pool)
    .await
    .context("failed to list users")
  }
}

//

#[derive(Debug, Clone)]
pub struct SystemSetup {
  pool: SqlitePool,
}

impl SystemSetup {
  pub fn new(pool: &SqlitePool) -> SystemSetup {
    SystemSetup { pool: pool.clone() }
  }

  pub async fn get(
    &self,
    key: &str,
  ) -> anyhow::Result<Option<String>> {
    let row: Option<(String,)> = sqlx::query_as(
      "SELECT value FROM system_setup WHERE key = ?",
    )
    .bind(key)
    .fetch_optional(&self.pool)
    .await
    .context("failed to read system setup")?;
    Ok(row.map(|(value,)| value))
  }

  pub async fn set(
    &self,
    key: &str,
    value: &str,
  ) -> anyhow::Result<()> {
    sqlx::query(
      "INSERT INTO system_setup (key, value, updated_at)
       VALUES (?, ?, ?)
       ON CONFLICT(key) DO UPDATE SET
         value = excluded.value,
         updated_at = excluded.updated_at",
    )
    .bind(key)
    .bind(value)
    .bind(treeos_timestamp())
    .execute(&self.pool)
    .await
    .context("failed to write system setup")?;
    Ok(())
  }
}

//

#[derive(Debug, Clone)]
pub struct UpdateHistory {
  pool: SqlitePool,
}

impl UpdateHistory {
  pub fn new(pool: &SqlitePool) -> UpdateHistory {
    UpdateHistory { pool: pool.clone() }
  }

  pub async fn latest(
    &self,
  ) -> anyhow::Result<Option<(String, i64)>> {
    sqlx::query_as(
      "SELECT version, applied_at FROM update_history
       ORDER BY applied_at DESC LIMIT 1",
    )
    .fetch_optional(&self.pool)
    .await
    .context("failed to read update history")
  }
}

//

#[derive(Debug, Clone)]
pub struct SystemVitals {
  pool: SqlitePool,
}

impl SystemVitals {
  pub fn new(pool: &SqlitePool) -> SystemVitals {
    SystemVitals { pool: pool.clone() }
  }

  /// Retention cleanup shared with operation logs.
  pub async fn delete_before(
    &self,
    timestamp: i64,
  ) -> anyhow::Result<u64> {
    let res = sqlx::query(
      "DELETE FROM system_vital_logs WHERE timestamp < ?",
    )
    .bind(timestamp)
    .execute(&self.pool)
    .await
    .context("failed to delete old vital logs")?;
    Ok(res.rows_affected())
  }
}
