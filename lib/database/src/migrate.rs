use anyhow::Context;
use sqlx::{Row, SqlitePool};
use tracing::info;

/// Initial table set. `IF NOT EXISTS` keeps re-runs cheap.
const CREATE_TABLES: &[&str] = &[
  "CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL DEFAULT '',
    created_at INTEGER NOT NULL
  )",
  "CREATE TABLE IF NOT EXISTS system_setup (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at INTEGER NOT NULL
  )",
  "CREATE TABLE IF NOT EXISTS apps_metadata (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL DEFAULT '',
    primary_service TEXT NOT NULL DEFAULT '',
    expected_services TEXT NOT NULL DEFAULT '[]',
    initial_setup_required INTEGER NOT NULL DEFAULT 0,
    icon TEXT,
    updated_at INTEGER NOT NULL
  )",
  "CREATE TABLE IF NOT EXISTS docker_operations (
    id TEXT PRIMARY KEY,
    operation_type TEXT NOT NULL,
    app_id TEXT NOT NULL,
    status TEXT NOT NULL,
    progress INTEGER NOT NULL DEFAULT 0,
    progress_message TEXT NOT NULL DEFAULT '',
    error_message TEXT NOT NULL DEFAULT '',
    metadata TEXT NOT NULL DEFAULT '{}',
    cancel_requested INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    completed_at INTEGER
  )",
  "CREATE TABLE IF NOT EXISTS docker_operation_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    operation_id TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    level TEXT NOT NULL,
    message TEXT NOT NULL,
    details TEXT
  )",
  "CREATE TABLE IF NOT EXISTS chat_messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    app_id TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    message TEXT NOT NULL,
    sender_type TEXT NOT NULL,
    sender_name TEXT NOT NULL DEFAULT '',
    status_level TEXT NOT NULL DEFAULT 'info',
    agent_model TEXT,
    agent_provider TEXT,
    details TEXT
  )",
  "CREATE TABLE IF NOT EXISTS ollama_models (
    name TEXT PRIMARY KEY,
    display_name TEXT NOT NULL DEFAULT '',
    category TEXT NOT NULL DEFAULT '',
    size_estimate TEXT NOT NULL DEFAULT '',
    description TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL DEFAULT 'not_downloaded',
    progress INTEGER NOT NULL DEFAULT 0,
    last_error TEXT NOT NULL DEFAULT '',
    updated_at INTEGER NOT NULL,
    completed_at INTEGER
  )",
  "CREATE TABLE IF NOT EXISTS ollama_download_jobs (
    id TEXT PRIMARY KEY,
    model_name TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'queued',
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
  )",
  "CREATE TABLE IF NOT EXISTS update_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    version TEXT NOT NULL,
    applied_at INTEGER NOT NULL,
    success INTEGER NOT NULL DEFAULT 1,
    details TEXT
  )",
  "CREATE TABLE IF NOT EXISTS system_vital_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp INTEGER NOT NULL,
    cpu_percent REAL NOT NULL DEFAULT 0,
    memory_percent REAL NOT NULL DEFAULT 0,
    disk_percent REAL NOT NULL DEFAULT 0
  )",
];

/// Columns the current code requires, beyond each table's primary
/// key. Databases created by earlier versions gain missing ones
/// through `ALTER TABLE ADD COLUMN`, existence checked first.
const REQUIRED_COLUMNS: &[(&str, &str, &str)] = &[
  ("users", "password_hash", "TEXT NOT NULL DEFAULT ''"),
  ("users", "created_at", "INTEGER NOT NULL DEFAULT 0"),
  ("apps_metadata", "name", "TEXT NOT NULL DEFAULT ''"),
  (
    "apps_metadata",
    "primary_service",
    "TEXT NOT NULL DEFAULT ''",
  ),
  (
    "apps_metadata",
    "expected_services",
    "TEXT NOT NULL DEFAULT '[]'",
  ),
  (
    "apps_metadata",
    "initial_setup_required",
    "INTEGER NOT NULL DEFAULT 0",
  ),
  ("apps_metadata", "icon", "TEXT"),
  ("docker_operations", "progress", "INTEGER NOT NULL DEFAULT 0"),
  (
    "docker_operations",
    "progress_message",
    "TEXT NOT NULL DEFAULT ''",
  ),
  (
    "docker_operations",
    "error_message",
    "TEXT NOT NULL DEFAULT ''",
  ),
  (
    "docker_operations",
    "metadata",
    "TEXT NOT NULL DEFAULT '{}'",
  ),
  (
    "docker_operations",
    "cancel_requested",
    "INTEGER NOT NULL DEFAULT 0",
  ),
  ("docker_operations", "completed_at", "INTEGER"),
  ("docker_operation_logs", "details", "TEXT"),
  ("chat_messages", "sender_name", "TEXT NOT NULL DEFAULT ''"),
  (
    "chat_messages",
    "status_level",
    "TEXT NOT NULL DEFAULT 'info'",
  ),
  ("chat_messages", "agent_model", "TEXT"),
  ("chat_messages", "agent_provider", "TEXT"),
  ("chat_messages", "details", "TEXT"),
  ("ollama_models", "display_name", "TEXT NOT NULL DEFAULT ''"),
  ("ollama_models", "category", "TEXT NOT NULL DEFAULT ''"),
  (
    "ollama_models",
    "size_estimate",
    "TEXT NOT NULL DEFAULT ''",
  ),
  ("ollama_models", "description", "TEXT NOT NULL DEFAULT ''"),
  ("ollama_models", "last_error", "TEXT NOT NULL DEFAULT ''"),
  ("ollama_models", "completed_at", "INTEGER"),
  ("update_history", "details", "TEXT"),
];

const CREATE_INDEXES: &[&str] = &[
  "CREATE INDEX IF NOT EXISTS idx_operation_logs_timestamp
    ON docker_operation_logs (timestamp)",
  "CREATE INDEX IF NOT EXISTS idx_vital_logs_timestamp
    ON system_vital_logs (timestamp)",
  "CREATE INDEX IF NOT EXISTS idx_chat_app_timestamp
    ON chat_messages (app_id, timestamp DESC)",
  "CREATE INDEX IF NOT EXISTS idx_operations_status_created
    ON docker_operations (status, created_at)",
];

/// Bring the schema up to what the current code requires.
/// Idempotent: running twice adds nothing on the second run.
pub async fn migrate(pool: &SqlitePool) -> anyhow::Result<()> {
  for create in CREATE_TABLES {
    sqlx::query(create)
      .execute(pool)
      .await
      .with_context(|| format!("failed to run: {create}"))?;
  }
  for (table, column, declaration) in REQUIRED_COLUMNS {
    ensure_column(pool, table, column, declaration).await?;
  }
  for create in CREATE_INDEXES {
    sqlx::query(create)
      .execute(pool)
      .await
      .with_context(|| format!("failed to run: {create}"))?;
  }
  Ok(())
}

/// Add the column unless `PRAGMA table_info` already lists it.
async fn ensure_column(
  pool: &SqlitePool,
  table: &str,
  column: &str,
  declaration: &str,
) -> anyhow::Result<()> {
  if column_exists(pool, table, column).await? {
    return Ok(());
  }
  let alter = format!(
    "ALTER TABLE {table} ADD COLUMN {column} {declaration}"
  );
  sqlx::query(&alter)
    .execute(pool)
    .await
    .with_context(|| format!("failed to run: {alter}"))?;
  info!("migrated: added column {table}.{column}");
  Ok(())
}

pub async fn column_exists(
  pool: &SqlitePool,
  table: &str,
  column: &str,
) -> anyhow::Result<bool> {
  let rows =
    sqlx::query(&format!("PRAGMA table_info({table})"))
      .fetch_all(pool)
      .await
      .with_context(|| {
        format!("failed to read table_info for {table}")
      })?;
  Ok(
    rows
      .iter()
      .any(|row| row.get::<String, _>("name") == column),
  )
}
