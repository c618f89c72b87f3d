//! Embedded relational store for the orchestrator core.
//!
//! A single SQLite file with WAL journaling. The files under the
//! apps root stay authoritative for app contents; the database
//! owns operations, their logs, chat, and model state.

use std::path::Path;

use anyhow::Context;
use sqlx::{
  SqlitePool,
  sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions,
  },
};

mod apps;
mod chat;
mod migrate;
mod models;
mod operations;
mod system;

pub use apps::AppsMetadata;
pub use chat::ChatMessages;
pub use migrate::{column_exists, migrate};
pub use models::{DownloadJobs, Models};
pub use operations::{OperationLogs, Operations};
pub use system::{SystemSetup, SystemVitals, UpdateHistory, Users};

#[derive(Debug, Clone)]
pub struct Client {
  pub users: Users,
  pub setup: SystemSetup,
  pub apps: AppsMetadata,
  pub operations: Operations,
  pub operation_logs: OperationLogs,
  pub chat: ChatMessages,
  pub models: Models,
  pub download_jobs: DownloadJobs,
  pub update_history: UpdateHistory,
  pub vitals: SystemVitals,
  pub pool: SqlitePool,
}

impl Client {
  pub async fn new(db_path: &Path) -> anyhow::Result<Client> {
    let pool = init(db_path).await?;
    Self::from_pool(pool).await
  }

  pub async fn from_pool(
    pool: SqlitePool,
  ) -> anyhow::Result<Client> {
    migrate(&pool)
      .await
      .context("failed to migrate database schema")?;
    Ok(Client {
      users: Users::new(&pool),
      setup: SystemSetup::new(&pool),
      apps: AppsMetadata::new(&pool),
      operations: Operations::new(&pool),
      operation_logs: OperationLogs::new(&pool),
      chat: ChatMessages::new(&pool),
      models: Models::new(&pool),
      download_jobs: DownloadJobs::new(&pool),
      update_history: UpdateHistory::new(&pool),
      vitals: SystemVitals::new(&pool),
      pool,
    })
  }
}

/// Initializes the unmigrated connection pool,
/// creating the database file if missing.
pub async fn init(db_path: &Path) -> anyhow::Result<SqlitePool> {
  if let Some(parent) = db_path.parent() {
    tokio::fs::create_dir_all(parent)
      .await
      .with_context(|| {
        format!("failed to create database directory {parent:?}")
      })?;
  }
  let options = SqliteConnectOptions::new()
    .filename(db_path)
    .create_if_missing(true)
    .journal_mode(SqliteJournalMode::Wal)
    .foreign_keys(true);
  SqlitePoolOptions::new()
    .max_connections(8)
    .connect_with(options)
    .await
    .with_context(|| {
      format!("failed to open database at {db_path:?}")
    })
}
