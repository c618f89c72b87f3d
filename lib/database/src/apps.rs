use anyhow::Context;
use sqlx::{FromRow, SqlitePool};
use treeos_client::entities::{
  app::AppManifest, treeos_timestamp,
};

/// Cache of app manifests. The files on disk remain authoritative;
/// this exists so external collaborators can join on app ids
/// without touching the filesystem.
#[derive(Debug, Clone)]
pub struct AppsMetadata {
  pool: SqlitePool,
}

#[derive(FromRow)]
struct AppMetadataRow {
  id: String,
  name: String,
  primary_service: String,
  expected_services: String,
  initial_setup_required: i64,
  icon: Option<String>,
}

impl From<AppMetadataRow> for AppManifest {
  fn from(row: AppMetadataRow) -> AppManifest {
    AppManifest {
      expected_services: serde_json::from_str(
        &row.expected_services,
      )
      .unwrap_or_default(),
      initial_setup_required: row.initial_setup_required != 0,
      id: row.id,
      name: row.name,
      primary_service: row.primary_service,
      icon: row.icon,
    }
  }
}

impl AppsMetadata {
  pub fn new(pool: &SqlitePool) -> AppsMetadata {
    AppsMetadata { pool: pool.clone() }
  }

  pub async fn upsert(
    &self,
    manifest: &AppManifest,
  ) -> anyhow::Result<()> {
    sqlx::query(
      "INSERT INTO apps_metadata
        (id, name, primary_service, expected_services,
         initial_setup_required, icon, updated_at)
       VALUES (?, ?, ?, ?, ?, ?, ?)
       ON CONFLICT(id) DO UPDATE SET
         name = excluded.name,
         primary_service = excluded.primary_service,
         expected_services = excluded.expected_services,
         initial_setup_required = excluded.initial_setup_required,
         icon = excluded.icon,
         updated_at = excluded.updated_at",
    )
    .bind(&manifest.id)
    .bind(&manifest.name)
    .bind(&manifest.primary_service)
    .bind(
      serde_json::to_string(&manifest.expected_services)
        .unwrap_or_else(|_| String::from("[]")),
    )
    .bind(manifest.initial_setup_required as i64)
    .bind(&manifest.icon)
    .bind(treeos_timestamp())
    .execute(&self.pool)
    .await
    .context("failed to upsert app metadata")?;
    Ok(())
  }

  pub async fn get(
    &self,
    id: &str,
  ) -> anyhow::Result<Option<AppManifest>> {
    let row = sqlx::query_as::<_, AppMetadataRow>(
      "SELECT id, name, primary_service, expected_services,
              initial_setup_required, icon
       FROM apps_metadata WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&self.pool)
    .await
    .context("failed to get app metadata")?;
    Ok(row.map(Into::into))
  }

  pub async fn delete(&self, id: &str) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM apps_metadata WHERE id = ?")
      .bind(id)
      .execute(&self.pool)
      .await
      .context("failed to delete app metadata")?;
    Ok(())
  }
}
