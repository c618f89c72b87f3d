//! Read-only scan reconciling model records with the manifests
//! actually present in the shared models volume. A completed
//! record whose manifest is gone goes back to not_downloaded; a
//! manifest on disk makes its model completed.

use std::{
  collections::HashSet,
  path::{Path, PathBuf},
};

use anyhow::Context;
use database::Client;
use treeos_client::entities::model::canonical_model_name;

#[derive(Debug, Default, Clone, Copy)]
pub struct ReconcileSummary {
  pub completed: u64,
  pub reset: u64,
}

/// Walk `<manifests_root>` and bring the records in line. The
/// layout under the root is
/// `<registry>/<namespace>/<model>/<tag>`, one file per tag.
pub async fn reconcile_models(
  db: &Client,
  manifests_root: &Path,
) -> anyhow::Result<ReconcileSummary> {
  let on_disk = scan_manifests(manifests_root)?;

  let mut summary = ReconcileSummary::default();
  for name in &on_disk {
    db.models
      .mark_completed(name)
      .await
      .with_context(|| {
        format!("failed to mark model {name} completed")
      })?;
    summary.completed += 1;
  }

  for record in db.models.list_completed().await? {
    if !on_disk.contains(&record.name) {
      db.models
        .reset_not_downloaded(&record.name)
        .await
        .with_context(|| {
          format!("failed to reset model {}", record.name)
        })?;
      summary.reset += 1;
    }
  }

  Ok(summary)
}

fn scan_manifests(
  root: &Path,
) -> anyhow::Result<HashSet<String>> {
  let mut names = HashSet::new();
  if !root.is_dir() {
    // No manifests directory simply means nothing downloaded.
    return Ok(names);
  }
  let mut files = Vec::new();
  collect_files(root, &mut files)?;
  for file in files {
    let Ok(relative) = file.strip_prefix(root) else {
      continue;
    };
    let components: Vec<String> = relative
      .components()
      .filter_map(|c| {
        c.as_os_str().to_str().map(str::to_string)
      })
      .collect();
    // Anything shallower than model/tag is not a manifest.
    if components.len() < 2 {
      continue;
    }
    let tag = &components[components.len() - 1];
    let model = components[..components.len() - 1].join("/");
    names.insert(canonical_model_name(&model, Some(tag)));
  }
  Ok(names)
}

fn collect_files(
  dir: &Path,
  files: &mut Vec<PathBuf>,
) -> anyhow::Result<()> {
  for entry in std::fs::read_dir(dir)
    .with_context(|| format!("failed to read {dir:?}"))?
  {
    let path = entry
      .with_context(|| format!("failed to read entry in {dir:?}"))?
      .path();
    if path.is_dir() {
      collect_files(&path, files)?;
    } else {
      files.push(path);
    }
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use treeos_client::entities::model::ModelStatus;

  fn manifest(root: &Path, parts: &[&str]) {
    let mut path = root.to_path_buf();
    for part in &parts[..parts.len() - 1] {
      path.push(part);
    }
    std::fs::create_dir_all(&path).unwrap();
    path.push(parts[parts.len() - 1]);
    std::fs::write(path, "{}").unwrap();
  }

  #[tokio::test]
  async fn manifests_on_disk_become_completed() {
    let models_dir = tempfile::tempdir().unwrap();
    let root = models_dir.path().join("manifests");
    manifest(
      &root,
      &["registry.ollama.ai", "library", "gemma", "2b"],
    );
    manifest(
      &root,
      &["registry.ollama.ai", "library", "mistral", "latest"],
    );

    let db_dir = tempfile::tempdir().unwrap();
    let db =
      Client::new(&db_dir.path().join("treeos.sqlite"))
        .await
        .unwrap();

    let summary =
      reconcile_models(&db, &root).await.unwrap();
    assert_eq!(summary.completed, 2);
    assert_eq!(summary.reset, 0);

    let record =
      db.models.get("gemma:2b").await.unwrap().unwrap();
    assert_eq!(record.status, ModelStatus::Completed);
    assert!(
      db.models.get("mistral:latest").await.unwrap().is_some()
    );
  }

  #[tokio::test]
  async fn completed_without_manifest_resets() {
    let models_dir = tempfile::tempdir().unwrap();
    let root = models_dir.path().join("manifests");
    manifest(
      &root,
      &["registry.ollama.ai", "library", "gemma", "2b"],
    );

    let db_dir = tempfile::tempdir().unwrap();
    let db =
      Client::new(&db_dir.path().join("treeos.sqlite"))
        .await
        .unwrap();
    // Claimed complete, but nothing on disk backs it.
    db.models.mark_completed("llama3:latest").await.unwrap();

    let summary =
      reconcile_models(&db, &root).await.unwrap();
    assert_eq!(summary.completed, 1);
    assert_eq!(summary.reset, 1);

    let record = db
      .models
      .get("llama3:latest")
      .await
      .unwrap()
      .unwrap();
    assert_eq!(record.status, ModelStatus::NotDownloaded);
    assert_eq!(record.progress, 0);

    // Running again right after leaves completed models
    // completed iff their manifest exists.
    let summary =
      reconcile_models(&db, &root).await.unwrap();
    assert_eq!(summary.reset, 0);
    let record =
      db.models.get("gemma:2b").await.unwrap().unwrap();
    assert_eq!(record.status, ModelStatus::Completed);
  }

  #[tokio::test]
  async fn missing_manifests_dir_is_empty() {
    let db_dir = tempfile::tempdir().unwrap();
    let db =
      Client::new(&db_dir.path().join("treeos.sqlite"))
        .await
        .unwrap();
    let summary = reconcile_models(
      &db,
      Path::new("/nonexistent/manifests"),
    )
    .await
    .unwrap();
    assert_eq!(summary.completed, 0);
    assert_eq!(summary.reset, 0);
  }
}
