//! Authoritative model of installed apps. An app is its directory:
//! compose file + env file + manifest. The engine owns all writes
//! under the apps root; everything else re-reads through here.

use std::path::{Path, PathBuf};

use anyhow::Context;
use tokio::io::AsyncWriteExt;
use treeos_client::{
  CoreError,
  entities::app::{
    AppManifest, COMPOSE_FILE_NAME, ENV_FILE_NAME,
    MANIFEST_FILE_NAME, valid_app_id,
  },
};

mod env_file;
pub mod status;

pub use env_file::{parse_env, project_name_from_env, render_env};

#[derive(Debug, Clone)]
pub struct AppFiles {
  pub manifest: AppManifest,
  pub compose_contents: String,
  pub env_contents: String,
}

pub fn app_directory(apps_root: &Path, id: &str) -> PathBuf {
  apps_root.join(id)
}

/// All three files exist or the app does not exist.
pub async fn app_exists(apps_root: &Path, id: &str) -> bool {
  let dir = app_directory(apps_root, id);
  for file in
    [COMPOSE_FILE_NAME, ENV_FILE_NAME, MANIFEST_FILE_NAME]
  {
    if !dir.join(file).is_file() {
      return false;
    }
  }
  true
}

/// Scan the apps root for directories containing all three
/// required files. Directories with broken manifests are skipped
/// with a warning, not surfaced as apps.
pub async fn scan_apps(
  apps_root: &Path,
) -> anyhow::Result<Vec<AppManifest>> {
  let mut entries = match tokio::fs::read_dir(apps_root).await {
    Ok(entries) => entries,
    // A missing apps root means no apps installed yet.
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
      return Ok(Vec::new());
    }
    Err(e) => {
      return Err(e).with_context(|| {
        format!("failed to read apps root {apps_root:?}")
      });
    }
  };
  let mut apps = Vec::new();
  while let Some(entry) = entries
    .next_entry()
    .await
    .context("failed to iterate apps root")?
  {
    let Ok(name) = entry.file_name().into_string() else {
      continue;
    };
    if !app_exists(apps_root, &name).await {
      continue;
    }
    match read_manifest(apps_root, &name).await {
      Ok(manifest) => apps.push(manifest),
      Err(e) => {
        warn!("skipping app directory {name}: {e:#}");
      }
    }
  }
  apps.sort_by(|a, b| a.id.cmp(&b.id));
  Ok(apps)
}

pub async fn read_manifest(
  apps_root: &Path,
  id: &str,
) -> anyhow::Result<AppManifest> {
  let path = app_directory(apps_root, id).join(MANIFEST_FILE_NAME);
  let contents = tokio::fs::read_to_string(&path)
    .await
    .with_context(|| format!("failed to read {path:?}"))?;
  let manifest: AppManifest = serde_yaml_ng::from_str(&contents)
    .with_context(|| format!("failed to parse {path:?}"))?;
  if manifest.id != id.to_lowercase() {
    return Err(
      CoreError::Integrity(format!(
        "manifest id '{}' does not match directory '{id}'",
        manifest.id
      ))
      .into(),
    );
  }
  Ok(manifest)
}

/// Read and cross-check all three files. The env file must agree
/// on the project name or the engine refuses to operate.
pub async fn read_app_files(
  apps_root: &Path,
  id: &str,
  prefix: &str,
) -> anyhow::Result<AppFiles> {
  if !app_exists(apps_root, id).await {
    return Err(
      CoreError::NotFound {
        resource: "app",
        name: id.to_string(),
      }
      .into(),
    );
  }
  let dir = app_directory(apps_root, id);
  let manifest = read_manifest(apps_root, id).await?;
  let compose_contents =
    tokio::fs::read_to_string(dir.join(COMPOSE_FILE_NAME))
      .await
      .context("failed to read compose file")?;
  let env_contents =
    tokio::fs::read_to_string(dir.join(ENV_FILE_NAME))
      .await
      .context("failed to read env file")?;

  let expected = format!("{prefix}-{id}");
  match project_name_from_env(&env_contents) {
    Some(project) if project == expected => {}
    Some(project) => {
      return Err(
        CoreError::Integrity(format!(
          "ProjectNameMismatch: COMPOSE_PROJECT_NAME is \
           '{project}', expected '{expected}'"
        ))
        .into(),
      );
    }
    None => {
      return Err(
        CoreError::Integrity(String::from(
          "ProjectNameMismatch: COMPOSE_PROJECT_NAME missing \
           from .env",
        ))
        .into(),
      );
    }
  }

  Ok(AppFiles {
    manifest,
    compose_contents,
    env_contents,
  })
}

/// Create the app directory and write all three files. The caller
/// has already validated the compose contents.
pub async fn create_app_files(
  apps_root: &Path,
  id: &str,
  files: &AppFiles,
) -> anyhow::Result<()> {
  if !valid_app_id(id) || id != id.to_lowercase() {
    return Err(
      CoreError::Validation(vec![
        treeos_client::error::ValidationError {
          service: None,
          rule: treeos_client::error::ValidationRule::InvalidName,
          message: format!(
            "app id '{id}' must match [a-z0-9][a-z0-9-]*"
          ),
        },
      ])
      .into(),
    );
  }
  tokio::fs::create_dir_all(apps_root)
    .await
    .with_context(|| {
      format!("failed to create apps root {apps_root:?}")
    })?;
  // The non-recursive create is the atomic test-and-set: of two
  // concurrent creates for the same id, exactly one wins.
  let dir = app_directory(apps_root, id);
  match tokio::fs::create_dir(&dir).await {
    Ok(()) => {}
    Err(e)
      if e.kind() == std::io::ErrorKind::AlreadyExists =>
    {
      return Err(
        CoreError::Conflict(format!(
          "app '{id}' already exists"
        ))
        .into(),
      );
    }
    Err(e) => {
      return Err(e).with_context(|| {
        format!("failed to create {dir:?}")
      });
    }
  }
  write_app_files(&dir, files).await
}

/// Rewrite files in an existing app directory.
pub async fn write_app_files(
  dir: &Path,
  files: &AppFiles,
) -> anyhow::Result<()> {
  let manifest = serde_yaml_ng::to_string(&files.manifest)
    .context("failed to serialize app manifest")?;
  write_atomic(
    &dir.join(COMPOSE_FILE_NAME),
    &files.compose_contents,
  )
  .await?;
  write_atomic(&dir.join(ENV_FILE_NAME), &files.env_contents)
    .await?;
  write_atomic(&dir.join(MANIFEST_FILE_NAME), &manifest).await?;
  Ok(())
}

pub async fn rewrite_manifest(
  apps_root: &Path,
  id: &str,
  manifest: &AppManifest,
) -> anyhow::Result<()> {
  let contents = serde_yaml_ng::to_string(manifest)
    .context("failed to serialize app manifest")?;
  write_atomic(
    &app_directory(apps_root, id).join(MANIFEST_FILE_NAME),
    &contents,
  )
  .await
}

pub async fn rewrite_compose(
  apps_root: &Path,
  id: &str,
  contents: &str,
) -> anyhow::Result<()> {
  write_atomic(
    &app_directory(apps_root, id).join(COMPOSE_FILE_NAME),
    contents,
  )
  .await
}

pub async fn remove_app_directory(
  apps_root: &Path,
  id: &str,
) -> anyhow::Result<()> {
  let dir = app_directory(apps_root, id);
  if !dir.exists() {
    return Ok(());
  }
  tokio::fs::remove_dir_all(&dir)
    .await
    .with_context(|| format!("failed to remove {dir:?}"))
}

/// Write to `<name>.tmp`, fsync, rename. The rename is the
/// serialization point; no lock file. Directory fsync is
/// best-effort.
async fn write_atomic(
  path: &Path,
  contents: &str,
) -> anyhow::Result<()> {
  let tmp = {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
  };
  {
    let mut file = tokio::fs::File::create(&tmp)
      .await
      .with_context(|| format!("failed to create {tmp:?}"))?;
    file
      .write_all(contents.as_bytes())
      .await
      .with_context(|| format!("failed to write {tmp:?}"))?;
    file
      .sync_all()
      .await
      .with_context(|| format!("failed to fsync {tmp:?}"))?;
  }
  tokio::fs::rename(&tmp, path).await.with_context(|| {
    format!("failed to rename {tmp:?} to {path:?}")
  })?;
  if let Some(parent) = path.parent()
    && let Ok(dir) = tokio::fs::File::open(parent).await
  {
    let _ = dir.sync_all().await;
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use treeos_client::error::error_kind;

  fn manifest(id: &str) -> AppManifest {
    AppManifest {
      id: id.to_string(),
      name: "Web One".into(),
      primary_service: "web1".into(),
      expected_services: vec!["web1".into()],
      initial_setup_required: false,
      icon: None,
    }
  }

  fn files(id: &str) -> AppFiles {
    AppFiles {
      manifest: manifest(id),
      compose_contents:
        "services:\n  web1:\n    image: nginx:alpine\n".into(),
      env_contents: render_env("ontree", id),
    }
  }

  #[tokio::test]
  async fn create_then_read_round_trips() {
    let root = tempfile::tempdir().unwrap();
    let files = files("web1");
    create_app_files(root.path(), "web1", &files)
      .await
      .unwrap();

    let back = read_app_files(root.path(), "web1", "ontree")
      .await
      .unwrap();
    assert_eq!(back.manifest, files.manifest);
    assert_eq!(back.compose_contents, files.compose_contents);
    assert_eq!(back.env_contents, files.env_contents);

    // Rewriting unchanged files keeps them byte-identical.
    let dir = app_directory(root.path(), "web1");
    write_app_files(&dir, &back).await.unwrap();
    let again = read_app_files(root.path(), "web1", "ontree")
      .await
      .unwrap();
    assert_eq!(again.compose_contents, back.compose_contents);
    assert_eq!(again.env_contents, back.env_contents);
  }

  #[tokio::test]
  async fn create_rejects_bad_ids_and_duplicates() {
    let root = tempfile::tempdir().unwrap();

    let err = create_app_files(root.path(), "Bad_Id", &files("bad"))
      .await
      .unwrap_err();
    assert_eq!(
      error_kind(&err),
      Some(treeos_client::ErrorKind::Validation)
    );
    // No partial directory left behind.
    assert!(!root.path().join("Bad_Id").exists());

    create_app_files(root.path(), "web1", &files("web1"))
      .await
      .unwrap();
    let err = create_app_files(root.path(), "web1", &files("web1"))
      .await
      .unwrap_err();
    assert_eq!(
      error_kind(&err),
      Some(treeos_client::ErrorKind::Conflict)
    );
  }

  #[tokio::test]
  async fn mismatched_project_name_is_integrity_error() {
    let root = tempfile::tempdir().unwrap();
    let mut bad = files("web1");
    bad.env_contents =
      "COMPOSE_PROJECT_NAME=other-web1\nCOMPOSE_SEPARATOR=-\n"
        .into();
    create_app_files(root.path(), "web1", &bad).await.unwrap();

    let err = read_app_files(root.path(), "web1", "ontree")
      .await
      .unwrap_err();
    assert_eq!(
      error_kind(&err),
      Some(treeos_client::ErrorKind::Integrity)
    );
    assert!(format!("{err:#}").contains("ProjectNameMismatch"));
  }

  #[tokio::test]
  async fn half_installed_apps_are_invisible() {
    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join("half");
    tokio::fs::create_dir_all(&dir).await.unwrap();
    tokio::fs::write(dir.join(COMPOSE_FILE_NAME), "services: {}")
      .await
      .unwrap();

    assert!(scan_apps(root.path()).await.unwrap().is_empty());
    let err = read_app_files(root.path(), "half", "ontree")
      .await
      .unwrap_err();
    assert_eq!(
      error_kind(&err),
      Some(treeos_client::ErrorKind::NotFound)
    );
  }
}
