use std::collections::HashMap;

use anyhow::Context;
use treeos_client::error::error_kind;

use crate::{
  config::core_config,
  engine,
  ops::{handlers::app_paths, worker::OpCtx},
  runtime,
  state::db_client,
  validate,
};

/// Initial setup for a freshly installed app: pull images, pin
/// every un-pinned `image` to its digest, clear the
/// `initial_setup_required` flag. Services with `build:` are
/// untouched.
pub async fn run(ctx: &OpCtx) -> anyhow::Result<()> {
  let config = core_config();
  let app_id = &ctx.op.app_id;

  let result: anyhow::Result<()> = async {
    let files = engine::read_app_files(
      &config.apps_root,
      app_id,
      &config.fixed_prefix,
    )
    .await?;
    let compose = validate::validate_for_app(
      app_id,
      &files.compose_contents,
    )?;
    ctx.check_cancelled().await?;

    let paths = app_paths(app_id);
    ctx.logger.progress(10, "pulling images").await;
    let child =
      runtime::pull_child(&paths.dir, &paths.project)?;
    ctx.drive_child(child, (10, 70)).await?;
    ctx.check_cancelled().await?;

    let mut digests = HashMap::new();
    for service in compose.services.values() {
      if service.build.is_some() {
        continue;
      }
      let Some(image) = &service.image else {
        continue;
      };
      if image.contains("@sha256:") {
        continue;
      }
      if let Some(digest) =
        runtime::image_digest(image).await?
      {
        digests.insert(image.clone(), digest);
      }
    }
    if !digests.is_empty() {
      let locked = lock_image_digests(
        &files.compose_contents,
        &digests,
      )?;
      engine::rewrite_compose(&config.apps_root, app_id, &locked)
        .await?;
      ctx
        .logger
        .progress(90, "image digests locked")
        .await;
    }

    let mut manifest = files.manifest.clone();
    if manifest.initial_setup_required {
      manifest.initial_setup_required = false;
      engine::rewrite_manifest(
        &config.apps_root,
        app_id,
        &manifest,
      )
      .await?;
    }
    db_client().apps.upsert(&manifest).await?;
    Ok(())
  }
  .await;

  // A cancelled create must not leave a half-installed app
  // visible.
  if let Err(e) = &result
    && matches!(
      error_kind(e),
      Some(treeos_client::ErrorKind::Cancelled)
    )
  {
    if let Err(e) =
      engine::remove_app_directory(&config.apps_root, app_id)
        .await
    {
      warn!(
        "failed to remove partial app dir for {app_id} | {e:#}"
      );
    }
    let _ = db_client().apps.delete(app_id).await;
    ctx
      .logger
      .warning("removed partial app after cancelled create")
      .await;
  }

  result
}

/// Rewrite every matching un-pinned `image` to its
/// `<repo>@sha256:<digest>` form, preserving the rest of the
/// document. Works on the raw yaml value so unknown keys
/// round-trip.
pub fn lock_image_digests(
  contents: &str,
  digests: &HashMap<String, String>,
) -> anyhow::Result<String> {
  let mut doc: serde_yaml_ng::Value =
    serde_yaml_ng::from_str(contents)
      .context("failed to parse compose for digest locking")?;

  let services_key =
    serde_yaml_ng::Value::String(String::from("services"));
  let build_key =
    serde_yaml_ng::Value::String(String::from("build"));
  let image_key =
    serde_yaml_ng::Value::String(String::from("image"));

  if let Some(services) = doc
    .as_mapping_mut()
    .and_then(|root| root.get_mut(&services_key))
    .and_then(serde_yaml_ng::Value::as_mapping_mut)
  {
    for (_, service) in services.iter_mut() {
      let Some(service) = service.as_mapping_mut() else {
        continue;
      };
      if service.contains_key(&build_key) {
        continue;
      }
      let Some(image) = service.get_mut(&image_key) else {
        continue;
      };
      if let Some(name) = image.as_str()
        && let Some(digest) = digests.get(name)
      {
        *image =
          serde_yaml_ng::Value::String(digest.clone());
      }
    }
  }

  serde_yaml_ng::to_string(&doc)
    .context("failed to serialize digest-locked compose")
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn locks_unpinned_images_only() {
    let contents = "\
services:
  web1:
    image: nginx:alpine
    ports:
      - 8080:80
  pinned:
    image: redis@sha256:abc123
  built:
    build: ./src
    image: local/built:latest
";
    let digests = HashMap::from([
      (
        String::from("nginx:alpine"),
        String::from("nginx@sha256:deadbeef"),
      ),
      (
        String::from("local/built:latest"),
        String::from("local/built@sha256:ffff"),
      ),
    ]);
    let locked =
      lock_image_digests(contents, &digests).unwrap();

    assert!(locked.contains("nginx@sha256:deadbeef"));
    // Pinned image untouched, build service untouched.
    assert!(locked.contains("redis@sha256:abc123"));
    assert!(locked.contains("local/built:latest"));
    // Unknown keys survive the rewrite.
    assert!(locked.contains("8080:80"));
  }
}
