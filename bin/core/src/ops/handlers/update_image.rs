use std::collections::HashMap;

use crate::{
  config::core_config,
  engine,
  ops::{handlers::app_paths, worker::OpCtx},
  runtime, validate,
};

/// Pull, then bring the project up with force-recreate semantics.
/// If the pull produced no new image, report "up to date" and
/// leave the running containers alone.
pub async fn run(ctx: &OpCtx) -> anyhow::Result<()> {
  let config = core_config();
  let app_id = &ctx.op.app_id;

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

  let images: Vec<String> = compose
    .services
    .values()
    .filter_map(|service| service.image.clone())
    .collect();

  let mut before = HashMap::new();
  for image in &images {
    before
      .insert(image.clone(), runtime::image_id(image).await);
  }

  let child = runtime::pull_child(&paths.dir, &paths.project)?;
  ctx.drive_child(child, (0, 60)).await?;
  ctx.check_cancelled().await?;

  let changed = {
    let mut changed = false;
    for image in &images {
      if runtime::image_id(image).await
        != before.remove(image).flatten()
      {
        changed = true;
        break;
      }
    }
    changed
  };

  if !changed {
    ctx.logger.progress(100, "up to date").await;
    return Ok(());
  }

  let child =
    runtime::up_force_child(&paths.dir, &paths.project)?;
  ctx.drive_child(child, (60, 100)).await?;
  Ok(())
}
