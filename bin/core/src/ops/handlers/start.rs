use treeos_client::error::error_kind;

use crate::{
  config::core_config,
  engine,
  ops::{handlers::app_paths, worker::OpCtx},
  runtime, validate,
};

/// Start an app: re-read and re-validate from disk, pull missing
/// images, bring the project up. Progress: 0-20 preparation,
/// 20-80 pull, 80-100 create/start.
pub async fn run(ctx: &OpCtx) -> anyhow::Result<()> {
  let config = core_config();
  let app_id = &ctx.op.app_id;

  ctx.logger.progress(5, "reading app files").await;
  let files = engine::read_app_files(
    &config.apps_root,
    app_id,
    &config.fixed_prefix,
  )
  .await?;

  let compose = match validate::validate_for_app(
    app_id,
    &files.compose_contents,
  ) {
    Ok(compose) => compose,
    Err(e) => {
      ctx.logger.error(format!("{e:#}")).await;
      return Err(e);
    }
  };
  ctx.logger.progress(20, "compose validated").await;
  ctx.check_cancelled().await?;

  let paths = app_paths(app_id);

  let result: anyhow::Result<()> = async {
    let mut missing_image = false;
    for service in compose.services.values() {
      if let Some(image) = &service.image
        && !runtime::image_exists(image).await
      {
        missing_image = true;
        break;
      }
    }

    if missing_image {
      let child =
        runtime::pull_child(&paths.dir, &paths.project)?;
      ctx.drive_child(child, (20, 80)).await?;
    } else {
      ctx
        .logger
        .progress(80, "images already present")
        .await;
    }
    ctx.check_cancelled().await?;

    let child = runtime::up_child(&paths.dir, &paths.project)?;
    ctx.drive_child(child, (80, 100)).await?;
    Ok(())
  }
  .await;

  // A cancelled start may have left half-created containers from
  // the pull / create step behind.
  if let Err(e) = &result
    && matches!(
      error_kind(e),
      Some(treeos_client::ErrorKind::Cancelled)
    )
  {
    let log =
      runtime::down(None, &paths.project, false).await;
    ctx.logger.command(&log).await;
    ctx
      .logger
      .warning("cleaned up after cancelled start")
      .await;
  }

  result
}
