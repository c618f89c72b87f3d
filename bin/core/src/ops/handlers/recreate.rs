use treeos_client::{CoreError, error::error_kind};

use crate::{
  config::core_config,
  engine::{self, status},
  ops::{handlers::app_paths, worker::OpCtx},
  runtime, validate,
};

/// Stop, remove containers, pull, start. Progress partitioned
/// 0-10 down, 10-30 pull, 30-95 up, 95-100 verify.
pub async fn run(ctx: &OpCtx) -> anyhow::Result<()> {
  let config = core_config();
  let app_id = &ctx.op.app_id;

  let files = engine::read_app_files(
    &config.apps_root,
    app_id,
    &config.fixed_prefix,
  )
  .await?;
  validate::validate_for_app(app_id, &files.compose_contents)?;
  ctx.check_cancelled().await?;

  let paths = app_paths(app_id);

  let result: anyhow::Result<()> = async {
    ctx.logger.progress(5, "taking project down").await;
    let log =
      runtime::down(None, &paths.project, false).await;
    ctx.logger.command(&log).await;
    if !log.success {
      return Err(CoreError::Runtime(log.combined()).into());
    }
    ctx.logger.progress(10, "project down").await;
    ctx.check_cancelled().await?;

    let child =
      runtime::pull_child(&paths.dir, &paths.project)?;
    ctx.drive_child(child, (10, 30)).await?;
    ctx.check_cancelled().await?;

    let child = runtime::up_child(&paths.dir, &paths.project)?;
    ctx.drive_child(child, (30, 95)).await?;

    // Verify what actually came up.
    let ps = runtime::ps(&paths.project).await?;
    let services = status::service_statuses(
      &config.fixed_prefix,
      app_id,
      &files.manifest.expected_services,
      &ps,
    );
    let state = status::aggregate_state(&services);
    ctx
      .logger
      .progress(98, format!("project recreated, state {state}"))
      .await;
    Ok(())
  }
  .await;

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
      .warning("cleaned up after cancelled recreate")
      .await;
  }

  result
}
