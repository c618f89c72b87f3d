use treeos_client::CoreError;

use crate::{
  ops::{handlers::app_paths, worker::OpCtx},
  runtime,
};

/// `compose down` without touching named volumes.
pub async fn run(ctx: &OpCtx) -> anyhow::Result<()> {
  let paths = app_paths(&ctx.op.app_id);
  ctx.logger.progress(10, "stopping project").await;
  ctx.check_cancelled().await?;

  let log = runtime::down(None, &paths.project, false).await;
  ctx.logger.command(&log).await;
  if !log.success {
    return Err(CoreError::Runtime(log.combined()).into());
  }
  Ok(())
}
