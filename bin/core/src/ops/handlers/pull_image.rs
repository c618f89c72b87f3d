use crate::{
  ops::{handlers::app_paths, worker::OpCtx},
  runtime,
};

/// Explicit image pull for every service of the app.
pub async fn run(ctx: &OpCtx) -> anyhow::Result<()> {
  let paths = app_paths(&ctx.op.app_id);
  ctx.check_cancelled().await?;
  let child =
    runtime::pull_child(&paths.dir, &paths.project)?;
  ctx.drive_child(child, (0, 100)).await?;
  Ok(())
}
