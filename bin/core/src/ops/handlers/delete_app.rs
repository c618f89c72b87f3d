use treeos_client::entities::app::network_name;

use crate::{
  config::core_config,
  engine,
  ops::{handlers::app_paths, worker::OpCtx},
  runtime,
  state::db_client,
};

/// Tear the app down completely: containers and network via
/// `compose down`, named volumes when asked, then the directory
/// tree and the cached metadata. Runtime failures downgrade to
/// warnings - a half-torn-down project must still lose its
/// directory.
pub async fn run(ctx: &OpCtx) -> anyhow::Result<()> {
  let config = core_config();
  let app_id = &ctx.op.app_id;
  let wipe_volumes = ctx
    .op
    .metadata
    .get("wipe_volumes")
    .and_then(serde_json::Value::as_bool)
    .unwrap_or_default();

  let paths = app_paths(app_id);

  ctx
    .logger
    .progress(10, "removing containers and network")
    .await;
  let log =
    runtime::down(None, &paths.project, wipe_volumes).await;
  ctx.logger.command(&log).await;
  if !log.success {
    ctx
      .logger
      .warning("compose down failed, continuing delete")
      .await;
  }
  ctx.check_cancelled().await?;

  if wipe_volumes {
    ctx.logger.progress(40, "removing named volumes").await;
    match runtime::list_project_volumes(&paths.project).await {
      Ok(volumes) => {
        for volume in volumes {
          let log = runtime::remove_volume(&volume).await;
          ctx.logger.command(&log).await;
        }
      }
      Err(e) => {
        ctx
          .logger
          .warning(format!("failed to list volumes: {e:#}"))
          .await;
      }
    }
  }

  // compose down removes the default network; this catches one
  // left behind by a partial down.
  let network =
    network_name(&config.fixed_prefix, app_id);
  let log = runtime::remove_network(&network).await;
  if !log.success {
    ctx.logger.debug("project network already gone").await;
  }

  ctx.logger.progress(80, "removing app directory").await;
  engine::remove_app_directory(&config.apps_root, app_id)
    .await?;

  let db = db_client();
  db.apps.delete(app_id).await?;
  db.chat.delete_for_app(app_id).await?;
  ctx.logger.progress(95, "app removed").await;
  Ok(())
}
