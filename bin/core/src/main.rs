#[macro_use]
extern crate tracing;

use treeos_core::{config::core_config, models, ops, startup, state};

async fn app() -> anyhow::Result<()> {
  dotenvy::dotenv().ok();
  let config = core_config();
  logger::init(&config.logging)?;

  info!("Treeos Core version: v{}", env!("CARGO_PKG_VERSION"));

  if config.pretty_startup_config {
    info!("{config:#?}");
  } else {
    info!("{config:?}");
  }

  // Init db_client check to crash on db init failure
  state::init_db_client().await;

  // Reconcile crashed operations / model state before any worker
  // can pick up new work.
  startup::on_startup().await;

  // Spawn background workers
  ops::spawn_operation_workers();
  ops::spawn_retention_loop();
  models::spawn_download_workers();

  info!("treeos core ready");

  // The core runs until asked to stop; the request surface is
  // embedded by the HTTP layer, nothing to serve here.
  futures::future::pending::<()>().await;
  Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  let mut term_signal = tokio::signal::unix::signal(
    tokio::signal::unix::SignalKind::terminate(),
  )?;
  tokio::select! {
    res = tokio::spawn(app()) => res?,
    _ = term_signal.recv() => Ok(()),
  }
}
