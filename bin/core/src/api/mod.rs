//! Resolvers for the typed request surface in
//! [treeos_client::api]. The HTTP layer owns authentication and
//! routing; everything here assumes an already-authorized caller.

use treeos_client::entities::operation::Operation;

use crate::{config::core_config, state::db_client};

mod execute;
mod read;
mod write;

pub struct Args;

/// The operation blocking an app, if a live one exists. Stale
/// in-flight rows do not count - callers must not render a
/// spinner for them.
pub(crate) async fn active_operation(
  app_id: &str,
) -> anyhow::Result<Option<Operation>> {
  let active =
    db_client().operations.active_for_app(app_id).await?;
  Ok(active.filter(|op| {
    !op.stale(core_config().op_stale_threshold_ms())
  }))
}
