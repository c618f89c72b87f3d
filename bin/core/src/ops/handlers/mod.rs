use std::path::PathBuf;

use treeos_client::entities::app::project_name;

use crate::config::core_config;

pub mod create_app;
pub mod delete_app;
pub mod pull_image;
pub mod recreate;
pub mod start;
pub mod stop;
pub mod update_image;

pub(crate) struct AppPaths {
  pub dir: PathBuf,
  pub project: String,
}

pub(crate) fn app_paths(app_id: &str) -> AppPaths {
  let config = core_config();
  AppPaths {
    dir: config.apps_root.join(app_id),
    project: project_name(&config.fixed_prefix, app_id),
  }
}
