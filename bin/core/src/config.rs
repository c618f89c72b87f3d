use std::{path::PathBuf, sync::OnceLock};

use clap::Parser;
use colored::Colorize;
use config::ConfigLoader;
use treeos_client::entities::{
  config::{CliArgs, CoreConfig, Env},
  logger::{LogConfig, LogLevel},
};

pub fn core_config() -> &'static CoreConfig {
  static CORE_CONFIG: OnceLock<CoreConfig> = OnceLock::new();
  CORE_CONFIG.get_or_init(|| {
    let env: Env = envy::from_env()
      .expect("failed to parse core environment");
    let args = CliArgs::parse();
    let config_paths =
      args.config_path.unwrap_or(env.treeos_config_paths);

    let config = if config_paths.is_empty() {
      println!(
        "{}: No config paths found, using default config",
        "INFO".green(),
      );
      CoreConfig::default()
    } else {
      (ConfigLoader {
        paths: &config_paths
          .iter()
          .map(PathBuf::as_path)
          .collect::<Vec<_>>(),
        debug_print: args
          .log_level
          .map(|level| {
            level == tracing::Level::DEBUG
              || level == tracing::Level::TRACE
          })
          .unwrap_or_default(),
      })
      .load()
      .expect("failed at parsing config from paths")
    };

    CoreConfig {
      apps_root: env.treeos_apps_root.unwrap_or(config.apps_root),
      apps_mount_root: env
        .treeos_apps_mount_root
        .unwrap_or(config.apps_mount_root),
      shared_models_root: env
        .treeos_shared_models_root
        .unwrap_or(config.shared_models_root),
      fixed_prefix: env
        .treeos_fixed_prefix
        .unwrap_or(config.fixed_prefix),
      runtime_binary: env
        .treeos_runtime_binary
        .unwrap_or(config.runtime_binary),
      worker_pool_size: env
        .treeos_worker_pool_size
        .unwrap_or(config.worker_pool_size),
      model_pool_size: env
        .treeos_model_pool_size
        .unwrap_or(config.model_pool_size),
      queue_capacity: env
        .treeos_queue_capacity
        .unwrap_or(config.queue_capacity),
      op_stale_threshold_mins: env
        .treeos_op_stale_threshold_mins
        .unwrap_or(config.op_stale_threshold_mins),
      log_retention_days: env
        .treeos_log_retention_days
        .unwrap_or(config.log_retention_days),
      db_path: env.treeos_db_path.unwrap_or(config.db_path),
      stop_mode: env.treeos_stop_mode.unwrap_or(config.stop_mode),
      operation_timeouts: config.operation_timeouts,
      logging: LogConfig {
        level: args
          .log_level
          .map(LogLevel::from)
          .or(env.treeos_logging_level)
          .unwrap_or(config.logging.level),
        stdio: config.logging.stdio,
        pretty: env
          .treeos_logging_pretty
          .unwrap_or(config.logging.pretty),
      },
      pretty_startup_config: env
        .treeos_pretty_startup_config
        .unwrap_or(config.pretty_startup_config),
    }
  })
}
