//! # Configuring the treeos core
//!
//! The core is configured by parsing a base configuration file
//! ([CoreConfig]), then overriding any fields given in the file with
//! ones provided on the environment ([Env]), then CLI args
//! ([CliArgs]).

use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::logger::{LogConfig, LogLevel};

/// Whether `StopApp` completes inline or is surfaced as an
/// operation. Fixed per deployment, never per call.
#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  Display,
  EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StopMode {
  Inline,
  #[default]
  Operation,
}

/// Absolute deadlines for external subprocesses, per operation
/// type. Pull budgets dominate start budgets dominate stop budgets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationTimeouts {
  #[serde(default = "default_pull_timeout")]
  pub pull_secs: u64,
  #[serde(default = "default_start_timeout")]
  pub start_secs: u64,
  #[serde(default = "default_stop_timeout")]
  pub stop_secs: u64,
  /// Model blobs dwarf container images.
  #[serde(default = "default_model_pull_timeout")]
  pub model_pull_secs: u64,
}

fn default_pull_timeout() -> u64 {
  1800
}
fn default_start_timeout() -> u64 {
  600
}
fn default_stop_timeout() -> u64 {
  120
}
fn default_model_pull_timeout() -> u64 {
  4 * 3600
}

impl Default for OperationTimeouts {
  fn default() -> Self {
    Self {
      pull_secs: default_pull_timeout(),
      start_secs: default_start_timeout(),
      stop_secs: default_stop_timeout(),
      model_pull_secs: default_model_pull_timeout(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
  /// Where app directories live.
  #[serde(default = "default_apps_root")]
  pub apps_root: PathBuf,

  /// The only permitted bind-mount prefix for per-app data.
  #[serde(default = "default_apps_mount_root")]
  pub apps_mount_root: PathBuf,

  /// Additional permitted bind-mount prefix for shared models.
  #[serde(default = "default_shared_models_root")]
  pub shared_models_root: PathBuf,

  /// Mandatory container-name prefix.
  #[serde(default = "default_fixed_prefix")]
  pub fixed_prefix: String,

  /// Path to the container runtime CLI.
  #[serde(default = "default_runtime_binary")]
  pub runtime_binary: String,

  /// Parallel operation workers.
  #[serde(default = "default_worker_pool_size")]
  pub worker_pool_size: usize,

  /// Parallel model downloads. Kept at 1 to avoid contending for
  /// the inference container's CLI and disk throughput.
  #[serde(default = "default_model_pool_size")]
  pub model_pool_size: usize,

  /// Bound on queued operations node-wide. Enqueue past this
  /// fails with QueueFull.
  #[serde(default = "default_queue_capacity")]
  pub queue_capacity: usize,

  /// Age in minutes after which in-flight operations are
  /// considered stale.
  #[serde(default = "default_op_stale_threshold")]
  pub op_stale_threshold_mins: u64,

  /// Age in days after which operation logs are deleted.
  /// 0 disables retention cleanup.
  #[serde(default = "default_log_retention")]
  pub log_retention_days: u64,

  /// Embedded database file path.
  #[serde(default = "default_db_path")]
  pub db_path: PathBuf,

  /// Stop synchrony policy.
  #[serde(default)]
  pub stop_mode: StopMode,

  #[serde(default)]
  pub operation_timeouts: OperationTimeouts,

  #[serde(default)]
  pub logging: LogConfig,

  /// Pretty-print the full startup config.
  #[serde(default)]
  pub pretty_startup_config: bool,
}

fn default_apps_root() -> PathBuf {
  PathBuf::from("/var/lib/treeos/apps")
}
fn default_apps_mount_root() -> PathBuf {
  PathBuf::from("/mnt/apps")
}
fn default_shared_models_root() -> PathBuf {
  PathBuf::from("/mnt/models")
}
fn default_fixed_prefix() -> String {
  String::from("ontree")
}
fn default_runtime_binary() -> String {
  String::from("podman")
}
fn default_worker_pool_size() -> usize {
  2
}
fn default_model_pool_size() -> usize {
  1
}
fn default_queue_capacity() -> usize {
  64
}
fn default_op_stale_threshold() -> u64 {
  5
}
fn default_log_retention() -> u64 {
  14
}
fn default_db_path() -> PathBuf {
  PathBuf::from("/var/lib/treeos/treeos.sqlite")
}

impl Default for CoreConfig {
  fn default() -> Self {
    Self {
      apps_root: default_apps_root(),
      apps_mount_root: default_apps_mount_root(),
      shared_models_root: default_shared_models_root(),
      fixed_prefix: default_fixed_prefix(),
      runtime_binary: default_runtime_binary(),
      worker_pool_size: default_worker_pool_size(),
      model_pool_size: default_model_pool_size(),
      queue_capacity: default_queue_capacity(),
      op_stale_threshold_mins: default_op_stale_threshold(),
      log_retention_days: default_log_retention(),
      db_path: default_db_path(),
      stop_mode: Default::default(),
      operation_timeouts: Default::default(),
      logging: Default::default(),
      pretty_startup_config: Default::default(),
    }
  }
}

impl CoreConfig {
  pub fn op_stale_threshold_ms(&self) -> i64 {
    self.op_stale_threshold_mins as i64 * 60_000
  }
}

/// # Treeos Core Environment Variables
///
/// Override any fields of the [CoreConfig] by passing the
/// associated `TREEOS_`-prefixed variable.
#[derive(Debug, Clone, Deserialize)]
pub struct Env {
  /// Paths to the core config toml(s).
  #[serde(default, alias = "treeos_config_path")]
  pub treeos_config_paths: Vec<PathBuf>,

  /// Override `apps_root`
  pub treeos_apps_root: Option<PathBuf>,
  /// Override `apps_mount_root`
  pub treeos_apps_mount_root: Option<PathBuf>,
  /// Override `shared_models_root`
  pub treeos_shared_models_root: Option<PathBuf>,
  /// Override `fixed_prefix`
  pub treeos_fixed_prefix: Option<String>,
  /// Override `runtime_binary`
  #[serde(alias = "podman_binary")]
  pub treeos_runtime_binary: Option<String>,
  /// Override `worker_pool_size`
  pub treeos_worker_pool_size: Option<usize>,
  /// Override `model_pool_size`
  pub treeos_model_pool_size: Option<usize>,
  /// Override `queue_capacity`
  pub treeos_queue_capacity: Option<usize>,
  /// Override `op_stale_threshold_mins`
  pub treeos_op_stale_threshold_mins: Option<u64>,
  /// Override `log_retention_days`
  pub treeos_log_retention_days: Option<u64>,
  /// Override `db_path`
  pub treeos_db_path: Option<PathBuf>,
  /// Override `stop_mode`
  pub treeos_stop_mode: Option<StopMode>,

  /// Override `logging.level`
  pub treeos_logging_level: Option<LogLevel>,
  /// Override `logging.pretty`
  pub treeos_logging_pretty: Option<bool>,
  /// Override `pretty_startup_config`
  pub treeos_pretty_startup_config: Option<bool>,
}

/// Command line arguments for the core binary.
#[derive(Debug, Clone, Parser)]
#[command(name = "treeos-core", about = "treeos orchestrator core")]
pub struct CliArgs {
  /// Path(s) to the config file(s).
  #[arg(long)]
  pub config_path: Option<Vec<PathBuf>>,

  /// Set the log level (trace, debug, info, warn, error).
  #[arg(long)]
  pub log_level: Option<tracing::Level>,
}
