use async_timing_util::unix_timestamp_ms;

/// Subtypes of [AppManifest][app::AppManifest] and app / service
/// states.
pub mod app;
/// Per-app chat / monitoring message stream.
pub mod chat;
/// Typed compose document used by the validator.
pub mod compose;
/// Core configuration ([CoreConfig][config::CoreConfig]) and environment overrides.
pub mod config;
/// Subtypes of [LogConfig][logger::LogConfig].
pub mod logger;
/// Model records and download jobs.
pub mod model;
/// Subtypes of [Operation][operation::Operation].
pub mod operation;

/// Unix timestamp in milliseconds as i64
pub fn treeos_timestamp() -> i64 {
  unix_timestamp_ms() as i64
}

pub fn all_logs_success(logs: &[operation::Log]) -> bool {
  for log in logs {
    if !log.success {
      return false;
    }
  }
  true
}

