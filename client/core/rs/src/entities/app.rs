use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::operation::Operation;

/// File names making up an installed app directory.
/// All three must exist or the app does not exist.
pub const COMPOSE_FILE_NAME: &str = "docker-compose.yml";
pub const ENV_FILE_NAME: &str = ".env";
pub const MANIFEST_FILE_NAME: &str = "app.yaml";

/// Required keys of the app `.env` file.
pub const COMPOSE_PROJECT_NAME_KEY: &str = "COMPOSE_PROJECT_NAME";
pub const COMPOSE_SEPARATOR_KEY: &str = "COMPOSE_SEPARATOR";
pub const COMPOSE_SEPARATOR: &str = "-";

/// App ids are lowercase `[a-z0-9][a-z0-9-]*`, unique per node.
pub fn valid_app_id(id: &str) -> bool {
  let mut chars = id.chars();
  let Some(first) = chars.next() else {
    return false;
  };
  if !first.is_ascii_lowercase() && !first.is_ascii_digit() {
    return false;
  }
  chars.all(|c| {
    c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'
  })
}

/// The compose project name for an app: `<prefix>-<id>`.
pub fn project_name(prefix: &str, app_id: &str) -> String {
  format!("{prefix}-{app_id}")
}

/// Canonical container name:
/// `<prefix>-<app_id>-<service>-<index>`, all lowercase.
pub fn container_name(
  prefix: &str,
  app_id: &str,
  service: &str,
  index: usize,
) -> String {
  format!("{prefix}-{app_id}-{service}-{index}").to_lowercase()
}

/// The default network of an app project: `<prefix>-<app_id>_default`.
pub fn network_name(prefix: &str, app_id: &str) -> String {
  format!("{}_default", project_name(prefix, app_id))
}

/// A named volume of an app project: `<prefix>-<app_id>_<volume>`.
pub fn volume_name(
  prefix: &str,
  app_id: &str,
  volume: &str,
) -> String {
  format!("{}_{volume}", project_name(prefix, app_id))
}

/// The `app.yaml` document. The files on disk are authoritative,
/// the database only caches this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppManifest {
  /// Lowercase app id, equal to the directory name.
  pub id: String,
  /// Human readable display name.
  pub name: String,
  /// The service users interact with first.
  pub primary_service: String,
  /// Ordered list of compose service keys expected to run.
  #[serde(default)]
  pub expected_services: Vec<String>,
  /// Whether the app still needs its first image pull
  /// (cleared after digests are locked).
  #[serde(default, skip_serializing_if = "is_false")]
  pub initial_setup_required: bool,
  /// Opaque icon reference.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub icon: Option<String>,
}

fn is_false(b: &bool) -> bool {
  !b
}

/// Status of a single container backing a compose service.
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
pub enum ServiceState {
  Running,
  Stopped,
  Error,
  /// The runtime has never created the container.
  NotCreated,
  #[default]
  Unknown,
}

/// Aggregate state of an app, computed over its expected services.
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
pub enum AppState {
  /// All services running.
  Running,
  /// All services stopped.
  Stopped,
  /// At least one service in error.
  Error,
  /// Mix of running and stopped.
  Partial,
  /// No service state could be determined.
  #[default]
  Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStatus {
  /// The compose service key.
  pub service: String,
  /// The canonical container name.
  pub container_name: String,
  pub state: ServiceState,
  /// Raw status string from the runtime, if any.
  #[serde(default)]
  pub status: Option<String>,
  /// Health as reported by the runtime, if any.
  #[serde(default)]
  pub health: Option<String>,
  #[serde(default)]
  pub image: Option<String>,
}

/// One row of `ListApps`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSummary {
  pub id: String,
  pub name: String,
  #[serde(default)]
  pub icon: Option<String>,
  pub state: AppState,
  pub services: Vec<ServiceStatus>,
  /// Set if an operation is pending or in progress for this app.
  #[serde(default)]
  pub active_operation: Option<Operation>,
}

/// Full response of `GetApp`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppDetail {
  pub manifest: AppManifest,
  /// Raw compose file contents from disk.
  pub compose_contents: String,
  /// Raw `.env` contents from disk.
  pub env_contents: String,
  pub state: AppState,
  pub services: Vec<ServiceStatus>,
  #[serde(default)]
  pub active_operation: Option<Operation>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn app_id_grammar() {
    assert!(valid_app_id("web1"));
    assert!(valid_app_id("0db"));
    assert!(valid_app_id("a-b-c"));
    assert!(!valid_app_id(""));
    assert!(!valid_app_id("-web"));
    assert!(!valid_app_id("Web"));
    assert!(!valid_app_id("web_1"));
    assert!(!valid_app_id("web.1"));
  }

  #[test]
  fn canonical_names() {
    assert_eq!(
      container_name("ontree", "web1", "web1", 1),
      "ontree-web1-web1-1"
    );
    assert_eq!(network_name("ontree", "web1"), "ontree-web1_default");
    assert_eq!(
      volume_name("ontree", "web1", "data"),
      "ontree-web1_data"
    );
  }

  #[test]
  fn manifest_round_trip_preserves_fields() {
    let manifest = AppManifest {
      id: "web1".into(),
      name: "Web One".into(),
      primary_service: "web1".into(),
      expected_services: vec!["web1".into(), "db".into()],
      initial_setup_required: true,
      icon: Some("globe".into()),
    };
    let yaml = serde_yaml_ng::to_string(&manifest).unwrap();
    let back: AppManifest =
      serde_yaml_ng::from_str(&yaml).unwrap();
    assert_eq!(manifest, back);
  }
}
