use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Container label marking the inference container hosting the
/// model CLI.
pub const INFERENCE_LABEL: &str = "ontree.inference=true";

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
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ModelStatus {
  #[default]
  NotDownloaded,
  Queued,
  Downloading,
  Completed,
  Failed,
}

/// A large model managed inside the inference container.
/// `name` is the registry-qualified identifier and primary key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRecord {
  pub name: String,
  #[serde(default)]
  pub display_name: String,
  #[serde(default)]
  pub category: String,
  #[serde(default)]
  pub size_estimate: String,
  #[serde(default)]
  pub description: String,
  pub status: ModelStatus,
  /// 0 - 100.
  pub progress: i64,
  #[serde(default)]
  pub last_error: String,
  pub updated_at: i64,
  #[serde(default)]
  pub completed_at: Option<i64>,
}

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
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DownloadJobStatus {
  #[default]
  Queued,
  Processing,
  Completed,
  Failed,
  Cancelled,
}

/// A queued or active model download.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadJob {
  pub id: String,
  pub model_name: String,
  pub status: DownloadJobStatus,
  pub created_at: i64,
  pub updated_at: i64,
}

/// Best-effort progress broadcast to subscribers. Durability is
/// via the [ModelRecord].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPullEvent {
  pub model_name: String,
  pub status: ModelStatus,
  pub progress: i64,
  #[serde(default)]
  pub error: Option<String>,
}

/// Strip registry / library prefixes and join `model:tag` into the
/// canonical identifier used as [ModelRecord] primary key.
///
/// `registry.ollama.ai/library/gemma/2b` -> `gemma:2b`
pub fn canonical_model_name(
  model: &str,
  tag: Option<&str>,
) -> String {
  let mut model = model;
  for prefix in ["registry.ollama.ai/", "ollama.ai/", "library/"] {
    if let Some(stripped) = model.strip_prefix(prefix) {
      model = stripped;
    }
  }
  match tag {
    Some(tag) if !tag.is_empty() => format!("{model}:{tag}"),
    _ => model.to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn canonical_names() {
    assert_eq!(
      canonical_model_name(
        "registry.ollama.ai/library/gemma",
        Some("2b")
      ),
      "gemma:2b"
    );
    assert_eq!(
      canonical_model_name("library/llama3", Some("latest")),
      "llama3:latest"
    );
    assert_eq!(canonical_model_name("mistral", None), "mistral");
    assert_eq!(canonical_model_name("mistral", Some("")), "mistral");
  }
}
