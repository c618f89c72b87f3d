use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

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
pub enum SenderType {
  User,
  Agent,
  #[default]
  System,
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
pub enum StatusLevel {
  #[default]
  Info,
  Warning,
  Error,
  Critical,
}

/// Per-app, append-only message stream for agent / monitoring
/// output and user commands. Always queried newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
  pub app_id: String,
  pub timestamp: i64,
  pub message: String,
  pub sender_type: SenderType,
  pub sender_name: String,
  pub status_level: StatusLevel,
  #[serde(default)]
  pub agent_model: Option<String>,
  #[serde(default)]
  pub agent_provider: Option<String>,
  #[serde(default)]
  pub details: Option<serde_json::Value>,
}
