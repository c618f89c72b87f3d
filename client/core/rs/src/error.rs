use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Machine-readable error kinds. UIs correlate on the kind code
/// for styling; the human message is rendered as-is.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  Display,
  EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
  Validation,
  NotFound,
  Conflict,
  Runtime,
  Cancelled,
  Stale,
  Integrity,
  QueueFull,
  Internal,
}

/// Rule identifiers produced by the compose validator and the
/// engine's naming checks.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  Display,
  EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ValidationRule {
  InvalidYaml,
  NoServices,
  Privileged,
  CapAdd,
  NoImage,
  BindMount,
  InvalidName,
  Confirmation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
  /// The offending compose service key, when the rule applies to
  /// one service.
  #[serde(default)]
  pub service: Option<String>,
  pub rule: ValidationRule,
  pub message: String,
}

impl std::fmt::Display for ValidationError {
  fn fmt(
    &self,
    f: &mut std::fmt::Formatter<'_>,
  ) -> std::fmt::Result {
    match &self.service {
      Some(service) => {
        write!(f, "[{}] {service}: {}", self.rule, self.message)
      }
      None => write!(f, "[{}] {}", self.rule, self.message),
    }
  }
}

/// The boundary error type. Attached to anyhow chains inside the
/// core so the request boundary can downcast the kind while the
/// message flows verbatim.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CoreError {
  /// All rule violations found, not just the first.
  #[error("compose validation failed: {}", format_validation_errors(.0))]
  Validation(Vec<ValidationError>),
  #[error("{resource} not found: {name}")]
  NotFound { resource: &'static str, name: String },
  #[error("{0}")]
  Conflict(String),
  #[error("container runtime error: {0}")]
  Runtime(String),
  #[error("cancelled")]
  Cancelled,
  #[error("operation is stale")]
  Stale,
  #[error("{0}")]
  Integrity(String),
  #[error("operation queue is full")]
  QueueFull,
  #[error("{0}")]
  Internal(String),
}

impl CoreError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      CoreError::Validation(_) => ErrorKind::Validation,
      CoreError::NotFound { .. } => ErrorKind::NotFound,
      CoreError::Conflict(_) => ErrorKind::Conflict,
      CoreError::Runtime(_) => ErrorKind::Runtime,
      CoreError::Cancelled => ErrorKind::Cancelled,
      CoreError::Stale => ErrorKind::Stale,
      CoreError::Integrity(_) => ErrorKind::Integrity,
      CoreError::QueueFull => ErrorKind::QueueFull,
      CoreError::Internal(_) => ErrorKind::Internal,
    }
  }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
  errors
    .iter()
    .map(ToString::to_string)
    .collect::<Vec<_>>()
    .join("; ")
}

/// The error kind of an anyhow chain, if a [CoreError] is in it.
pub fn error_kind(e: &anyhow::Error) -> Option<ErrorKind> {
  e.downcast_ref::<CoreError>().map(CoreError::kind)
}
