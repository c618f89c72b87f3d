use resolver_api::Resolve;
use serde::{Deserialize, Serialize};

use crate::entities::{
  app::AppManifest, chat::ChatMessage, operation::Operation,
};

/// Install a new app: validate the compose contents and write the
/// three app files atomically. If the manifest marks
/// `initial_setup_required`, an initial-setup operation is
/// enqueued after creation and returned.
#[derive(Debug, Clone, Serialize, Deserialize, Resolve)]
#[response(CreateAppResponse)]
#[error(serror::Error)]
pub struct CreateApp {
  /// Lowercase app id matching `[a-z0-9][a-z0-9-]*`.
  pub id: String,
  pub compose_contents: String,
  pub env_contents: String,
  pub manifest: AppManifest,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateAppResponse {
  /// The initial-setup operation, if one was enqueued.
  pub operation: Option<Operation>,
}

//

/// Rewrite app files on disk. Compose contents are re-validated
/// when present. Running containers are not implicitly recreated;
/// an advisory is returned instead.
#[derive(Debug, Clone, Serialize, Deserialize, Resolve)]
#[response(UpdateAppResponse)]
#[error(serror::Error)]
pub struct UpdateApp {
  pub id: String,
  #[serde(default)]
  pub compose_contents: Option<String>,
  #[serde(default)]
  pub env_contents: Option<String>,
  #[serde(default)]
  pub manifest: Option<AppManifest>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateAppResponse {
  /// Set when containers are running and a recreate is needed for
  /// the new files to take effect.
  pub advisory: Option<String>,
}

//

/// Append a message to an app's chat stream.
#[derive(Debug, Clone, Serialize, Deserialize, Resolve)]
#[response(ChatMessage)]
#[error(serror::Error)]
pub struct AddChatMessage {
  pub message: ChatMessage,
}
