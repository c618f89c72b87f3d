use resolver_api::Resolve;
use serde_json::json;
use treeos_client::{
  CoreError,
  api::write::*,
  entities::{
    app::AppState, chat::ChatMessage,
    operation::OperationType, treeos_timestamp,
  },
  error::{ValidationError, ValidationRule},
};

use crate::{
  config::core_config,
  engine::{self, project_name_from_env, status},
  ops, runtime,
  state::db_client,
  validate,
};

fn check_env_project_name(
  env_contents: &str,
  app_id: &str,
) -> anyhow::Result<()> {
  let expected =
    format!("{}-{app_id}", core_config().fixed_prefix);
  match project_name_from_env(env_contents) {
    Some(project) if project == expected => Ok(()),
    other => Err(
      CoreError::Integrity(format!(
        "ProjectNameMismatch: COMPOSE_PROJECT_NAME is {other:?}, \
         expected '{expected}'"
      ))
      .into(),
    ),
  }
}

impl Resolve<super::Args> for CreateApp {
  #[instrument(name = "CreateApp", skip_all, fields(app = &self.id))]
  async fn resolve(
    self,
    _: &super::Args,
  ) -> serror::Result<CreateAppResponse> {
    let CreateApp {
      id,
      compose_contents,
      env_contents,
      manifest,
    } = self;
    let config = core_config();

    if manifest.id != id {
      return Err(
        anyhow::Error::from(CoreError::Validation(vec![
          ValidationError {
            service: None,
            rule: ValidationRule::InvalidName,
            message: format!(
              "manifest id '{}' does not match app id '{id}'",
              manifest.id
            ),
          },
        ]))
        .into(),
      );
    }

    // Same rule pipeline as every subsequent start.
    validate::validate_for_app(&id, &compose_contents)?;
    check_env_project_name(&env_contents, &id)?;

    engine::create_app_files(
      &config.apps_root,
      &id,
      &engine::AppFiles {
        manifest: manifest.clone(),
        compose_contents,
        env_contents,
      },
    )
    .await?;
    db_client().apps.upsert(&manifest).await?;
    info!("created app {id}");

    let operation = if manifest.initial_setup_required {
      Some(
        ops::enqueue_operation(
          OperationType::CreateApp,
          &id,
          json!({}),
        )
        .await?,
      )
    } else {
      None
    };

    Ok(CreateAppResponse { operation })
  }
}

//

impl Resolve<super::Args> for UpdateApp {
  #[instrument(name = "UpdateApp", skip_all, fields(app = &self.id))]
  async fn resolve(
    self,
    _: &super::Args,
  ) -> serror::Result<UpdateAppResponse> {
    let UpdateApp {
      id,
      compose_contents,
      env_contents,
      manifest,
    } = self;
    let config = core_config();

    let current = engine::read_app_files(
      &config.apps_root,
      &id,
      &config.fixed_prefix,
    )
    .await?;

    if let Some(compose_contents) = &compose_contents {
      validate::validate_for_app(&id, compose_contents)?;
    }
    if let Some(env_contents) = &env_contents {
      check_env_project_name(env_contents, &id)?;
    }

    let manifest = manifest.unwrap_or(current.manifest);
    let files = engine::AppFiles {
      compose_contents: compose_contents
        .unwrap_or(current.compose_contents),
      env_contents: env_contents
        .unwrap_or(current.env_contents),
      manifest: manifest.clone(),
    };
    engine::write_app_files(
      &engine::app_directory(&config.apps_root, &id),
      &files,
    )
    .await?;
    db_client().apps.upsert(&manifest).await?;

    // Never implicitly recreate running containers.
    let project = treeos_client::entities::app::project_name(
      &config.fixed_prefix,
      &id,
    );
    let advisory = match runtime::ps(&project).await {
      Ok(ps) => {
        let services = status::service_statuses(
          &config.fixed_prefix,
          &id,
          &manifest.expected_services,
          &ps,
        );
        (status::aggregate_state(&services)
          != AppState::Stopped)
          .then(|| {
            String::from(
              "containers are running; recreate the app for \
               the new files to take effect",
            )
          })
      }
      Err(_) => None,
    };

    Ok(UpdateAppResponse { advisory })
  }
}

//

impl Resolve<super::Args> for AddChatMessage {
  async fn resolve(
    self,
    _: &super::Args,
  ) -> serror::Result<ChatMessage> {
    let mut message = self.message;
    if message.timestamp == 0 {
      message.timestamp = treeos_timestamp();
    }
    db_client().chat.append(&message).await?;
    Ok(message)
  }
}
