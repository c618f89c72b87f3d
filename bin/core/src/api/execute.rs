use resolver_api::Resolve;
use serde_json::json;
use treeos_client::{
  CoreError,
  api::execute::*,
  entities::{
    config::StopMode,
    model::DownloadJob,
    operation::{Operation, OperationType},
  },
  error::{ValidationError, ValidationRule},
};

use crate::{
  api::active_operation,
  config::core_config,
  engine, models, ops, runtime, validate,
};

/// Shared preflight for operations on one app: the files must be
/// readable and consistent before anything is enqueued.
async fn read_and_validate(
  app_id: &str,
) -> anyhow::Result<engine::AppFiles> {
  let config = core_config();
  let files = engine::read_app_files(
    &config.apps_root,
    app_id,
    &config.fixed_prefix,
  )
  .await?;
  validate::validate_for_app(app_id, &files.compose_contents)?;
  Ok(files)
}

impl Resolve<super::Args> for StartApp {
  #[instrument(name = "StartApp", skip_all, fields(app = &self.id))]
  async fn resolve(
    self,
    _: &super::Args,
  ) -> serror::Result<Operation> {
    // Validation errors surface synchronously, identical to the
    // ones CreateApp would produce for the same document.
    read_and_validate(&self.id).await?;
    Ok(
      ops::enqueue_operation(
        OperationType::Start,
        &self.id,
        json!({}),
      )
      .await?,
    )
  }
}

//

impl Resolve<super::Args> for StopApp {
  #[instrument(name = "StopApp", skip_all, fields(app = &self.id))]
  async fn resolve(
    self,
    _: &super::Args,
  ) -> serror::Result<StopAppResponse> {
    let config = core_config();
    engine::read_app_files(
      &config.apps_root,
      &self.id,
      &config.fixed_prefix,
    )
    .await?;

    match config.stop_mode {
      StopMode::Operation => {
        let operation = ops::enqueue_operation(
          OperationType::Stop,
          &self.id,
          json!({}),
        )
        .await?;
        Ok(StopAppResponse {
          operation: Some(operation),
          log: None,
        })
      }
      StopMode::Inline => {
        // The at-most-one rule holds for inline stops too: the
        // per-app lock serializes this check against concurrent
        // enqueues and other inline stops.
        let lock = crate::state::app_lock(&self.id);
        let _guard = lock.lock().await;
        if let Some(active) =
          active_operation(&self.id).await?
        {
          return Err(
            anyhow::Error::from(CoreError::Conflict(format!(
              "operation {} is already {} for app {}",
              active.id, active.status, self.id
            )))
            .into(),
          );
        }
        let project =
          treeos_client::entities::app::project_name(
            &config.fixed_prefix,
            &self.id,
          );
        let log =
          runtime::down(None, &project, false).await;
        if !log.success {
          return Err(
            anyhow::Error::from(CoreError::Runtime(
              log.combined(),
            ))
            .into(),
          );
        }
        Ok(StopAppResponse {
          operation: None,
          log: Some(log),
        })
      }
    }
  }
}

//

impl Resolve<super::Args> for RecreateApp {
  #[instrument(name = "RecreateApp", skip_all, fields(app = &self.id))]
  async fn resolve(
    self,
    _: &super::Args,
  ) -> serror::Result<Operation> {
    read_and_validate(&self.id).await?;
    Ok(
      ops::enqueue_operation(
        OperationType::Recreate,
        &self.id,
        json!({}),
      )
      .await?,
    )
  }
}

//

impl Resolve<super::Args> for PullAppImages {
  #[instrument(name = "PullAppImages", skip_all, fields(app = &self.id))]
  async fn resolve(
    self,
    _: &super::Args,
  ) -> serror::Result<Operation> {
    read_and_validate(&self.id).await?;
    Ok(
      ops::enqueue_operation(
        OperationType::PullImage,
        &self.id,
        json!({}),
      )
      .await?,
    )
  }
}

//

impl Resolve<super::Args> for UpdateAppImage {
  #[instrument(name = "UpdateAppImage", skip_all, fields(app = &self.id))]
  async fn resolve(
    self,
    _: &super::Args,
  ) -> serror::Result<Operation> {
    read_and_validate(&self.id).await?;
    Ok(
      ops::enqueue_operation(
        OperationType::UpdateImage,
        &self.id,
        json!({}),
      )
      .await?,
    )
  }
}

//

impl Resolve<super::Args> for DeleteApp {
  #[instrument(name = "DeleteApp", skip_all, fields(app = &self.id))]
  async fn resolve(
    self,
    _: &super::Args,
  ) -> serror::Result<Operation> {
    let config = core_config();
    // A stray id pasted into the confirmation field must not
    // delete anything.
    if self.confirm != format!("delete {}", self.id) {
      return Err(
        anyhow::Error::from(CoreError::Validation(vec![
          ValidationError {
            service: None,
            rule: ValidationRule::Confirmation,
            message: format!(
              "confirmation must be exactly 'delete {}'",
              self.id
            ),
          },
        ]))
        .into(),
      );
    }
    engine::read_app_files(
      &config.apps_root,
      &self.id,
      &config.fixed_prefix,
    )
    .await?;
    Ok(
      ops::enqueue_operation(
        OperationType::DeleteApp,
        &self.id,
        json!({ "wipe_volumes": self.wipe_volumes }),
      )
      .await?,
    )
  }
}

//

impl Resolve<super::Args> for CancelOperation {
  #[instrument(name = "CancelOperation")]
  async fn resolve(
    self,
    _: &super::Args,
  ) -> serror::Result<CancelOutcome> {
    Ok(ops::cancel_operation(&self.operation_id).await?)
  }
}

//

impl Resolve<super::Args> for PullModel {
  #[instrument(name = "PullModel")]
  async fn resolve(
    self,
    _: &super::Args,
  ) -> serror::Result<DownloadJob> {
    Ok(models::queue_model_pull(&self.model_name).await?)
  }
}

//

impl Resolve<super::Args> for CancelModelPull {
  #[instrument(name = "CancelModelPull")]
  async fn resolve(
    self,
    _: &super::Args,
  ) -> serror::Result<CancelOutcome> {
    Ok(models::cancel_model_pull(&self.model_name).await?)
  }
}

//

impl Resolve<super::Args> for ReconcileModels {
  #[instrument(name = "ReconcileModels")]
  async fn resolve(
    self,
    _: &super::Args,
  ) -> serror::Result<ReconcileModelsResponse> {
    let summary = models::reconcile::reconcile_models(
      crate::state::db_client(),
      &models::manifests_root(),
    )
    .await?;
    Ok(ReconcileModelsResponse {
      completed: summary.completed,
      reset: summary.reset,
    })
  }
}
