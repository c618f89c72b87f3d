use resolver_api::Resolve;
use treeos_client::{
  api::read::*,
  entities::{
    app::{AppDetail, AppManifest, AppSummary},
    chat::ChatMessage,
    model::{DownloadJob, ModelRecord},
    operation::{Log, Operation, OperationLogEntry},
  },
};

use crate::{
  api::active_operation,
  config::core_config,
  engine::{self, status},
  runtime,
  state::db_client,
};

impl Resolve<super::Args> for GetVersion {
  async fn resolve(
    self,
    _: &super::Args,
  ) -> serror::Result<GetVersionResponse> {
    Ok(GetVersionResponse {
      version: env!("CARGO_PKG_VERSION").to_string(),
    })
  }
}

//

async fn summarize(
  manifest: AppManifest,
) -> anyhow::Result<AppSummary> {
  let config = core_config();
  let project = treeos_client::entities::app::project_name(
    &config.fixed_prefix,
    &manifest.id,
  );
  // The runtime being down must not hide installed apps.
  let ps = match runtime::ps(&project).await {
    Ok(ps) => ps,
    Err(e) => {
      debug!("ps failed for {project}: {e:#}");
      Vec::new()
    }
  };
  let services = status::service_statuses(
    &config.fixed_prefix,
    &manifest.id,
    &manifest.expected_services,
    &ps,
  );
  let state = status::aggregate_state(&services);
  let active = active_operation(&manifest.id).await?;
  Ok(AppSummary {
    id: manifest.id.clone(),
    name: manifest.name.clone(),
    icon: manifest.icon.clone(),
    state,
    services,
    active_operation: active,
  })
}

impl Resolve<super::Args> for ListApps {
  #[instrument(name = "ListApps", level = "debug", skip_all)]
  async fn resolve(
    self,
    _: &super::Args,
  ) -> serror::Result<Vec<AppSummary>> {
    let manifests =
      engine::scan_apps(&core_config().apps_root).await?;
    let mut summaries = Vec::with_capacity(manifests.len());
    for manifest in manifests {
      summaries.push(summarize(manifest).await?);
    }
    Ok(summaries)
  }
}

//

impl Resolve<super::Args> for GetApp {
  #[instrument(name = "GetApp", level = "debug")]
  async fn resolve(
    self,
    _: &super::Args,
  ) -> serror::Result<AppDetail> {
    let config = core_config();
    let files = engine::read_app_files(
      &config.apps_root,
      &self.id,
      &config.fixed_prefix,
    )
    .await?;
    let summary = summarize(files.manifest.clone()).await?;
    Ok(AppDetail {
      manifest: files.manifest,
      compose_contents: files.compose_contents,
      env_contents: files.env_contents,
      state: summary.state,
      services: summary.services,
      active_operation: summary.active_operation,
    })
  }
}

//

impl Resolve<super::Args> for GetAppLog {
  #[instrument(name = "GetAppLog", level = "debug")]
  async fn resolve(
    self,
    _: &super::Args,
  ) -> serror::Result<Log> {
    let config = core_config();
    // Confirms the app exists and the project name is sound.
    engine::read_app_files(
      &config.apps_root,
      &self.id,
      &config.fixed_prefix,
    )
    .await?;
    let project = treeos_client::entities::app::project_name(
      &config.fixed_prefix,
      &self.id,
    );
    Ok(
      runtime::logs(
        &project,
        &self.services,
        self.tail.min(5000),
        self.timestamps,
      )
      .await,
    )
  }
}

//

impl Resolve<super::Args> for GetOperation {
  async fn resolve(
    self,
    _: &super::Args,
  ) -> serror::Result<Operation> {
    match db_client()
      .operations
      .get(&self.operation_id)
      .await?
    {
      Some(operation) => Ok(operation),
      None => Err(
        anyhow::Error::from(
          treeos_client::CoreError::NotFound {
            resource: "operation",
            name: self.operation_id.clone(),
          },
        )
        .into(),
      ),
    }
  }
}

//

impl Resolve<super::Args> for ListOperations {
  async fn resolve(
    self,
    _: &super::Args,
  ) -> serror::Result<Vec<Operation>> {
    Ok(
      db_client()
        .operations
        .list(self.app_id.as_deref(), self.limit)
        .await?,
    )
  }
}

//

impl Resolve<super::Args> for GetOperationLogs {
  async fn resolve(
    self,
    _: &super::Args,
  ) -> serror::Result<Vec<OperationLogEntry>> {
    Ok(
      db_client()
        .operation_logs
        .list(&self.operation_id)
        .await?,
    )
  }
}

//

impl Resolve<super::Args> for ListChatMessages {
  async fn resolve(
    self,
    _: &super::Args,
  ) -> serror::Result<Vec<ChatMessage>> {
    Ok(
      db_client()
        .chat
        .list(&self.app_id, self.limit)
        .await?,
    )
  }
}

//

impl Resolve<super::Args> for ListModels {
  async fn resolve(
    self,
    _: &super::Args,
  ) -> serror::Result<Vec<ModelRecord>> {
    Ok(db_client().models.list().await?)
  }
}

//

impl Resolve<super::Args> for ListDownloadJobs {
  async fn resolve(
    self,
    _: &super::Args,
  ) -> serror::Result<Vec<DownloadJob>> {
    Ok(db_client().download_jobs.list().await?)
  }
}
