//! Uniform interface to the local container runtime CLI. The
//! adapter shells out for every call and never caches container
//! state - the runtime daemon owns it.

use std::path::Path;

use anyhow::Context;
use command::{StreamingChild, run_treeos_command};
use serde::{Deserialize, Serialize};
use treeos_client::{CoreError, entities::operation::Log};

use crate::config::core_config;

pub mod progress;

pub fn runtime_binary() -> &'static str {
  &core_config().runtime_binary
}

fn compose(project: &str) -> String {
  format!("{} compose -p {project}", runtime_binary())
}

/// `compose up -d`, captured. Small apps complete inline; long
/// starts go through [up_child] so they can stream and cancel.
pub async fn up(project_dir: &Path, project: &str) -> Log {
  run_treeos_command(
    "Compose Up",
    project_dir,
    format!("{} up -d", compose(project)),
  )
  .await
}

pub fn up_child(
  project_dir: &Path,
  project: &str,
) -> anyhow::Result<StreamingChild> {
  StreamingChild::spawn(
    "Compose Up",
    project_dir,
    format!("{} up -d", compose(project)),
  )
}

/// `up -d --force-recreate`, used after an image update so
/// running containers are replaced even when the config is
/// unchanged.
pub fn up_force_child(
  project_dir: &Path,
  project: &str,
) -> anyhow::Result<StreamingChild> {
  StreamingChild::spawn(
    "Compose Up",
    project_dir,
    format!("{} up -d --force-recreate", compose(project)),
  )
}

pub async fn pull(project_dir: &Path, project: &str) -> Log {
  run_treeos_command(
    "Compose Pull",
    project_dir,
    format!("{} pull", compose(project)),
  )
  .await
}

pub fn pull_child(
  project_dir: &Path,
  project: &str,
) -> anyhow::Result<StreamingChild> {
  StreamingChild::spawn(
    "Compose Pull",
    project_dir,
    format!("{} pull", compose(project)),
  )
}

/// `compose down`, never touching named volumes unless asked.
pub async fn down(
  project_dir: Option<&Path>,
  project: &str,
  wipe_volumes: bool,
) -> Log {
  let volumes_arg = if wipe_volumes { " -v" } else { "" };
  run_treeos_command(
    "Compose Down",
    project_dir,
    format!("{} down{volumes_arg}", compose(project)),
  )
  .await
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PsItem {
  #[serde(default, alias = "Name")]
  pub name: String,
  #[serde(default, alias = "Service")]
  pub service: String,
  #[serde(default, alias = "State")]
  pub state: String,
  #[serde(default, alias = "Status")]
  pub status: Option<String>,
  #[serde(default, alias = "Health")]
  pub health: Option<String>,
  #[serde(default, alias = "Image")]
  pub image: Option<String>,
  #[serde(default, alias = "ExitCode")]
  pub exit_code: Option<i64>,
}

/// All containers of a project, including stopped ones.
pub async fn ps(project: &str) -> anyhow::Result<Vec<PsItem>> {
  let log = run_treeos_command(
    "Compose Ps",
    None,
    format!("{} ps -a --format json", compose(project)),
  )
  .await;
  if !log.success {
    return Err(
      CoreError::Runtime(log.combined())
        .into(),
    );
  }
  parse_ps_output(&log.stdout)
}

/// Both framings exist in the wild: podman emits one JSON array,
/// docker compose emits one object per line.
pub fn parse_ps_output(
  stdout: &str,
) -> anyhow::Result<Vec<PsItem>> {
  let trimmed = stdout.trim();
  if trimmed.is_empty() {
    return Ok(Vec::new());
  }
  if trimmed.starts_with('[') {
    return serde_json::from_str::<Vec<PsItem>>(trimmed)
      .context("failed to parse ps json array");
  }
  trimmed
    .lines()
    .filter(|line| !line.trim().is_empty())
    .map(|line| {
      serde_json::from_str::<PsItem>(line)
        .with_context(|| format!("failed to parse ps row: {line}"))
    })
    .collect()
}

pub async fn logs(
  project: &str,
  services: &[String],
  tail: u64,
  timestamps: bool,
) -> Log {
  let timestamps =
    if timestamps { " --timestamps" } else { Default::default() };
  let command = format!(
    "{} logs --tail {tail}{timestamps} {}",
    compose(project),
    services.join(" ")
  );
  run_treeos_command("Get App Log", None, command).await
}

/// Run a command inside a container and capture the output.
pub async fn exec_capture(
  stage: &str,
  container: &str,
  command: &str,
) -> Log {
  run_treeos_command(
    stage,
    None,
    format!("{} exec {container} {command}", runtime_binary()),
  )
  .await
}

/// Streaming exec with a killable host-side child. Killing the
/// host child does NOT propagate into the container; callers that
/// need the in-container process gone must signal it through
/// [exec_capture] first.
pub fn exec_child(
  stage: &str,
  container: &str,
  command: &str,
) -> anyhow::Result<StreamingChild> {
  StreamingChild::spawn(
    stage,
    None,
    format!("{} exec {container} {command}", runtime_binary()),
  )
}

/// Container names carrying the given `key=value` label.
pub async fn list_by_label(
  label: &str,
) -> anyhow::Result<Vec<String>> {
  let log = run_treeos_command(
    "List Containers",
    None,
    format!(
      "{} ps --filter label={label} --format '{{{{.Names}}}}'",
      runtime_binary()
    ),
  )
  .await;
  if !log.success {
    return Err(CoreError::Runtime(log.combined()).into());
  }
  Ok(
    log
      .stdout
      .lines()
      .map(str::trim)
      .filter(|line| !line.is_empty())
      .map(str::to_string)
      .collect(),
  )
}

/// Named volumes belonging to a compose project.
pub async fn list_project_volumes(
  project: &str,
) -> anyhow::Result<Vec<String>> {
  let log = run_treeos_command(
    "List Volumes",
    None,
    format!(
      "{} volume ls --filter \
       label=com.docker.compose.project={project} --quiet",
      runtime_binary()
    ),
  )
  .await;
  if !log.success {
    return Err(CoreError::Runtime(log.combined()).into());
  }
  Ok(
    log
      .stdout
      .lines()
      .map(str::trim)
      .filter(|line| !line.is_empty())
      .map(str::to_string)
      .collect(),
  )
}

pub async fn remove_volume(volume: &str) -> Log {
  run_treeos_command(
    "Remove Volume",
    None,
    format!("{} volume rm {volume}", runtime_binary()),
  )
  .await
}

pub async fn remove_network(network: &str) -> Log {
  run_treeos_command(
    "Remove Network",
    None,
    format!("{} network rm {network}", runtime_binary()),
  )
  .await
}

pub async fn image_exists(image: &str) -> bool {
  run_treeos_command(
    "Inspect Image",
    None,
    format!(
      "{} image inspect --format '{{{{.Id}}}}' {image}",
      runtime_binary()
    ),
  )
  .await
  .success
}

/// The local image id, used to detect whether a pull produced a
/// new image.
pub async fn image_id(image: &str) -> Option<String> {
  let log = run_treeos_command(
    "Inspect Image",
    None,
    format!(
      "{} image inspect --format '{{{{.Id}}}}' {image}",
      runtime_binary()
    ),
  )
  .await;
  if log.success {
    Some(log.stdout.trim().to_string())
  } else {
    None
  }
}

/// First repo digest of a local image: `<repo>@sha256:<digest>`.
pub async fn image_digest(
  image: &str,
) -> anyhow::Result<Option<String>> {
  let log = run_treeos_command(
    "Inspect Image",
    None,
    format!(
      "{} image inspect --format \
       '{{{{index .RepoDigests 0}}}}' {image}",
      runtime_binary()
    ),
  )
  .await;
  if !log.success {
    return Err(CoreError::Runtime(log.combined()).into());
  }
  let digest = log.stdout.trim();
  if digest.is_empty() || !digest.contains("@sha256:") {
    return Ok(None);
  }
  Ok(Some(digest.to_string()))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_ps_array_and_ndjson() {
    let array = r#"[
      {"Name": "ontree-web1-web1-1", "Service": "web1",
       "State": "running", "Image": "nginx:alpine"},
      {"Name": "ontree-web1-db-1", "Service": "db",
       "State": "exited", "ExitCode": 0}
    ]"#;
    let items = parse_ps_output(array).unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].name, "ontree-web1-web1-1");
    assert_eq!(items[1].exit_code, Some(0));

    let ndjson = concat!(
      r#"{"Name":"ontree-web1-web1-1","Service":"web1","State":"running"}"#,
      "\n",
      r#"{"Name":"ontree-web1-db-1","Service":"db","State":"restarting"}"#,
    );
    let items = parse_ps_output(ndjson).unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[1].state, "restarting");

    assert!(parse_ps_output("").unwrap().is_empty());
  }
}
