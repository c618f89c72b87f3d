use treeos_client::entities::app::{
  AppState, ServiceState, ServiceStatus, container_name,
};

use crate::runtime::PsItem;

/// Map one runtime state onto the service state model.
fn map_state(item: &PsItem) -> ServiceState {
  match item.state.to_lowercase().as_str() {
    "running" | "up" => ServiceState::Running,
    "restarting" => ServiceState::Error,
    "exited" | "stopped" => match item.exit_code {
      Some(0) | None => ServiceState::Stopped,
      Some(_) => ServiceState::Error,
    },
    "created" | "paused" | "dead" => ServiceState::Stopped,
    _ => ServiceState::Unknown,
  }
}

/// Per-service status for every expected service of an app.
/// Services absent from `ps` output were never created.
pub fn service_statuses(
  prefix: &str,
  app_id: &str,
  expected_services: &[String],
  ps: &[PsItem],
) -> Vec<ServiceStatus> {
  expected_services
    .iter()
    .map(|service| {
      let name = container_name(prefix, app_id, service, 1);
      let item = ps.iter().find(|item| {
        item.name == name || item.service == *service
      });
      match item {
        Some(item) => ServiceStatus {
          service: service.clone(),
          container_name: name,
          state: map_state(item),
          status: item.status.clone(),
          health: item.health.clone(),
          image: item.image.clone(),
        },
        None => ServiceStatus {
          service: service.clone(),
          container_name: name,
          state: ServiceState::NotCreated,
          status: None,
          health: None,
          image: None,
        },
      }
    })
    .collect()
}

/// Aggregate over the per-service states.
pub fn aggregate_state(services: &[ServiceStatus]) -> AppState {
  if services.is_empty() {
    return AppState::Unknown;
  }
  if services
    .iter()
    .any(|s| s.state == ServiceState::Error)
  {
    return AppState::Error;
  }
  let running = services
    .iter()
    .filter(|s| s.state == ServiceState::Running)
    .count();
  let stopped = services
    .iter()
    .filter(|s| {
      matches!(
        s.state,
        ServiceState::Stopped | ServiceState::NotCreated
      )
    })
    .count();
  if running == services.len() {
    AppState::Running
  } else if stopped == services.len() {
    AppState::Stopped
  } else if running > 0 {
    AppState::Partial
  } else {
    AppState::Unknown
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn ps_item(
    service: &str,
    state: &str,
    exit_code: Option<i64>,
  ) -> PsItem {
    PsItem {
      name: container_name("ontree", "web1", service, 1),
      service: service.to_string(),
      state: state.to_string(),
      exit_code,
      ..Default::default()
    }
  }

  fn expected(services: &[&str]) -> Vec<String> {
    services.iter().map(|s| s.to_string()).collect()
  }

  #[test]
  fn all_running_aggregates_running() {
    let services = service_statuses(
      "ontree",
      "web1",
      &expected(&["web1", "db"]),
      &[
        ps_item("web1", "running", None),
        ps_item("db", "running", None),
      ],
    );
    assert_eq!(aggregate_state(&services), AppState::Running);
    assert_eq!(
      services[0].container_name,
      "ontree-web1-web1-1"
    );
  }

  #[test]
  fn clean_exit_is_stopped_dirty_exit_is_error() {
    let services = service_statuses(
      "ontree",
      "web1",
      &expected(&["web1"]),
      &[ps_item("web1", "exited", Some(0))],
    );
    assert_eq!(services[0].state, ServiceState::Stopped);
    assert_eq!(aggregate_state(&services), AppState::Stopped);

    let services = service_statuses(
      "ontree",
      "web1",
      &expected(&["web1"]),
      &[ps_item("web1", "exited", Some(137))],
    );
    assert_eq!(services[0].state, ServiceState::Error);
    assert_eq!(aggregate_state(&services), AppState::Error);
  }

  #[test]
  fn mixed_states_aggregate_partial_or_error() {
    let services = service_statuses(
      "ontree",
      "web1",
      &expected(&["web1", "db"]),
      &[
        ps_item("web1", "running", None),
        ps_item("db", "exited", Some(0)),
      ],
    );
    assert_eq!(aggregate_state(&services), AppState::Partial);

    let services = service_statuses(
      "ontree",
      "web1",
      &expected(&["web1", "db"]),
      &[
        ps_item("web1", "running", None),
        ps_item("db", "restarting", None),
      ],
    );
    assert_eq!(aggregate_state(&services), AppState::Error);
  }

  #[test]
  fn absent_services_were_never_created() {
    let services = service_statuses(
      "ontree",
      "web1",
      &expected(&["web1", "db"]),
      &[],
    );
    assert!(
      services
        .iter()
        .all(|s| s.state == ServiceState::NotCreated)
    );
    assert_eq!(aggregate_state(&services), AppState::Stopped);

    assert_eq!(aggregate_state(&[]), AppState::Unknown);
  }
}
