//! Security validation of compose documents. Pure and total: the
//! full document is checked and the complete error set returned,
//! never just the first finding. Runs on every store AND every
//! start, because the file on disk can be edited between the two.

use std::path::{Component, Path, PathBuf};

use treeos_client::{
  CoreError,
  entities::compose::{ComposeFile, ComposeService},
  error::{ValidationError, ValidationRule},
};

use crate::config::core_config;

/// Capabilities that hand a container the host.
const CAP_DENYLIST: &[&str] = &[
  "SYS_ADMIN",
  "NET_ADMIN",
  "SYS_MODULE",
  "SYS_RAWIO",
  "SYS_PTRACE",
  "SYS_BOOT",
  "MAC_ADMIN",
  "MAC_OVERRIDE",
  "DAC_READ_SEARCH",
  "SETFCAP",
];

pub struct ValidateCtx<'a> {
  pub app_id: &'a str,
  pub apps_mount_root: &'a Path,
  pub shared_models_root: &'a Path,
}

/// Validate against the deployment's configured roots. Store and
/// start both go through here, so a rejected document produces
/// the identical error set on either path.
pub fn validate_for_app(
  app_id: &str,
  contents: &str,
) -> anyhow::Result<ComposeFile> {
  let config = core_config();
  validate_compose(
    contents,
    &ValidateCtx {
      app_id,
      apps_mount_root: &config.apps_mount_root,
      shared_models_root: &config.shared_models_root,
    },
  )
  .map_err(|errors| CoreError::Validation(errors).into())
}

pub fn validate_compose(
  contents: &str,
  ctx: &ValidateCtx,
) -> Result<ComposeFile, Vec<ValidationError>> {
  let compose = match serde_yaml_ng::from_str::<ComposeFile>(
    contents,
  ) {
    Ok(compose) => compose,
    Err(e) => {
      return Err(vec![ValidationError {
        service: None,
        rule: ValidationRule::InvalidYaml,
        message: format!("{e}"),
      }]);
    }
  };

  let mut errors = Vec::new();

  if compose.services.is_empty() {
    errors.push(ValidationError {
      service: None,
      rule: ValidationRule::NoServices,
      message: String::from(
        "compose file must declare at least one service",
      ),
    });
  }

  for (name, service) in &compose.services {
    check_service(name, service, ctx, &mut errors);
  }

  if errors.is_empty() { Ok(compose) } else { Err(errors) }
}

fn check_service(
  name: &str,
  service: &ComposeService,
  ctx: &ValidateCtx,
  errors: &mut Vec<ValidationError>,
) {
  if service.privileged {
    errors.push(ValidationError {
      service: Some(name.to_string()),
      rule: ValidationRule::Privileged,
      message: String::from(
        "privileged containers are not allowed",
      ),
    });
  }

  for cap in &service.cap_add {
    let cap_upper = cap.to_uppercase();
    let cap_upper =
      cap_upper.strip_prefix("CAP_").unwrap_or(&cap_upper);
    if CAP_DENYLIST.contains(&cap_upper) {
      errors.push(ValidationError {
        service: Some(name.to_string()),
        rule: ValidationRule::CapAdd,
        message: format!("capability {cap} is not allowed"),
      });
    }
  }

  if service.image.is_none() && service.build.is_none() {
    errors.push(ValidationError {
      service: Some(name.to_string()),
      rule: ValidationRule::NoImage,
      message: String::from(
        "service must declare either image or build",
      ),
    });
  }

  for volume in &service.volumes {
    if volume.is_named_volume() {
      continue;
    }
    let Some(source) = volume.source() else {
      continue;
    };
    if !bind_source_allowed(source, name, ctx) {
      errors.push(ValidationError {
        service: Some(name.to_string()),
        rule: ValidationRule::BindMount,
        message: format!(
          "bind mount source '{source}' is outside the \
           permitted roots"
        ),
      });
    }
  }
}

/// A bind source is allowed iff it is exactly
/// `<apps_mount_root>/<app_id>/<service>` or below, or inside the
/// shared models root. Relative paths, `~`, and any `..` segment
/// are rejected outright.
fn bind_source_allowed(
  source: &str,
  service: &str,
  ctx: &ValidateCtx,
) -> bool {
  let Some(source) = lexical_clean(Path::new(source)) else {
    return false;
  };
  let app_root = ctx
    .apps_mount_root
    .join(ctx.app_id)
    .join(service);
  source.starts_with(&app_root)
    || source.starts_with(ctx.shared_models_root)
}

/// Lexically normalize an absolute path: drop `.` segments and
/// duplicate separators. Relative paths and paths containing `..`
/// come back None - they could escape the permitted roots.
fn lexical_clean(path: &Path) -> Option<PathBuf> {
  if !path.is_absolute() {
    return None;
  }
  let mut clean = PathBuf::new();
  for component in path.components() {
    match component {
      Component::RootDir => clean.push("/"),
      Component::Normal(part) => clean.push(part),
      Component::CurDir => {}
      Component::ParentDir | Component::Prefix(_) => {
        return None;
      }
    }
  }
  Some(clean)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn ctx() -> ValidateCtx<'static> {
    ValidateCtx {
      app_id: "web1",
      apps_mount_root: Path::new("/mnt/apps"),
      shared_models_root: Path::new("/mnt/models"),
    }
  }

  fn rules_of(
    result: Result<ComposeFile, Vec<ValidationError>>,
  ) -> Vec<ValidationRule> {
    result.unwrap_err().into_iter().map(|e| e.rule).collect()
  }

  #[test]
  fn accepts_simple_service() {
    let compose = validate_compose(
      "services:\n  web1:\n    image: nginx:alpine\n    ports:\n      - 8080:80\n",
      &ctx(),
    )
    .unwrap();
    assert_eq!(compose.services.len(), 1);
  }

  #[test]
  fn rejects_invalid_yaml() {
    assert_eq!(
      rules_of(validate_compose("services: [unclosed", &ctx())),
      [ValidationRule::InvalidYaml]
    );
  }

  #[test]
  fn rejects_empty_and_missing_services() {
    assert_eq!(
      rules_of(validate_compose("services: {}\n", &ctx())),
      [ValidationRule::NoServices]
    );
    assert_eq!(
      rules_of(validate_compose("version: '3'\n", &ctx())),
      [ValidationRule::NoServices]
    );
  }

  #[test]
  fn rejects_privileged() {
    let rules = rules_of(validate_compose(
      "services:\n  bad:\n    image: x\n    privileged: true\n",
      &ctx(),
    ));
    assert_eq!(rules, [ValidationRule::Privileged]);
  }

  #[test]
  fn rejects_denylisted_capabilities() {
    let rules = rules_of(validate_compose(
      "services:\n  bad:\n    image: x\n    cap_add:\n      - SYS_ADMIN\n      - NET_BIND_SERVICE\n      - cap_net_admin\n",
      &ctx(),
    ));
    // NET_BIND_SERVICE passes, both denylisted ones surface.
    assert_eq!(
      rules,
      [ValidationRule::CapAdd, ValidationRule::CapAdd]
    );
  }

  #[test]
  fn requires_image_or_build() {
    let rules = rules_of(validate_compose(
      "services:\n  bad:\n    restart: always\n",
      &ctx(),
    ));
    assert_eq!(rules, [ValidationRule::NoImage]);

    validate_compose(
      "services:\n  ok:\n    build: ./src\n",
      &ctx(),
    )
    .unwrap();
  }

  #[test]
  fn bind_mount_policy() {
    // Named volume: fine.
    validate_compose(
      "services:\n  web1:\n    image: x\n    volumes:\n      - data:/var/lib/data\n",
      &ctx(),
    )
    .unwrap();

    // Exact app mount and subtree: fine, trailing slash too.
    validate_compose(
      "services:\n  web1:\n    image: x\n    volumes:\n      - /mnt/apps/web1/web1:/config\n      - /mnt/apps/web1/web1/sub/:/deep\n      - /mnt/models:/models\n",
      &ctx(),
    )
    .unwrap();

    // Anything else: rejected.
    for source in [
      "/etc",
      "/mnt/apps/other/web1",
      "/mnt/apps/web1/other-service",
      "/mnt/apps/web1/web1/../../../etc",
      "./relative",
      "~/home",
    ] {
      let rules = rules_of(validate_compose(
        &format!(
          "services:\n  web1:\n    image: x\n    volumes:\n      - {source}:/target\n"
        ),
        &ctx(),
      ));
      assert_eq!(
        rules,
        [ValidationRule::BindMount],
        "source {source} should be rejected"
      );
    }
  }

  #[test]
  fn returns_complete_error_set() {
    let errors = validate_compose(
      "services:\n  bad:\n    privileged: true\n    volumes:\n      - /etc:/host-etc\n",
      &ctx(),
    )
    .unwrap_err();
    let rules: Vec<_> =
      errors.iter().map(|e| e.rule).collect();
    assert!(rules.contains(&ValidationRule::Privileged));
    assert!(rules.contains(&ValidationRule::NoImage));
    assert!(rules.contains(&ValidationRule::BindMount));
    assert_eq!(errors.len(), 3);
  }
}
