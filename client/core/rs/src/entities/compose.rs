use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Typed view of a compose document, as far as validation and
/// service enumeration need it. Unknown keys pass through the
/// parse untouched (the raw file on disk stays authoritative).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComposeFile {
  #[serde(default)]
  pub services: IndexMap<String, ComposeService>,
  /// Top level named volume declarations.
  #[serde(default)]
  pub volumes: IndexMap<String, serde_yaml_ng::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComposeService {
  #[serde(default)]
  pub image: Option<String>,
  #[serde(default)]
  pub build: Option<serde_yaml_ng::Value>,
  #[serde(default)]
  pub container_name: Option<String>,
  #[serde(default)]
  pub privileged: bool,
  #[serde(default)]
  pub cap_add: Vec<String>,
  #[serde(default)]
  pub volumes: Vec<ComposeVolume>,
}

/// A service volume in either compose syntax.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ComposeVolume {
  /// `source:target[:mode]`
  Short(String),
  Long(ComposeVolumeLong),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComposeVolumeLong {
  #[serde(default, rename = "type")]
  pub volume_type: Option<String>,
  #[serde(default)]
  pub source: Option<String>,
  #[serde(default)]
  pub target: Option<String>,
}

impl ComposeVolume {
  /// The host-side source of the mount, if one is declared.
  /// A bare `container_path` spec declares an anonymous volume
  /// and has no source.
  ///
  /// Splitting on ':' breaks on windows drive letters, but the
  /// orchestrator only ever manages linux hosts.
  pub fn source(&self) -> Option<&str> {
    match self {
      ComposeVolume::Short(spec) => spec
        .split_once(':')
        .map(|(source, _)| source)
        .filter(|source| !source.is_empty()),
      ComposeVolume::Long(long) => long.source.as_deref(),
    }
  }

  /// Named and anonymous volumes have no path-like source.
  pub fn is_named_volume(&self) -> bool {
    match self {
      ComposeVolume::Short(_) => match self.source() {
        Some(source) => {
          !source.starts_with('/')
            && !source.starts_with('.')
            && !source.starts_with('~')
        }
        None => true,
      },
      ComposeVolume::Long(long) => {
        matches!(long.volume_type.as_deref(), Some("volume"))
          || (long.volume_type.is_none()
            && !long
              .source
              .as_deref()
              .unwrap_or_default()
              .starts_with('/'))
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_service_fields() {
    let file: ComposeFile = serde_yaml_ng::from_str(
      r#"
services:
  web:
    image: nginx:alpine
    ports:
      - 8080:80
    volumes:
      - data:/var/lib/nginx
      - /mnt/apps/web1/web:/config
"#,
    )
    .unwrap();
    let web = &file.services["web"];
    assert_eq!(web.image.as_deref(), Some("nginx:alpine"));
    assert_eq!(web.volumes.len(), 2);
    assert!(web.volumes[0].is_named_volume());
    assert!(!web.volumes[1].is_named_volume());
    assert_eq!(
      web.volumes[1].source(),
      Some("/mnt/apps/web1/web")
    );
  }

  #[test]
  fn anonymous_volume_has_no_source() {
    let vol = ComposeVolume::Short(String::from("/var/cache"));
    assert_eq!(vol.source(), None);
    assert!(vol.is_named_volume());
  }

  #[test]
  fn parses_long_volume_syntax() {
    let file: ComposeFile = serde_yaml_ng::from_str(
      r#"
services:
  db:
    image: postgres:16
    volumes:
      - type: bind
        source: /etc
        target: /host-etc
"#,
    )
    .unwrap();
    let vol = &file.services["db"].volumes[0];
    assert!(!vol.is_named_volume());
    assert_eq!(vol.source(), Some("/etc"));
  }
}
