use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
  #[error("none of the given config paths exist")]
  NoConfigFiles,
  #[error("failed to read config file at {0:?}")]
  ReadFile(PathBuf, #[source] std::io::Error),
  #[error("failed to parse toml at {0:?}")]
  ParseToml(PathBuf, #[source] toml::de::Error),
  #[error("failed to deserialize merged config")]
  Deserialize(#[source] toml::de::Error),
}
