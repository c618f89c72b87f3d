//! # Treeos Config
//!
//! Parses the core config from one or more TOML files. Paths
//! coming later in the list override configuration in earlier
//! paths, with nested tables merged rather than replaced.

use std::path::Path;

use colored::Colorize;
use serde::de::DeserializeOwned;

mod error;
mod merge;

pub use error::Error;
pub use merge::merge_config;

pub type Result<T> = ::core::result::Result<T, Error>;

/// Set the configuration for loading config files.
pub struct ConfigLoader<'outer, 'inner> {
  /// Paths to config files to include in the final configuration.
  ///
  /// Paths coming later in the array (higher index) will override
  /// configuration in earlier paths.
  pub paths: &'outer [&'inner Path],
  /// Print some extra information on configuration load.
  ///
  /// Note. This is different than application level log level.
  pub debug_print: bool,
}

impl ConfigLoader<'_, '_> {
  pub fn load<T: DeserializeOwned>(self) -> Result<T> {
    let ConfigLoader { paths, debug_print } = self;
    let mut merged: Option<toml::Value> = None;
    for &path in paths {
      if !path.is_file() {
        if debug_print {
          println!(
            "{}: {}: {path:?}",
            "DEBUG".cyan(),
            "Skipping missing config path".dimmed()
          );
        }
        continue;
      }
      let contents = std::fs::read_to_string(path)
        .map_err(|e| Error::ReadFile(path.to_path_buf(), e))?;
      let value = toml::from_str::<toml::Value>(&contents)
        .map_err(|e| Error::ParseToml(path.to_path_buf(), e))?;
      if debug_print {
        println!(
          "{}: {}: {path:?}",
          "DEBUG".cyan(),
          "Loaded config file".dimmed()
        );
      }
      merged = Some(match merged {
        Some(base) => merge_config(base, value),
        None => value,
      });
    }
    let merged = merged.ok_or(Error::NoConfigFiles)?;
    merged.try_into().map_err(Error::Deserialize)
  }
}
