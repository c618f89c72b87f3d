/// Merge two parsed config files. `overrides` wins at every leaf;
/// nested tables are merged key-by-key rather than replaced.
pub fn merge_config(
  base: toml::Value,
  overrides: toml::Value,
) -> toml::Value {
  match (base, overrides) {
    (toml::Value::Table(mut base), toml::Value::Table(overrides)) => {
      for (key, value) in overrides {
        match base.remove(&key) {
          Some(existing) => {
            base.insert(key, merge_config(existing, value));
          }
          None => {
            base.insert(key, value);
          }
        }
      }
      toml::Value::Table(base)
    }
    (_, overrides) => overrides,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn parse(s: &str) -> toml::Value {
    toml::from_str(s).unwrap()
  }

  #[test]
  fn later_file_wins_at_leaves() {
    let merged = merge_config(
      parse("worker_pool_size = 2\nfixed_prefix = 'ontree'"),
      parse("worker_pool_size = 4"),
    );
    let table = merged.as_table().unwrap();
    assert_eq!(
      table["worker_pool_size"].as_integer().unwrap(),
      4
    );
    assert_eq!(
      table["fixed_prefix"].as_str().unwrap(),
      "ontree"
    );
  }

  #[test]
  fn nested_tables_merge() {
    let merged = merge_config(
      parse("[logging]\nlevel = 'debug'\npretty = true"),
      parse("[logging]\nlevel = 'info'"),
    );
    let logging = merged.as_table().unwrap()["logging"]
      .as_table()
      .unwrap();
    assert_eq!(logging["level"].as_str().unwrap(), "info");
    assert!(logging["pretty"].as_bool().unwrap());
  }
}
