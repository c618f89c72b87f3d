use treeos_client::entities::app::{
  COMPOSE_PROJECT_NAME_KEY, COMPOSE_SEPARATOR,
  COMPOSE_SEPARATOR_KEY,
};

/// Parse `KEY=VALUE` lines in order. Comments and blanks are
/// dropped, unknown keys are preserved - the engine only requires
/// the two compose keys and round-trips the rest untouched.
pub fn parse_env(contents: &str) -> Vec<(String, String)> {
  contents
    .lines()
    .filter_map(|line| {
      let line = line.trim();
      if line.is_empty() || line.starts_with('#') {
        return None;
      }
      let (key, value) = line.split_once('=')?;
      Some((key.trim().to_string(), value.trim().to_string()))
    })
    .collect()
}

pub fn project_name_from_env(contents: &str) -> Option<String> {
  parse_env(contents)
    .into_iter()
    .find(|(key, _)| key == COMPOSE_PROJECT_NAME_KEY)
    .map(|(_, value)| value)
}

/// The minimal `.env` the engine writes for a new app.
pub fn render_env(prefix: &str, app_id: &str) -> String {
  format!(
    "{COMPOSE_PROJECT_NAME_KEY}={prefix}-{app_id}\n\
     {COMPOSE_SEPARATOR_KEY}={COMPOSE_SEPARATOR}\n"
  )
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_and_preserves_extra_keys() {
    let contents = "\
# project env
COMPOSE_PROJECT_NAME=ontree-web1
COMPOSE_SEPARATOR=-

EXTRA_KEY=some value
";
    let pairs = parse_env(contents);
    assert_eq!(pairs.len(), 3);
    assert_eq!(
      pairs[2],
      ("EXTRA_KEY".to_string(), "some value".to_string())
    );
    assert_eq!(
      project_name_from_env(contents).as_deref(),
      Some("ontree-web1")
    );
  }

  #[test]
  fn rendered_env_parses_back() {
    let contents = render_env("ontree", "web1");
    assert_eq!(
      project_name_from_env(&contents).as_deref(),
      Some("ontree-web1")
    );
    let pairs = parse_env(&contents);
    assert_eq!(pairs[1].1, "-");
  }
}
