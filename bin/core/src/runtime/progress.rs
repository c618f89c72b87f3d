//! Progress extraction from compose pull / up stderr. The CLI
//! interleaves spinner frames and ANSI cursor control with the
//! actual status lines; only the status survives here.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

/// One structured progress event from the compose stderr stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComposeEvent {
  /// Service name or layer id the line refers to.
  pub subject: String,
  /// `Pulling`, `Downloading`, `Extracting`, `Pulled`, `Created`,
  /// `Starting`, `Started`, `Error`, ...
  pub stage: String,
  /// Percent within the stage, when the line carries a byte ratio
  /// or an explicit percent.
  pub percent: Option<u8>,
}

fn ansi_re() -> &'static Regex {
  static ANSI_RE: OnceLock<Regex> = OnceLock::new();
  ANSI_RE.get_or_init(|| {
    Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]").unwrap()
  })
}

fn ratio_re() -> &'static Regex {
  static RATIO_RE: OnceLock<Regex> = OnceLock::new();
  RATIO_RE.get_or_init(|| {
    Regex::new(
      r"(?P<done>[0-9.]+)\s*(?P<unit>[kKmMgG]i?B)?/(?P<total>[0-9.]+)\s*(?P<tunit>[kKmMgG]i?B)",
    )
    .unwrap()
  })
}

fn percent_re() -> &'static Regex {
  static PERCENT_RE: OnceLock<Regex> = OnceLock::new();
  PERCENT_RE
    .get_or_init(|| Regex::new(r"([0-9]{1,3}(?:\.[0-9]+)?)%").unwrap())
}

const STAGES: &[&str] = &[
  "Pulling",
  "Pulled",
  "Waiting",
  "Downloading",
  "Download complete",
  "Verifying Checksum",
  "Extracting",
  "Pull complete",
  "Already exists",
  "Creating",
  "Created",
  "Recreating",
  "Recreated",
  "Starting",
  "Started",
  "Running",
  "Healthy",
  "Error",
];

/// Strip control sequences, spinner glyphs, and padding.
pub fn clean_line(line: &str) -> String {
  let line = ansi_re().replace_all(line, "");
  line
    .chars()
    // Braille spinner block.
    .filter(|c| !('\u{2800}'..='\u{28FF}').contains(c))
    .collect::<String>()
    .trim()
    .to_string()
}

fn unit_factor(unit: Option<&str>) -> f64 {
  match unit.map(|u| u.to_ascii_lowercase()) {
    Some(u) if u.starts_with('k') => 1e3,
    Some(u) if u.starts_with('m') => 1e6,
    Some(u) if u.starts_with('g') => 1e9,
    _ => 1.0,
  }
}

/// Parse one stderr line into a [ComposeEvent], or None for
/// noise (spinner-only frames, separators, summaries).
pub fn parse_compose_line(line: &str) -> Option<ComposeEvent> {
  let line = clean_line(line);
  if line.is_empty() {
    return None;
  }

  let stage = STAGES
    .iter()
    .find(|stage| line.contains(*stage))
    .copied()?;

  let mut words = line.split_whitespace();
  let mut subject = words.next().unwrap_or_default();
  // `Container ontree-web1-web1-1 Started` - the name matters,
  // not the resource kind.
  if matches!(
    subject,
    "Container" | "Network" | "Volume" | "Image"
  ) && let Some(name) = words.next()
  {
    subject = name;
  }
  let subject =
    subject.trim_end_matches(':').to_string();
  if subject.is_empty() || subject == stage {
    return None;
  }

  // Explicit percent wins, byte ratio second.
  let percent = percent_re()
    .captures_iter(&line)
    .last()
    .and_then(|cap| cap[1].parse::<f64>().ok())
    .or_else(|| {
      ratio_re().captures(&line).and_then(|cap| {
        let done = cap["done"].parse::<f64>().ok()?
          * unit_factor(cap.name("unit").map(|m| m.as_str()));
        let total = cap["total"].parse::<f64>().ok()?
          * unit_factor(Some(&cap["tunit"]));
        if total > 0.0 {
          Some(done / total * 100.0)
        } else {
          None
        }
      })
    })
    .map(|percent| percent.clamp(0.0, 100.0) as u8);

  Some(ComposeEvent {
    subject,
    stage: stage.to_string(),
    percent,
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_layer_download_ratio() {
    let event = parse_compose_line(
      " a1b2c3d4: Downloading [==========>     ]  51.2MB/102.4MB",
    )
    .unwrap();
    assert_eq!(event.subject, "a1b2c3d4");
    assert_eq!(event.stage, "Downloading");
    assert_eq!(event.percent, Some(50));
  }

  #[test]
  fn parses_service_events() {
    let event =
      parse_compose_line(" web1 Pulled ").unwrap();
    assert_eq!(event.subject, "web1");
    assert_eq!(event.stage, "Pulled");
    assert_eq!(event.percent, None);

    let event =
      parse_compose_line("Container ontree-web1-web1-1  Started")
        .unwrap();
    assert_eq!(event.subject, "ontree-web1-web1-1");
    assert_eq!(event.stage, "Started");
  }

  #[test]
  fn ignores_spinner_and_ansi_noise() {
    assert_eq!(parse_compose_line("⠸ ⠼ ⠴"), None);
    assert_eq!(parse_compose_line("\x1b[2K\x1b[1A"), None);
    assert_eq!(parse_compose_line(""), None);

    // ANSI wrapping a real line still parses.
    let event = parse_compose_line(
      "\x1b[2K⠙ web1 Pulling \x1b[0m",
    )
    .unwrap();
    assert_eq!(event.subject, "web1");
    assert_eq!(event.stage, "Pulling");
  }

  #[test]
  fn explicit_percent_beats_ratio() {
    let event = parse_compose_line(
      "layer9 Extracting  12.3MB/41.0MB 88%",
    )
    .unwrap();
    assert_eq!(event.percent, Some(88));
  }
}
