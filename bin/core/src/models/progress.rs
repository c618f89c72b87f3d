//! Progress parsing for the model CLI. `ollama pull` rewrites a
//! single line with carriage returns, ANSI cursor control, and a
//! Braille spinner; the useful signal is a phase keyword and an
//! occasional trailing percent.

use std::sync::OnceLock;

use regex::Regex;

use crate::runtime::progress::clean_line;

#[derive(Debug, Clone, PartialEq)]
pub struct PullUpdate {
  /// Overall percent for the job.
  pub percent: i64,
  /// Cleaned status line for the record / broadcast.
  pub message: String,
}

fn percent_re() -> &'static Regex {
  static PERCENT_RE: OnceLock<Regex> = OnceLock::new();
  PERCENT_RE
    .get_or_init(|| Regex::new(r"([0-9]{1,3})%").unwrap())
}

/// Map one stderr segment to a progress update, or None for pure
/// noise. Phase keywords pin fixed percentages; an explicit
/// trailing percent (the blob download) wins when present.
pub fn parse_pull_line(line: &str) -> Option<PullUpdate> {
  let line = clean_line(line);
  if line.is_empty() {
    return None;
  }
  let lower = line.to_lowercase();

  let percent = if lower.contains("success") {
    100
  } else if lower.contains("writing manifest") {
    98
  } else if lower.contains("verifying sha256 digest") {
    95
  } else if let Some(percent) = percent_re()
    .captures_iter(&line)
    .last()
    .and_then(|cap| cap[1].parse::<i64>().ok())
  {
    percent.clamp(0, 100)
  } else if lower.contains("pulling manifest") {
    5
  } else if lower.starts_with("pulling") {
    10
  } else {
    return None;
  };

  Some(PullUpdate {
    percent,
    message: line,
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn maps_phases_to_fixed_percentages() {
    assert_eq!(
      parse_pull_line("pulling manifest").unwrap().percent,
      5
    );
    assert_eq!(
      parse_pull_line("pulling dde5aa3fc5ff...")
        .unwrap()
        .percent,
      10
    );
    assert_eq!(
      parse_pull_line("verifying sha256 digest")
        .unwrap()
        .percent,
      95
    );
    assert_eq!(
      parse_pull_line("writing manifest").unwrap().percent,
      98
    );
    assert_eq!(
      parse_pull_line("success").unwrap().percent,
      100
    );
  }

  #[test]
  fn extracts_trailing_percent() {
    let update = parse_pull_line(
      "pulling dde5aa3fc5ff...  45% ▕███       ▏ 900 MB/2.0 GB",
    )
    .unwrap();
    assert_eq!(update.percent, 45);

    // Multiple percent tokens: the last one wins.
    let update =
      parse_pull_line("pulling 5% done, now at 72%").unwrap();
    assert_eq!(update.percent, 72);
  }

  #[test]
  fn drops_spinner_and_ansi_noise() {
    assert_eq!(parse_pull_line("⠋⠙⠹⠸⠼"), None);
    assert_eq!(parse_pull_line("\x1b[?25l\x1b[2K"), None);
    assert_eq!(parse_pull_line(""), None);
    // Unknown chatter is not progress.
    assert_eq!(parse_pull_line("some other output"), None);
  }

  #[test]
  fn spinner_wrapped_phase_still_parses() {
    let update =
      parse_pull_line("\x1b[2K⠙ pulling manifest ").unwrap();
    assert_eq!(update.percent, 5);
    assert_eq!(update.message, "pulling manifest");
  }
}
