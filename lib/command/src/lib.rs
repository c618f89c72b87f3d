use std::path::Path;

use run_command::{CommandOutput, async_run_command};
use treeos_client::entities::{
  operation::Log, treeos_timestamp,
};

mod child;

pub use child::{OutputLine, StreamingChild};

/// Run a command to completion and capture the output into a
/// [Log]. If a path is given, the command runs from there.
pub async fn run_treeos_command(
  stage: &str,
  path: impl Into<Option<&Path>>,
  command: impl AsRef<str>,
) -> Log {
  let command = if let Some(path) = path.into() {
    format!("cd {} && {}", path.display(), command.as_ref())
  } else {
    command.as_ref().to_string()
  };
  let start_ts = treeos_timestamp();
  let output = async_run_command(&command).await;
  output_into_log(stage, command, start_ts, output)
}

pub fn output_into_log(
  stage: &str,
  command: String,
  start_ts: i64,
  output: CommandOutput,
) -> Log {
  let success = output.success();
  Log {
    stage: stage.to_string(),
    stdout: output.stdout,
    stderr: output.stderr,
    command,
    success,
    start_ts,
    end_ts: treeos_timestamp(),
  }
}
