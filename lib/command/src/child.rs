use std::{
  path::Path,
  process::Stdio,
  sync::{Arc, Mutex},
  time::Duration,
};

use anyhow::Context;
use nix::{
  sys::signal::{Signal, kill},
  unistd::Pid,
};
use tokio::{
  io::AsyncReadExt,
  process::{Child, Command},
  sync::mpsc,
  task::JoinHandle,
};
use tracing::debug;
use treeos_client::entities::{
  operation::Log, treeos_timestamp,
};

/// One segment of child output. Segments are terminated by either
/// `\n` or `\r` - progress-style CLIs rewrite the current line
/// with carriage returns and never emit a newline until done.
#[derive(Debug, Clone)]
pub enum OutputLine {
  Stdout(String),
  Stderr(String),
}

/// A spawned child whose output is consumed line-by-line and which
/// can be terminated early: SIGTERM first, SIGKILL after a grace
/// window.
pub struct StreamingChild {
  child: Child,
  stage: String,
  command: String,
  start_ts: i64,
  lines: mpsc::Receiver<OutputLine>,
  stdout: Arc<Mutex<String>>,
  stderr: Arc<Mutex<String>>,
  readers: Vec<JoinHandle<()>>,
}

impl StreamingChild {
  /// Spawn `sh -c <command>`, optionally from the given directory.
  pub fn spawn<'a>(
    stage: &str,
    path: impl Into<Option<&'a Path>>,
    command: impl AsRef<str>,
  ) -> anyhow::Result<StreamingChild> {
    let command = if let Some(path) = path.into() {
      format!("cd {} && {}", path.display(), command.as_ref())
    } else {
      command.as_ref().to_string()
    };

    let mut child = Command::new("sh")
      .arg("-c")
      .arg(&command)
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .spawn()
      .with_context(|| {
        format!("failed to spawn command: {command}")
      })?;

    let stdout_pipe = child
      .stdout
      .take()
      .context("failed to take child stdout")?;
    let stderr_pipe = child
      .stderr
      .take()
      .context("failed to take child stderr")?;

    // The channel is a live view only. Full output accumulates in
    // the shared buffers, so a slow consumer drops lines instead
    // of blocking the readers.
    let (tx, lines) = mpsc::channel(256);

    let stdout = Arc::new(Mutex::new(String::new()));
    let stderr = Arc::new(Mutex::new(String::new()));

    let readers = vec![
      spawn_reader(
        stdout_pipe,
        tx.clone(),
        OutputLine::Stdout,
        stdout.clone(),
      ),
      spawn_reader(
        stderr_pipe,
        tx,
        OutputLine::Stderr,
        stderr.clone(),
      ),
    ];

    Ok(StreamingChild {
      child,
      stage: stage.to_string(),
      command,
      start_ts: treeos_timestamp(),
      lines,
      stdout,
      stderr,
      readers,
    })
  }

  pub fn id(&self) -> Option<u32> {
    self.child.id()
  }

  /// Next output segment. None once both pipes are closed.
  pub async fn next_line(&mut self) -> Option<OutputLine> {
    self.lines.recv().await
  }

  /// Ask the child to exit, escalating to SIGKILL after the grace
  /// window. Safe to call after the child already exited.
  pub async fn terminate(
    &mut self,
    grace: Duration,
  ) -> anyhow::Result<()> {
    if let Some(pid) = self.child.id() {
      // SIGTERM, so well behaved runtimes can clean up.
      if let Err(e) =
        kill(Pid::from_raw(pid as i32), Signal::SIGTERM)
      {
        debug!("SIGTERM to {pid} failed | {e:?}");
      }
      if tokio::time::timeout(grace, self.child.wait())
        .await
        .is_err()
      {
        self
          .child
          .start_kill()
          .context("failed to SIGKILL child")?;
      }
    }
    Ok(())
  }

  /// Wait for exit and collect the full output into a [Log].
  pub async fn finish(mut self) -> Log {
    // Drain remaining live lines so the readers can run to eof.
    while self.lines.recv().await.is_some() {}
    for reader in self.readers {
      let _ = reader.await;
    }
    let success = match self.child.wait().await {
      Ok(status) => status.success(),
      Err(_) => false,
    };
    let stdout =
      self.stdout.lock().map(|s| s.clone()).unwrap_or_default();
    let stderr =
      self.stderr.lock().map(|s| s.clone()).unwrap_or_default();
    Log {
      stage: self.stage,
      command: self.command,
      stdout,
      stderr,
      success,
      start_ts: self.start_ts,
      end_ts: treeos_timestamp(),
    }
  }
}

fn spawn_reader(
  mut pipe: impl AsyncReadExt + Unpin + Send + 'static,
  tx: mpsc::Sender<OutputLine>,
  wrap: fn(String) -> OutputLine,
  accumulator: Arc<Mutex<String>>,
) -> JoinHandle<()> {
  tokio::spawn(async move {
    let mut buf = [0u8; 4096];
    let mut pending = Vec::new();
    loop {
      let read = match pipe.read(&mut buf).await {
        Ok(0) | Err(_) => break,
        Ok(read) => read,
      };
      if let Ok(mut accumulator) = accumulator.lock() {
        accumulator
          .push_str(&String::from_utf8_lossy(&buf[..read]));
      }
      pending.extend_from_slice(&buf[..read]);
      // Segments end on \n or \r, see [OutputLine].
      while let Some(pos) =
        pending.iter().position(|&b| b == b'\n' || b == b'\r')
      {
        let segment: Vec<u8> = pending.drain(..=pos).collect();
        let segment =
          String::from_utf8_lossy(&segment[..segment.len() - 1]);
        if !segment.trim().is_empty() {
          let _ = tx.try_send(wrap(segment.into_owned()));
        }
      }
    }
    if !pending.is_empty() {
      let segment = String::from_utf8_lossy(&pending);
      if !segment.trim().is_empty() {
        let _ = tx.try_send(wrap(segment.into_owned()));
      }
    }
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  async fn collect(mut child: StreamingChild) -> Vec<String> {
    let mut lines = Vec::new();
    while let Some(line) = child.next_line().await {
      let (OutputLine::Stdout(line)
        | OutputLine::Stderr(line)) = line;
      lines.push(line);
    }
    lines
  }

  #[tokio::test]
  async fn splits_on_newline_and_carriage_return() {
    let child = StreamingChild::spawn(
      "test",
      None,
      r"printf 'one\ntwo\rthree'",
    )
    .unwrap();
    let lines = collect(child).await;
    assert_eq!(lines, ["one", "two", "three"]);
  }

  #[tokio::test]
  async fn finish_collects_full_output() {
    let child = StreamingChild::spawn(
      "test",
      None,
      "echo out; echo err >&2",
    )
    .unwrap();
    let log = child.finish().await;
    assert!(log.success);
    assert_eq!(log.stage, "test");
    assert_eq!(log.stdout.trim(), "out");
    assert_eq!(log.stderr.trim(), "err");
  }

  #[tokio::test]
  async fn terminate_kills_a_hanging_child() {
    let mut child =
      StreamingChild::spawn("test", None, "sleep 30").unwrap();
    let started = std::time::Instant::now();
    child
      .terminate(Duration::from_millis(200))
      .await
      .unwrap();
    let log = child.finish().await;
    assert!(!log.success);
    assert!(started.elapsed() < Duration::from_secs(5));
  }

  #[tokio::test]
  async fn failed_command_reports_failure() {
    let child =
      StreamingChild::spawn("test", None, "exit 3").unwrap();
    let log = child.finish().await;
    assert!(!log.success);
  }
}
