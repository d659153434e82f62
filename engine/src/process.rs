//! Child-process plumbing shared by both protocols.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::EngineError;

/// A running engine executable with a line-oriented stdin.
pub struct EngineProcess {
    child: Child,
    stdin: ChildStdin,
    label: String,
}

impl EngineProcess {
    /// Spawn `path` with piped stdin/stdout. stderr is discarded.
    pub fn spawn(path: &Path) -> Result<(Self, ChildStdout), EngineError> {
        let label = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        tracing::debug!("Spawning engine process {:?}", path);
        let mut child = Command::new(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| {
                tracing::error!("Failed to spawn {:?}: {}", path, source);
                EngineError::Spawn {
                    path: path.display().to_string(),
                    source,
                }
            })?;

        let stdin = child.stdin.take().ok_or(EngineError::NoStdin)?;
        let stdout = child.stdout.take().ok_or(EngineError::NoStdout)?;

        Ok((
            Self {
                child,
                stdin,
                label,
            },
            stdout,
        ))
    }

    /// Executable file name without extension.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Write one newline-terminated command and flush.
    pub async fn send(&mut self, command: &str) -> Result<(), EngineError> {
        tracing::trace!("[{}] >> {}", self.label, command);
        self.stdin.write_all(command.as_bytes()).await?;
        self.stdin.write_all(b"\n").await?;
        self.stdin.flush().await?;
        Ok(())
    }

    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Whether the process exits within `wait`.
    ///
    /// Unlike [`is_alive`](Self::is_alive) this does not lose the race
    /// between a child closing its stdout and becoming reapable.
    pub async fn exited_within(&mut self, wait: Duration) -> bool {
        match tokio::time::timeout(wait, self.child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!("[{}] exited with {}", self.label, status);
                true
            }
            Ok(Err(e)) => {
                tracing::warn!("[{}] wait failed: {}", self.label, e);
                true
            }
            Err(_) => false,
        }
    }

    /// Send `quit_command`, wait up to `grace` for a clean exit, then kill.
    pub async fn shutdown(&mut self, quit_command: &str, grace: Duration) {
        if !self.is_alive() {
            return;
        }
        if let Err(e) = self.send(quit_command).await {
            tracing::debug!("[{}] quit not delivered: {}", self.label, e);
        }
        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => tracing::debug!("[{}] exited with {}", self.label, status),
            Ok(Err(e)) => tracing::warn!("[{}] wait failed: {}", self.label, e),
            Err(_) => {
                tracing::warn!("[{}] did not exit within {:?}, killing", self.label, grace);
                self.kill().await;
            }
        }
    }

    pub async fn kill(&mut self) {
        if let Err(e) = self.child.kill().await {
            tracing::debug!("[{}] kill failed: {}", self.label, e);
        }
    }
}

/// Drain `stdout` line by line for the lifetime of the process.
///
/// Blank lines are skipped; the task ends at EOF or on a read error.
pub fn spawn_line_reader<F>(stdout: ChildStdout, label: String, mut on_line: F) -> JoinHandle<()>
where
    F: FnMut(&str) + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(stdout);
        let mut line = String::new();

        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) => {
                    tracing::debug!("[{}] stdout EOF", label);
                    break;
                }
                Ok(_) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    tracing::trace!("[{}] << {}", label, trimmed);
                    on_line(trimmed);
                }
                Err(e) => {
                    tracing::warn!("[{}] error reading stdout: {}", label, e);
                    break;
                }
            }
        }
    })
}

/// Reader that forwards every line into a channel.
pub fn spawn_line_channel(
    stdout: ChildStdout,
    label: String,
) -> (mpsc::UnboundedReceiver<String>, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = spawn_line_reader(stdout, label, move |line| {
        let _ = tx.send(line.to_string());
    });
    (rx, handle)
}
