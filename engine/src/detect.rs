//! Protocol auto-detection for unknown engine executables.

use std::path::Path;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{self, Instant};

use crate::process::{spawn_line_channel, EngineProcess};
use crate::xboard::LegacyTimings;
use crate::Protocol;

/// How long a legacy engine gets to declare `feature`s after `protover 2`.
const FEATURE_WAIT: Duration = Duration::from_secs(1);
/// How long the follow-up `new` has to provoke an error.
const FALLBACK_WAIT: Duration = Duration::from_millis(300);
/// How long a heuristic match must stay alive before it counts.
const LIVENESS_WAIT: Duration = Duration::from_millis(100);

/// Outcome of probing an executable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectedProtocol {
    Modern,
    Legacy,
    Unknown,
}

impl DetectedProtocol {
    pub fn protocol(self) -> Option<Protocol> {
        match self {
            DetectedProtocol::Modern => Some(Protocol::Modern),
            DetectedProtocol::Legacy => Some(Protocol::Legacy),
            DetectedProtocol::Unknown => None,
        }
    }
}

impl std::fmt::Display for DetectedProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DetectedProtocol::Modern => write!(f, "UCI"),
            DetectedProtocol::Legacy => write!(f, "WinBoard"),
            DetectedProtocol::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Talk to `path` and classify the protocol it speaks.
///
/// The modern handshake is tried first in its own process; only if that
/// fails is a second process started for the legacy handshake. Trial
/// processes are always killed before returning, and failures of any kind
/// come back as [`DetectedProtocol::Unknown`].
#[tracing::instrument(level = "info")]
pub async fn detect_protocol(path: &Path, timeout: Duration) -> DetectedProtocol {
    match try_modern(path, timeout).await {
        Handshake::Matched => return DetectedProtocol::Modern,
        Handshake::SpawnFailed => return DetectedProtocol::Unknown,
        Handshake::NoMatch => {}
    }

    match try_legacy(path, timeout).await {
        Handshake::Matched => DetectedProtocol::Legacy,
        Handshake::SpawnFailed | Handshake::NoMatch => {
            tracing::info!("Could not identify protocol of {:?}", path);
            DetectedProtocol::Unknown
        }
    }
}

enum Handshake {
    Matched,
    NoMatch,
    SpawnFailed,
}

enum Recv {
    Line(String),
    Closed,
    TimedOut,
}

async fn recv_until(lines: &mut mpsc::UnboundedReceiver<String>, deadline: Instant) -> Recv {
    match time::timeout_at(deadline, lines.recv()).await {
        Ok(Some(line)) => Recv::Line(line),
        Ok(None) => Recv::Closed,
        Err(_) => Recv::TimedOut,
    }
}

fn is_rejection(line: &str) -> bool {
    let lower = line.to_ascii_lowercase();
    lower.starts_with("error") || lower.starts_with("illegal") || lower.contains("unknown command")
}

async fn try_modern(path: &Path, timeout: Duration) -> Handshake {
    let (mut process, stdout) = match EngineProcess::spawn(path) {
        Ok(spawned) => spawned,
        Err(e) => {
            tracing::warn!("Detection spawn failed: {}", e);
            return Handshake::SpawnFailed;
        }
    };
    let (mut lines, reader) = spawn_line_channel(stdout, process.label().to_string());

    let mut result = Handshake::NoMatch;
    if process.send("uci").await.is_ok() {
        let deadline = Instant::now() + timeout;
        while let Recv::Line(line) = recv_until(&mut lines, deadline).await {
            if line == "uciok" {
                result = Handshake::Matched;
                break;
            }
            if is_rejection(&line) {
                tracing::debug!("Modern handshake rejected: {}", line);
                break;
            }
        }
    }

    process.kill().await;
    reader.abort();
    result
}

async fn try_legacy(path: &Path, timeout: Duration) -> Handshake {
    let (mut process, stdout) = match EngineProcess::spawn(path) {
        Ok(spawned) => spawned,
        Err(_) => return Handshake::SpawnFailed,
    };
    let (mut lines, reader) = spawn_line_channel(stdout, process.label().to_string());

    let result = legacy_handshake(&mut process, &mut lines, timeout).await;

    process.kill().await;
    reader.abort();
    result
}

async fn legacy_handshake(
    process: &mut EngineProcess,
    lines: &mut mpsc::UnboundedReceiver<String>,
    timeout: Duration,
) -> Handshake {
    if process.send("xboard").await.is_err() {
        return Handshake::NoMatch;
    }
    // Old engines drop input that arrives right after `xboard`.
    time::sleep(LegacyTimings::default().after_xboard).await;
    if process.send("protover 2").await.is_err() {
        return Handshake::NoMatch;
    }

    let deadline = Instant::now() + FEATURE_WAIT.min(timeout);
    loop {
        match recv_until(lines, deadline).await {
            Recv::Line(line) if line.starts_with("feature") => return Handshake::Matched,
            Recv::Line(_) => {}
            Recv::Closed => return closed(process),
            Recv::TimedOut => break,
        }
    }

    // Heuristic: some old engines silently ignore protover. Treat an engine
    // that stays alive and accepts `new` without complaint as legacy.
    if process.send("new").await.is_err() {
        return Handshake::NoMatch;
    }
    let deadline = Instant::now() + FALLBACK_WAIT;
    loop {
        match recv_until(lines, deadline).await {
            Recv::Line(line) => {
                let lower = line.to_ascii_lowercase();
                if is_rejection(&line) && !lower.contains("protover") {
                    tracing::debug!("Legacy follow-up rejected: {}", line);
                    return Handshake::NoMatch;
                }
            }
            Recv::Closed => return closed(process),
            Recv::TimedOut => break,
        }
    }
    if process.exited_within(LIVENESS_WAIT).await {
        tracing::debug!("{} exited during the legacy handshake", process.label());
        return Handshake::NoMatch;
    }

    tracing::warn!(
        "Classifying {} as WinBoard without a feature reply (heuristic)",
        process.label()
    );
    Handshake::Matched
}

fn closed(process: &EngineProcess) -> Handshake {
    tracing::debug!("{} closed stdout during the legacy handshake", process.label());
    Handshake::NoMatch
}
