//! Fake engines and event helpers shared by the manager tests.
#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bridge::{BridgeConfig, WorkerEvent};
use engine::{LegacyTimings, SessionTimeouts};
use tempfile::TempDir;
use tokio::sync::broadcast;

const EVENT_WAIT: Duration = Duration::from_secs(10);

pub fn write_script(dir: &TempDir, name: &str, body: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, format!("#!/bin/sh\n{}", body)).unwrap();
    let mut perms = fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).unwrap();
    path
}

pub fn received(log: &Path) -> Vec<String> {
    fs::read_to_string(log)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

/// Short timeouts, no legacy pacing, registry inside `dir`.
pub fn test_config(dir: &TempDir) -> BridgeConfig {
    BridgeConfig {
        stop_timeout: Duration::from_secs(3),
        join_timeout: Duration::from_secs(2),
        session: SessionTimeouts {
            init: Duration::from_secs(5),
            quit_grace: Duration::from_millis(500),
            move_slack: Duration::from_millis(300),
            stop_grace: Duration::from_millis(300),
        },
        legacy: LegacyTimings::immediate(),
        engines_file: dir.path().join("engines.json"),
        ..BridgeConfig::default()
    }
}

/// A UCI engine named `id` that answers `go` with two ranked lines.
pub fn modern_engine(dir: &TempDir, file: &str, id: &str, log: &Path) -> PathBuf {
    let body = format!(
        r#"while read -r line; do
  echo "$line" >> "{log}"
  case "$line" in
    uci) echo "id name {id}"; echo "uciok" ;;
    isready) echo "readyok" ;;
    go*)
      echo "info depth 2 score cp 25 multipv 1 pv e2e4 e7e5"
      echo "info depth 2 score cp 12 multipv 2 pv d2d4 d7d5"
      echo "bestmove e2e4" ;;
    quit) exit 0 ;;
  esac
done
"#,
        log = log.display(),
        id = id
    );
    write_script(dir, file, &body)
}

/// A UCI engine that handshakes and then never answers a search.
pub fn silent_engine(dir: &TempDir) -> PathBuf {
    write_script(
        dir,
        "silent",
        r#"while read -r line; do
  case "$line" in
    uci) echo "id name Silent"; echo "uciok" ;;
    isready) echo "readyok" ;;
    quit) exit 0 ;;
  esac
done
"#,
    )
}

/// A UCI engine that keeps searching until told to `stop`.
pub fn stubborn_engine(dir: &TempDir, log: &Path) -> PathBuf {
    let body = format!(
        r#"while read -r line; do
  echo "$line" >> "{log}"
  case "$line" in
    uci) echo "id name Stubborn"; echo "uciok" ;;
    isready) echo "readyok" ;;
    go*) echo "info depth 3 score cp 5 pv g1f3" ;;
    stop) echo "bestmove g1f3" ;;
    quit) exit 0 ;;
  esac
done
"#,
        log = log.display()
    );
    write_script(dir, "stubborn", &body)
}

/// A WinBoard engine that answers every `go` with `move {reply}`.
pub fn legacy_engine(dir: &TempDir, reply: &str) -> PathBuf {
    let body = format!(
        r#"while read -r line; do
  case "$line" in
    "protover 2") echo "feature myname=\"OldKing\" done=1" ;;
    go) echo "2 -30 5 400 {reply}"; echo "move {reply}" ;;
    quit) exit 0 ;;
  esac
done
"#,
        reply = reply
    );
    write_script(dir, "oldking", &body)
}

/// Next event, failing the test if none arrives in time.
pub async fn next_event(rx: &mut broadcast::Receiver<WorkerEvent>) -> WorkerEvent {
    tokio::time::timeout(EVENT_WAIT, rx.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event channel closed")
}

/// Skip events until one matches, returning everything seen on the way.
pub async fn wait_for<F>(rx: &mut broadcast::Receiver<WorkerEvent>, mut pred: F) -> Vec<WorkerEvent>
where
    F: FnMut(&WorkerEvent) -> bool,
{
    let mut seen = Vec::new();
    loop {
        let event = next_event(rx).await;
        let done = pred(&event);
        seen.push(event);
        if done {
            return seen;
        }
    }
}

/// Everything already queued, without waiting for more.
pub fn drain(rx: &mut broadcast::Receiver<WorkerEvent>) -> Vec<WorkerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
