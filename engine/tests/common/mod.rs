//! Fake engine executables written as POSIX shell scripts.
#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use engine::SessionTimeouts;
use tempfile::TempDir;

/// Write an executable `#!/bin/sh` script into `dir`.
pub fn write_script(dir: &TempDir, name: &str, body: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, format!("#!/bin/sh\n{}", body)).unwrap();
    let mut perms = fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).unwrap();
    path
}

/// Everything the script received, one command per line.
pub fn received(log: &Path) -> Vec<String> {
    fs::read_to_string(log)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

pub fn fast_timeouts() -> SessionTimeouts {
    SessionTimeouts {
        init: Duration::from_secs(5),
        quit_grace: Duration::from_millis(500),
        move_slack: Duration::from_secs(2),
        stop_grace: Duration::from_secs(1),
    }
}

/// A UCI engine that answers every `go` with two ranked lines and `bestmove`.
pub fn modern_engine(dir: &TempDir, log: &Path) -> PathBuf {
    let body = format!(
        r#"while read -r line; do
  echo "$line" >> "{log}"
  case "$line" in
    uci) echo "id name FakeFish 1.0"; echo "id author Nobody"; echo "uciok" ;;
    isready) echo "readyok" ;;
    go*)
      echo "info depth 1 seldepth 2 score cp 20 nodes 100 nps 1000 time 5 multipv 1 pv e2e4 e7e5"
      echo "info depth 1 score cp 10 multipv 2 pv d2d4 d7d5"
      echo "info string thinking hard"
      echo "bestmove e2e4 ponder e7e5" ;;
    quit) exit 0 ;;
  esac
done
"#,
        log = log.display()
    );
    write_script(dir, "fakefish", &body)
}

/// A UCI engine that only answers `go` once told to `stop`.
pub fn stubborn_engine(dir: &TempDir) -> PathBuf {
    write_script(
        dir,
        "stubborn",
        r#"while read -r line; do
  case "$line" in
    uci) echo "uciok" ;;
    isready) echo "readyok" ;;
    go*) echo "info depth 3 score cp 5 pv g1f3" ;;
    stop) echo "bestmove g1f3" ;;
    quit) exit 0 ;;
  esac
done
"#,
    )
}

/// A WinBoard engine without protover 2 support that replies `move e7e5`.
pub fn legacy_engine(dir: &TempDir, log: &Path, reply: &str) -> PathBuf {
    let body = format!(
        r#"while read -r line; do
  echo "$line" >> "{log}"
  case "$line" in
    uci) echo "Error (unknown command): uci" ;;
    "protover 2") echo "Error (unknown command): protover" ;;
    go)
      echo "3 15 10 1200 {reply} g1f3"
      echo "4 bogus"
      echo "move {reply}" ;;
    quit) exit 0 ;;
  esac
done
"#,
        log = log.display(),
        reply = reply
    );
    write_script(dir, "oldking", &body)
}

/// A WinBoard engine that thinks until told `?`, then answers with a bare
/// coordinate move and no `move` prefix.
pub fn slow_legacy_engine(dir: &TempDir, log: &Path, reply: &str) -> PathBuf {
    let body = format!(
        r#"while read -r line; do
  echo "$line" >> "{log}"
  case "$line" in
    "protover 2") echo "Error (unknown command): protover" ;;
    go) echo "5 20 30 4000 {reply}" ;;
    "?") echo "{reply}" ;;
    quit) exit 0 ;;
  esac
done
"#,
        log = log.display(),
        reply = reply
    );
    write_script(dir, "slowking", &body)
}
