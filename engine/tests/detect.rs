#![cfg(unix)]

mod common;

use std::time::Duration;

use engine::{detect_protocol, DetectedProtocol, LegacyTimings, Protocol};
use tempfile::TempDir;

use common::*;

const DETECT_TIMEOUT: Duration = Duration::from_secs(2);

#[tokio::test]
async fn test_modern_engine_never_sees_legacy_handshake() {
    let dir = TempDir::new().unwrap();
    let log = dir.path().join("received.log");
    let path = modern_engine(&dir, &log);

    let started = tokio::time::Instant::now();
    let detected = detect_protocol(&path, DETECT_TIMEOUT).await;

    assert_eq!(detected, DetectedProtocol::Modern);
    assert_eq!(detected.protocol(), Some(Protocol::Modern));
    assert!(started.elapsed() < DETECT_TIMEOUT);
    let sent = received(&log);
    assert!(!sent.iter().any(|l| l == "xboard" || l == "protover 2"));
}

#[tokio::test]
async fn test_legacy_engine_with_features() {
    let dir = TempDir::new().unwrap();
    let path = write_script(
        &dir,
        "modern-xboard",
        r#"while read -r line; do
  case "$line" in
    uci) echo "Error (unknown command): uci" ;;
    "protover 2") echo "feature myname=\"Modern XB\" setboard=1 done=1" ;;
    quit) exit 0 ;;
  esac
done
"#,
    );

    let started = tokio::time::Instant::now();
    assert_eq!(
        detect_protocol(&path, DETECT_TIMEOUT).await,
        DetectedProtocol::Legacy
    );
    // protover 2 is held back until the engine has had time to digest xboard.
    assert!(started.elapsed() >= LegacyTimings::default().after_xboard);
}

#[tokio::test]
async fn test_legacy_engine_without_protover_support() {
    let dir = TempDir::new().unwrap();
    let log = dir.path().join("received.log");
    let path = legacy_engine(&dir, &log, "e7e5");

    assert_eq!(
        detect_protocol(&path, DETECT_TIMEOUT).await,
        DetectedProtocol::Legacy
    );
    assert!(received(&log).contains(&"new".to_string()));
}

#[tokio::test]
async fn test_program_rejecting_everything_is_unknown() {
    let dir = TempDir::new().unwrap();
    let path = write_script(
        &dir,
        "grumpy",
        r#"while read -r line; do
  echo "Error (unknown command): $line"
done
"#,
    );

    assert_eq!(
        detect_protocol(&path, DETECT_TIMEOUT).await,
        DetectedProtocol::Unknown
    );
}

#[tokio::test]
async fn test_exiting_program_is_unknown() {
    let dir = TempDir::new().unwrap();
    let path = write_script(&dir, "quitter", "exit 0\n");

    assert_eq!(
        detect_protocol(&path, DETECT_TIMEOUT).await,
        DetectedProtocol::Unknown
    );
}

#[tokio::test]
async fn test_exiting_program_is_never_legacy() {
    let dir = TempDir::new().unwrap();
    let path = write_script(&dir, "quitter", "exit 0\n");

    for attempt in 0..20 {
        assert_eq!(
            detect_protocol(&path, DETECT_TIMEOUT).await,
            DetectedProtocol::Unknown,
            "attempt {}",
            attempt
        );
    }
}

#[tokio::test]
async fn test_program_dying_after_protover_is_unknown() {
    let dir = TempDir::new().unwrap();
    let path = write_script(
        &dir,
        "fragile",
        r#"while read -r line; do
  case "$line" in
    uci) echo "Error (unknown command): uci" ;;
    "protover 2") exit 0 ;;
  esac
done
"#,
    );

    assert_eq!(
        detect_protocol(&path, DETECT_TIMEOUT).await,
        DetectedProtocol::Unknown
    );
}

#[tokio::test]
async fn test_missing_executable_is_unknown() {
    let dir = TempDir::new().unwrap();
    assert_eq!(
        detect_protocol(&dir.path().join("nope"), DETECT_TIMEOUT).await,
        DetectedProtocol::Unknown
    );
}
