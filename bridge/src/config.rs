//! Runtime configuration for workers and managers.
//!
//! Every value has a built-in default and can be overridden through an
//! `ENGINEBRIDGE_*` environment variable:
//!
//! | variable                          | default               |
//! |-----------------------------------|-----------------------|
//! | `ENGINEBRIDGE_DETECT_TIMEOUT_MS`  | 3000                  |
//! | `ENGINEBRIDGE_STOP_TIMEOUT_MS`    | 2000                  |
//! | `ENGINEBRIDGE_JOIN_TIMEOUT_MS`    | 1000                  |
//! | `ENGINEBRIDGE_QUIT_GRACE_MS`      | 2000                  |
//! | `ENGINEBRIDGE_MOVE_SLACK_MS`      | 10000                 |
//! | `ENGINEBRIDGE_HASH_MB`            | 256                   |
//! | `ENGINEBRIDGE_AVATAR_HASH_MB`     | 128                   |
//! | `ENGINEBRIDGE_LEGACY_SETTLE_MS`   | 100                   |
//! | `ENGINEBRIDGE_ENGINES_FILE`       | `engines_config.json` |

use std::path::PathBuf;
use std::time::Duration;

use engine::{LegacyTimings, SessionTimeouts, SnapshotDefaults};

const DEFAULT_ENGINES_FILE: &str = "engines_config.json";

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Budget for each handshake attempt during detection.
    pub detection_timeout: Duration,
    /// How long a manager waits for a worker to acknowledge a stop.
    pub stop_timeout: Duration,
    /// How long a manager waits for a worker thread to exit.
    pub join_timeout: Duration,
    pub session: SessionTimeouts,
    pub legacy: LegacyTimings,
    pub hash_mb: u32,
    pub avatar_hash_mb: u32,
    /// Registry file read by [`crate::EngineManager::load`].
    pub engines_file: PathBuf,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            detection_timeout: Duration::from_secs(3),
            stop_timeout: Duration::from_secs(2),
            join_timeout: Duration::from_secs(1),
            session: SessionTimeouts::default(),
            legacy: LegacyTimings::default(),
            hash_mb: SnapshotDefaults::modern().hash_mb,
            avatar_hash_mb: SnapshotDefaults::avatar().hash_mb,
            engines_file: PathBuf::from(DEFAULT_ENGINES_FILE),
        }
    }
}

impl BridgeConfig {
    /// Defaults overridden by whatever `ENGINEBRIDGE_*` variables are set.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`BridgeConfig::from_env`] with an explicit variable source.
    ///
    /// Unparseable values are logged and ignored.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let millis = |name: &str, current: Duration| {
            parsed::<u64>(&lookup, name).map_or(current, Duration::from_millis)
        };

        config.detection_timeout = millis("ENGINEBRIDGE_DETECT_TIMEOUT_MS", config.detection_timeout);
        config.stop_timeout = millis("ENGINEBRIDGE_STOP_TIMEOUT_MS", config.stop_timeout);
        config.join_timeout = millis("ENGINEBRIDGE_JOIN_TIMEOUT_MS", config.join_timeout);
        config.session.quit_grace = millis("ENGINEBRIDGE_QUIT_GRACE_MS", config.session.quit_grace);
        config.session.move_slack = millis("ENGINEBRIDGE_MOVE_SLACK_MS", config.session.move_slack);
        config.legacy.settle = millis("ENGINEBRIDGE_LEGACY_SETTLE_MS", config.legacy.settle);

        if let Some(mb) = parsed::<u32>(&lookup, "ENGINEBRIDGE_HASH_MB") {
            config.hash_mb = mb;
        }
        if let Some(mb) = parsed::<u32>(&lookup, "ENGINEBRIDGE_AVATAR_HASH_MB") {
            config.avatar_hash_mb = mb;
        }
        if let Some(file) = lookup("ENGINEBRIDGE_ENGINES_FILE").filter(|f| !f.is_empty()) {
            config.engines_file = PathBuf::from(file);
        }
        config
    }

    /// Snapshot defaults for analysis engines: every CPU, full-size hash.
    pub fn engine_defaults(&self) -> SnapshotDefaults {
        SnapshotDefaults {
            hash_mb: self.hash_mb,
            ..SnapshotDefaults::modern()
        }
    }

    /// Snapshot defaults for avatars: half the CPUs, smaller hash.
    pub fn avatar_defaults(&self) -> SnapshotDefaults {
        SnapshotDefaults {
            hash_mb: self.avatar_hash_mb,
            ..SnapshotDefaults::avatar()
        }
    }
}

fn parsed<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    let raw = lookup(name)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring {}={:?}: not a number", name, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::from_lookup(|_| None);
        assert_eq!(config.detection_timeout, Duration::from_secs(3));
        assert_eq!(config.stop_timeout, Duration::from_secs(2));
        assert_eq!(config.join_timeout, Duration::from_secs(1));
        assert_eq!(config.session.quit_grace, Duration::from_secs(2));
        assert_eq!(config.session.move_slack, Duration::from_secs(10));
        assert_eq!(config.legacy.settle, Duration::from_millis(100));
        assert_eq!(config.legacy.after_xboard, Duration::from_millis(200));
        assert_eq!(config.legacy.after_protover, Duration::from_millis(300));
        assert_eq!(config.engines_file, PathBuf::from("engines_config.json"));
        assert_eq!(config.engine_defaults().hash_mb, 256);
        assert_eq!(config.avatar_defaults().hash_mb, 128);
    }

    #[test]
    fn test_overrides() {
        let config = BridgeConfig::from_lookup(lookup_from(&[
            ("ENGINEBRIDGE_STOP_TIMEOUT_MS", "500"),
            ("ENGINEBRIDGE_HASH_MB", "64"),
            ("ENGINEBRIDGE_ENGINES_FILE", "/tmp/engines.json"),
        ]));
        assert_eq!(config.stop_timeout, Duration::from_millis(500));
        assert_eq!(config.hash_mb, 64);
        assert_eq!(config.engines_file, PathBuf::from("/tmp/engines.json"));
    }

    #[test]
    fn test_garbage_is_ignored() {
        let config = BridgeConfig::from_lookup(lookup_from(&[
            ("ENGINEBRIDGE_QUIT_GRACE_MS", "soon"),
            ("ENGINEBRIDGE_AVATAR_HASH_MB", "-1"),
        ]));
        assert_eq!(config.session.quit_grace, Duration::from_secs(2));
        assert_eq!(config.avatar_hash_mb, 128);
    }

    #[test]
    fn test_snapshot_defaults_follow_engine_crate() {
        let config = BridgeConfig::default();
        assert_eq!(config.engine_defaults(), SnapshotDefaults::modern());
        assert_eq!(config.avatar_defaults(), SnapshotDefaults::avatar());

        let config = BridgeConfig::from_lookup(lookup_from(&[("ENGINEBRIDGE_AVATAR_HASH_MB", "32")]));
        assert_eq!(
            config.avatar_defaults(),
            SnapshotDefaults {
                hash_mb: 32,
                ..SnapshotDefaults::avatar()
            }
        );
        assert_eq!(config.engine_defaults().threads, SnapshotDefaults::modern().threads);
    }

    #[test]
    fn test_avatar_threads_leave_room() {
        let config = BridgeConfig::default();
        assert!(config.avatar_defaults().threads >= 1);
        assert!(config.avatar_defaults().threads <= config.engine_defaults().threads);
    }
}
