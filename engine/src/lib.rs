//! Engine protocol layer.
//!
//! Two session types talk to external engine processes: [`UciSession`] for
//! the modern protocol and [`XboardSession`] for the legacy WinBoard line
//! protocol. [`detect_protocol`] tries both handshakes on an unknown
//! executable to tell them apart.

pub mod analysis;
pub mod detect;
pub mod options;
pub mod process;
pub mod uci;
pub mod xboard;

pub use analysis::{AnalysisInfo, Score};
pub use detect::{detect_protocol, DetectedProtocol};
pub use options::{
    is_auto_managed, ConfigSnapshot, EngineOptions, ExtraOptions, OptionValue, SnapshotDefaults,
};
pub use uci::{UciError, UciMessage, UciSession};
pub use xboard::{LegacyEvent, LegacyTimings, XboardSession, XboardState};

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Wire protocol spoken by an engine executable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    /// UCI-style: structured options, streaming multi-variation analysis.
    #[serde(rename = "UCI", alias = "Modern")]
    Modern,
    /// WinBoard/XBoard line protocol.
    #[serde(rename = "WinBoard", alias = "XBoard", alias = "Legacy")]
    Legacy,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Modern => write!(f, "UCI"),
            Protocol::Legacy => write!(f, "WinBoard"),
        }
    }
}

/// How long (and optionally how deep) a single search may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchLimit {
    pub time: Duration,
    pub depth: Option<u32>,
}

impl SearchLimit {
    pub fn time(time: Duration) -> Self {
        Self { time, depth: None }
    }

    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = Some(depth);
        self
    }
}

/// Bounded waits used by both session types.
#[derive(Debug, Clone, Copy)]
pub struct SessionTimeouts {
    /// Handshake (`uci` → `uciok`, `isready` → `readyok`).
    pub init: Duration,
    /// Grace period between `quit` and a forced kill.
    pub quit_grace: Duration,
    /// Extra time allowed on top of the search time before giving up on a move.
    pub move_slack: Duration,
    /// How long to wait for the final result after asking the engine to stop.
    pub stop_grace: Duration,
}

impl Default for SessionTimeouts {
    fn default() -> Self {
        Self {
            init: Duration::from_secs(10),
            quit_grace: Duration::from_secs(2),
            move_slack: Duration::from_secs(10),
            stop_grace: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Failed to start engine {path}: {source}")]
    Spawn {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Communication error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Engine has no stdin")]
    NoStdin,
    #[error("Engine has no stdout")]
    NoStdout,
    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),
    #[error("Engine closed its output")]
    Closed,
    #[error("Engine not running")]
    NotRunning,
    #[error(transparent)]
    Notation(#[from] chess_common::NotationError),
}
