//! Engine workers and the managers that own them.
//!
//! Every engine runs inside an [`EngineWorker`]: a dedicated OS thread with
//! its own single-threaded tokio runtime. Callers on any thread submit
//! commands through a [`WorkerHandle`] and observe results as
//! [`WorkerEvent`]s on a broadcast channel.

pub mod avatar;
pub mod avatar_manager;
pub mod config;
pub mod descriptor;
pub mod manager;
pub mod worker;

pub use avatar::{avatar_options, depth_limit, error_probability, PlayerStyleProfile};
pub use avatar_manager::AvatarEngineManager;
pub use config::BridgeConfig;
pub use descriptor::{EngineDescriptor, EngineRegistry};
pub use manager::EngineManager;
pub use worker::{
    EngineWorker, EventSink, SessionState, WorkerEvent, WorkerHandle, WorkerSettings,
};

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Engine not found: {0}")]
    UnknownEngine(String),
    #[error("Engine already registered: {0}")]
    DuplicateEngine(String),
    #[error("Engine file not found: {}", .0.display())]
    MissingExecutable(PathBuf),
    #[error("No engine running")]
    NotRunning,
    #[error("Worker is gone")]
    WorkerGone,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Registry format error: {0}")]
    Json(#[from] serde_json::Error),
}
