//! The concurrency bridge: one engine session per dedicated thread.

pub(crate) mod actor;
pub(crate) mod commands;
pub mod events;
pub mod handle;
pub(crate) mod signal;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use engine::{LegacyTimings, SessionTimeouts, SnapshotDefaults};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::Instrument;

use crate::avatar::Humanizer;
use crate::config::BridgeConfig;
use crate::BridgeError;
use actor::{run_worker, MovePolicy, WorkerState};
pub use events::{EventSink, SessionState, WorkerEvent};
pub use handle::WorkerHandle;
use signal::StopSignal;

/// Per-worker session parameters.
#[derive(Debug, Clone, Copy)]
pub struct WorkerSettings {
    pub timeouts: SessionTimeouts,
    pub legacy: LegacyTimings,
    pub defaults: SnapshotDefaults,
}

impl WorkerSettings {
    pub fn for_engines(config: &BridgeConfig) -> Self {
        Self {
            timeouts: config.session,
            legacy: config.legacy,
            defaults: config.engine_defaults(),
        }
    }

    pub fn for_avatars(config: &BridgeConfig) -> Self {
        Self {
            defaults: config.avatar_defaults(),
            ..Self::for_engines(config)
        }
    }
}

/// A dedicated OS thread running a single-threaded tokio runtime that hosts
/// at most one engine session.
///
/// The runtime lives as long as the worker, so the session survives between
/// requests. Dropping the worker asks the thread to exit without waiting.
pub struct EngineWorker {
    handle: WorkerHandle,
    thread: Option<thread::JoinHandle<()>>,
    /// Fires once the thread has torn its runtime down.
    exited: Option<oneshot::Receiver<()>>,
}

impl EngineWorker {
    pub fn spawn(label: &str, sink: EventSink, settings: WorkerSettings) -> Result<Self, BridgeError> {
        Self::spawn_with(label, sink, settings, MovePolicy::Best, None)
    }

    pub(crate) fn spawn_with(
        label: &str,
        sink: EventSink,
        settings: WorkerSettings,
        policy: MovePolicy,
        display_name: Option<String>,
    ) -> Result<Self, BridgeError> {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);
        let stop = Arc::new(StopSignal::default());
        let label: Arc<str> = Arc::from(label);

        let state = WorkerState {
            session: None,
            sink: sink.clone(),
            state_tx,
            stop: Arc::clone(&stop),
            settings,
            policy,
            display_name,
        };

        let (exited_tx, exited) = oneshot::channel();
        let span_label = Arc::clone(&label);
        let thread = thread::Builder::new()
            .name(format!("engine-worker-{}", label))
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        tracing::error!("Failed to build worker runtime: {}", e);
                        sink.emit(WorkerEvent::Error(format!("Worker failed to start: {}", e)));
                        let _ = exited_tx.send(());
                        return;
                    }
                };
                runtime.block_on(
                    run_worker(state, cmd_rx)
                        .instrument(tracing::info_span!("worker", name = %span_label)),
                );
                drop(runtime);
                let _ = exited_tx.send(());
            })?;

        Ok(Self {
            handle: WorkerHandle::new(label, cmd_tx, stop, state_rx),
            thread: Some(thread),
            exited: Some(exited),
        })
    }

    pub fn handle(&self) -> &WorkerHandle {
        &self.handle
    }

    /// Ask the worker to exit and wait up to `timeout` for its thread.
    ///
    /// A thread that does not finish in time is detached; its process was
    /// already told to quit and is killed when the runtime goes away.
    pub async fn shutdown(mut self, timeout: Duration) {
        self.handle.exit();
        let (Some(thread), Some(exited)) = (self.thread.take(), self.exited.take()) else {
            return;
        };

        // A panicking thread drops the sender, which also ends the wait.
        if tokio::time::timeout(timeout, exited).await.is_err() {
            tracing::warn!(
                "Worker {} did not exit within {:?}, detaching",
                self.handle.label(),
                timeout
            );
            return;
        }
        if thread.join().is_err() {
            tracing::error!("Worker {} panicked", self.handle.label());
        }
    }
}

impl Drop for EngineWorker {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.handle.exit();
        }
    }
}

/// Humanized best-move policy for avatar workers.
pub(crate) fn humanized(humanizer: Humanizer) -> MovePolicy {
    MovePolicy::Humanized(Box::new(humanizer))
}
