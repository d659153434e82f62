use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cozy_chess::Move;
use engine::AnalysisInfo;
use tokio::sync::broadcast;

/// Events raised by workers to whoever subscribed to their manager.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    /// Session started; carries the engine's display name.
    Ready(String),
    Stopped,
    /// Human-readable failure description.
    Error(String),
    Analysis(AnalysisInfo),
    /// Result of a best-move request; `None` when the engine had no move.
    MoveReady(Option<Move>),
}

/// Lifecycle of the session hosted by one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Starting,
    Ready,
    Busy,
    Stopping,
    Stopped,
    Failed,
}

impl SessionState {
    /// A process is (or is about to be) attached.
    pub fn is_running(self) -> bool {
        matches!(
            self,
            SessionState::Starting | SessionState::Ready | SessionState::Busy
        )
    }
}

/// A worker's outlet into the shared broadcast channel.
///
/// Closing the sink silences the worker for good; managers do this when they
/// abandon a worker so its late events never reach subscribers.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: broadcast::Sender<WorkerEvent>,
    open: Arc<AtomicBool>,
}

impl EventSink {
    pub fn new(tx: broadcast::Sender<WorkerEvent>) -> Self {
        Self {
            tx,
            open: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn emit(&self, event: WorkerEvent) {
        if self.open.load(Ordering::SeqCst) {
            // No subscribers is fine.
            let _ = self.tx.send(event);
        } else {
            tracing::trace!("Dropping event from closed sink: {:?}", event);
        }
    }

    pub fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}
