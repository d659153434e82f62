use std::sync::Arc;
use std::time::Duration;

use chess_common::GamePosition;
use engine::{OptionValue, SearchLimit};
use tokio::sync::{mpsc, oneshot, watch};

use super::commands::WorkerCommand;
use super::events::SessionState;
use super::signal::StopSignal;
use crate::descriptor::EngineDescriptor;
use crate::BridgeError;

/// Cheap, cloneable handle to a worker.
///
/// Every method returns as soon as the request is queued; outcomes arrive as
/// [`super::WorkerEvent`]s. Usable from any thread, inside or outside a
/// tokio runtime.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    label: Arc<str>,
    cmd_tx: mpsc::UnboundedSender<WorkerCommand>,
    stop: Arc<StopSignal>,
    state: watch::Receiver<SessionState>,
}

impl WorkerHandle {
    pub(crate) fn new(
        label: Arc<str>,
        cmd_tx: mpsc::UnboundedSender<WorkerCommand>,
        stop: Arc<StopSignal>,
        state: watch::Receiver<SessionState>,
    ) -> Self {
        Self {
            label,
            cmd_tx,
            stop,
            state,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    fn send(&self, cmd: WorkerCommand) -> Result<(), BridgeError> {
        self.cmd_tx.send(cmd).map_err(|_| BridgeError::WorkerGone)
    }

    /// Start `descriptor`'s engine, replacing any running session.
    pub fn start(&self, descriptor: EngineDescriptor) -> Result<(), BridgeError> {
        self.send(WorkerCommand::Start(Box::new(descriptor)))
    }

    /// Cancel in-flight searches and quit the session.
    pub fn stop(&self) -> Result<(), BridgeError> {
        self.stop.cancel();
        self.send(WorkerCommand::Stop { ack: None })
    }

    /// Like [`WorkerHandle::stop`], but wait up to `timeout` for the worker
    /// to acknowledge. Returns whether a session was running, or `None` if
    /// no acknowledgement arrived in time.
    pub async fn stop_and_wait(&self, timeout: Duration) -> Option<bool> {
        self.stop.cancel();
        let (tx, rx) = oneshot::channel();
        self.send(WorkerCommand::Stop { ack: Some(tx) }).ok()?;
        tokio::time::timeout(timeout, rx).await.ok()?.ok()
    }

    pub fn analyze(
        &self,
        position: GamePosition,
        multipv: u32,
        limit: SearchLimit,
    ) -> Result<(), BridgeError> {
        self.send(WorkerCommand::Analyze {
            position,
            multipv,
            limit,
            generation: self.stop.generation(),
        })
    }

    pub fn best_move(&self, position: GamePosition, limit: SearchLimit) -> Result<(), BridgeError> {
        self.send(WorkerCommand::BestMove {
            position,
            limit,
            generation: self.stop.generation(),
        })
    }

    pub fn update_option(
        &self,
        name: impl Into<String>,
        value: impl Into<OptionValue>,
    ) -> Result<(), BridgeError> {
        self.send(WorkerCommand::UpdateOption {
            name: name.into(),
            value: value.into(),
        })
    }

    /// Replay personality commands on a running legacy engine.
    pub fn apply_personality(&self, commands: Vec<String>) -> Result<(), BridgeError> {
        self.send(WorkerCommand::ApplyPersonality(commands))
    }

    /// Cancel every search submitted so far without stopping the engine.
    pub fn stop_analysis(&self) {
        self.stop.cancel();
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    pub(crate) fn exit(&self) {
        self.stop.cancel();
        let _ = self.send(WorkerCommand::Exit);
    }
}
