use std::future::pending;
use std::sync::Arc;

use chess_common::GamePosition;
use cozy_chess::Move;
use engine::{
    AnalysisInfo, EngineError, LegacyEvent, OptionValue, Protocol, SearchLimit, UciSession,
    XboardSession,
};
use tokio::sync::{mpsc, watch};

use super::commands::WorkerCommand;
use super::events::{EventSink, SessionState, WorkerEvent};
use super::signal::StopSignal;
use super::WorkerSettings;
use crate::avatar::humanize::{Humanizer, SearchBackend};
use crate::descriptor::EngineDescriptor;

/// How best-move requests are answered.
pub(crate) enum MovePolicy {
    Best,
    Humanized(Box<Humanizer>),
}

pub(crate) enum ActiveSession {
    Modern(UciSession),
    Legacy(XboardSession),
}

impl ActiveSession {
    fn name(&self) -> &str {
        match self {
            ActiveSession::Modern(s) => s.name(),
            ActiveSession::Legacy(s) => s.name(),
        }
    }

    async fn shutdown(&mut self) {
        match self {
            ActiveSession::Modern(s) => s.stop().await,
            ActiveSession::Legacy(s) => s.quit().await,
        }
    }
}

/// Everything the worker's runtime owns.
pub(crate) struct WorkerState {
    pub(crate) session: Option<ActiveSession>,
    pub(crate) sink: EventSink,
    pub(crate) state_tx: watch::Sender<SessionState>,
    pub(crate) stop: Arc<StopSignal>,
    pub(crate) settings: WorkerSettings,
    pub(crate) policy: MovePolicy,
    /// Name announced in `Ready` instead of the engine's own.
    pub(crate) display_name: Option<String>,
}

impl WorkerState {
    fn set_state(&self, state: SessionState) {
        self.state_tx.send_replace(state);
    }
}

/// The worker loop. Runs until `Exit` or until every handle is dropped.
pub(crate) async fn run_worker(
    mut state: WorkerState,
    mut cmd_rx: mpsc::UnboundedReceiver<WorkerCommand>,
) {
    tracing::info!("Worker started");

    loop {
        tokio::select! {
            biased;

            cmd = cmd_rx.recv() => match cmd {
                Some(WorkerCommand::Exit) | None => break,
                Some(cmd) => handle_command(&mut state, cmd).await,
            },

            event = idle_legacy_event(&mut state.session) => {
                handle_idle_event(&mut state, event).await;
            }
        }
    }

    stop_session(&mut state).await;
    tracing::info!("Worker exited");
}

/// Legacy engines talk whenever they like; drain them between requests.
async fn idle_legacy_event(session: &mut Option<ActiveSession>) -> Option<LegacyEvent> {
    match session {
        Some(ActiveSession::Legacy(s)) => s.next_event().await,
        _ => pending().await,
    }
}

async fn handle_idle_event(state: &mut WorkerState, event: Option<LegacyEvent>) {
    match event {
        Some(LegacyEvent::Error(msg)) => state.sink.emit(WorkerEvent::Error(msg)),
        Some(LegacyEvent::MoveReady(mv)) => {
            tracing::debug!("Ignoring unrequested move {}", mv);
        }
        Some(other) => tracing::trace!("Idle output: {:?}", other),
        None => {
            let name = state
                .session
                .as_ref()
                .map(|s| s.name().to_string())
                .unwrap_or_default();
            tracing::warn!("Engine {} closed its output", name);
            if let Some(mut session) = state.session.take() {
                session.shutdown().await;
            }
            state.set_state(SessionState::Failed);
            state
                .sink
                .emit(WorkerEvent::Error(format!("Engine {} exited unexpectedly", name)));
        }
    }
}

async fn handle_command(state: &mut WorkerState, cmd: WorkerCommand) {
    match cmd {
        WorkerCommand::Start(descriptor) => start_session(state, *descriptor).await,
        WorkerCommand::Stop { ack } => {
            let had_session = stop_session(state).await;
            if let Some(ack) = ack {
                let _ = ack.send(had_session);
            }
        }
        WorkerCommand::Analyze {
            position,
            multipv,
            limit,
            generation,
        } => analyze(state, position, multipv, limit, generation).await,
        WorkerCommand::BestMove {
            position,
            limit,
            generation,
        } => best_move(state, position, limit, generation).await,
        WorkerCommand::UpdateOption { name, value } => update_option(state, &name, value).await,
        WorkerCommand::ApplyPersonality(commands) => apply_personality(state, &commands).await,
        WorkerCommand::Exit => {}
    }
}

async fn start_session(state: &mut WorkerState, descriptor: EngineDescriptor) {
    if state.session.is_some() {
        tracing::info!("Replacing running engine with {}", descriptor.name);
        stop_session(state).await;
    }
    state.set_state(SessionState::Starting);

    let settings = &state.settings;
    let result = match descriptor.protocol {
        Protocol::Modern => UciSession::start(
            &descriptor.path,
            &descriptor.options,
            &settings.defaults,
            settings.timeouts,
        )
        .await
        .map(ActiveSession::Modern),
        Protocol::Legacy => XboardSession::start(
            &descriptor.path,
            &descriptor.options,
            &descriptor.init_commands,
            settings.legacy,
            settings.timeouts,
        )
        .await
        .map(ActiveSession::Legacy),
    };

    match result {
        Ok(session) => {
            let name = state
                .display_name
                .clone()
                .unwrap_or_else(|| session.name().to_string());
            tracing::info!("Engine {} ready", name);
            state.session = Some(session);
            state.set_state(SessionState::Ready);
            state.sink.emit(WorkerEvent::Ready(name));
        }
        Err(e) => {
            tracing::error!("Failed to start {}: {}", descriptor.name, e);
            state.set_state(SessionState::Failed);
            state
                .sink
                .emit(WorkerEvent::Error(format!("Failed to start engine: {}", e)));
        }
    }
}

/// Quit the running session, if any. Emits `Stopped` only when there was one.
async fn stop_session(state: &mut WorkerState) -> bool {
    let Some(mut session) = state.session.take() else {
        return false;
    };
    state.set_state(SessionState::Stopping);
    session.shutdown().await;
    state.set_state(SessionState::Stopped);
    state.sink.emit(WorkerEvent::Stopped);
    true
}

async fn analyze(
    state: &mut WorkerState,
    position: GamePosition,
    multipv: u32,
    limit: SearchLimit,
    generation: u64,
) {
    let stop = Arc::clone(&state.stop);
    let sink = state.sink.clone();
    let Some(session) = state.session.as_mut() else {
        sink.emit(WorkerEvent::Error("Engine not running".to_string()));
        return;
    };
    if stop.generation() != generation {
        tracing::debug!("Analysis cancelled before it started");
        return;
    }

    state.state_tx.send_replace(SessionState::Busy);
    let cancelled = stop.cancelled(generation);
    let result = match session {
        ActiveSession::Modern(s) => {
            s.analyze(&position, multipv, limit, cancelled, |info| {
                sink.emit(WorkerEvent::Analysis(info))
            })
            .await
        }
        ActiveSession::Legacy(s) => {
            s.analyze(
                &position,
                limit,
                cancelled,
                |info| sink.emit(WorkerEvent::Analysis(info)),
                |msg| sink.emit(WorkerEvent::Error(msg)),
            )
            .await
        }
    };

    match result {
        Ok(()) => state.set_state(SessionState::Ready),
        Err(e) => report_failure(state, e).await,
    }
}

async fn best_move(
    state: &mut WorkerState,
    position: GamePosition,
    limit: SearchLimit,
    generation: u64,
) {
    let stop = Arc::clone(&state.stop);
    let sink = state.sink.clone();
    let Some(session) = state.session.as_mut() else {
        sink.emit(WorkerEvent::Error("Engine not running".to_string()));
        return;
    };
    if stop.generation() != generation {
        tracing::debug!("Move request cancelled before it started");
        sink.emit(WorkerEvent::MoveReady(None));
        return;
    }

    state.state_tx.send_replace(SessionState::Busy);
    let result = match &mut state.policy {
        MovePolicy::Best => {
            search_best(session, &position, limit, stop.cancelled(generation), &sink).await
        }
        MovePolicy::Humanized(humanizer) => {
            let mut backend = SessionBackend {
                session,
                sink: &sink,
            };
            humanizer
                .choose_move(&mut backend, &position, limit.time)
                .await
        }
    };

    match result {
        Ok(mv) => {
            state.set_state(SessionState::Ready);
            if mv.is_none() {
                tracing::info!("Engine found no move");
            }
            sink.emit(WorkerEvent::MoveReady(mv));
        }
        Err(e) => {
            report_failure(state, e).await;
            sink.emit(WorkerEvent::MoveReady(None));
        }
    }
}

async fn search_best(
    session: &mut ActiveSession,
    position: &GamePosition,
    limit: SearchLimit,
    cancelled: impl std::future::Future<Output = ()>,
    sink: &EventSink,
) -> Result<Option<Move>, EngineError> {
    match session {
        ActiveSession::Modern(s) => s.best_move(position, limit).await,
        ActiveSession::Legacy(s) => {
            s.best_move(position, limit, cancelled, |msg| {
                sink.emit(WorkerEvent::Error(msg))
            })
            .await
        }
    }
}

async fn update_option(state: &mut WorkerState, name: &str, value: OptionValue) {
    let result = match state.session.as_mut() {
        Some(ActiveSession::Modern(s)) => s.update_option(name, value).await,
        Some(ActiveSession::Legacy(_)) => {
            tracing::debug!("Legacy engines take options at start only; ignoring {}", name);
            Ok(())
        }
        None => {
            state
                .sink
                .emit(WorkerEvent::Error("Engine not running".to_string()));
            return;
        }
    };
    if let Err(e) = result {
        report_failure(state, e).await;
    }
}

async fn apply_personality(state: &mut WorkerState, commands: &[String]) {
    let result = match state.session.as_mut() {
        Some(ActiveSession::Legacy(s)) => s.apply_personality(commands).await,
        Some(ActiveSession::Modern(_)) => {
            tracing::debug!("Personality commands only apply to legacy engines");
            Ok(())
        }
        None => {
            state
                .sink
                .emit(WorkerEvent::Error("Engine not running".to_string()));
            return;
        }
    };
    if let Err(e) = result {
        report_failure(state, e).await;
    }
}

/// Surface a failed request. A dead process takes the session down with it.
async fn report_failure(state: &mut WorkerState, error: EngineError) {
    tracing::warn!("Engine request failed: {}", error);
    state.sink.emit(WorkerEvent::Error(error.to_string()));

    if matches!(error, EngineError::Closed | EngineError::Io(_)) {
        if let Some(mut session) = state.session.take() {
            session.shutdown().await;
        }
        state.set_state(SessionState::Failed);
    } else {
        state.set_state(SessionState::Ready);
    }
}

/// Searches for the humanizer, run on the worker's own session.
struct SessionBackend<'a> {
    session: &'a mut ActiveSession,
    sink: &'a EventSink,
}

impl SearchBackend for SessionBackend<'_> {
    async fn analyse(
        &mut self,
        position: &GamePosition,
        multipv: u32,
        limit: SearchLimit,
    ) -> Result<Vec<AnalysisInfo>, EngineError> {
        let mut infos = Vec::new();
        let sink = self.sink;
        match &mut *self.session {
            ActiveSession::Modern(s) => {
                s.analyze(position, multipv, limit, pending(), |info| infos.push(info))
                    .await?
            }
            ActiveSession::Legacy(s) => {
                s.analyze(
                    position,
                    limit,
                    pending(),
                    |info| infos.push(info),
                    |msg| sink.emit(WorkerEvent::Error(msg)),
                )
                .await?
            }
        }
        Ok(infos)
    }

    async fn best_move(
        &mut self,
        position: &GamePosition,
        limit: SearchLimit,
    ) -> Result<Option<Move>, EngineError> {
        search_best(self.session, position, limit, pending(), self.sink).await
    }
}
