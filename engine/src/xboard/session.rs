use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chess_common::{from_engine_move, to_engine_move, GamePosition};
use cozy_chess::Move;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use super::parser::{classify_line, SearchPhase, ThinkingLine, XboardLine};
use crate::analysis::{convert_pv, AnalysisInfo, Score};
use crate::options::EngineOptions;
use crate::process::{spawn_line_reader, EngineProcess};
use crate::{EngineError, SearchLimit, SessionTimeouts};

/// Lifecycle of a legacy session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XboardState {
    NotStarted,
    Initializing,
    Ready,
    Thinking,
    Stopped,
}

/// Something the reader task picked out of the engine's output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegacyEvent {
    MoveReady(String),
    Thinking(ThinkingLine),
    Error(String),
    Feature(String),
}

/// Settling delays between handshake commands. Old engines drop input that
/// arrives while they are still processing the previous line.
#[derive(Debug, Clone, Copy)]
pub struct LegacyTimings {
    pub after_xboard: Duration,
    pub after_protover: Duration,
    pub settle: Duration,
    pub move_gap: Duration,
}

impl Default for LegacyTimings {
    fn default() -> Self {
        Self {
            after_xboard: Duration::from_millis(200),
            after_protover: Duration::from_millis(300),
            settle: Duration::from_millis(100),
            move_gap: Duration::from_millis(20),
        }
    }
}

impl LegacyTimings {
    /// No delays at all; for engines known to buffer their input.
    pub fn immediate() -> Self {
        Self {
            after_xboard: Duration::ZERO,
            after_protover: Duration::ZERO,
            settle: Duration::ZERO,
            move_gap: Duration::ZERO,
        }
    }
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        time::sleep(delay).await;
    }
}

/// Search flags shared with the reader task.
#[derive(Debug, Default)]
struct SearchFlags {
    thinking: AtomicBool,
    awaiting_move: AtomicBool,
}

impl SearchFlags {
    fn phase(&self) -> SearchPhase {
        SearchPhase {
            thinking: self.thinking.load(Ordering::SeqCst),
            awaiting_move: self.awaiting_move.load(Ordering::SeqCst),
        }
    }

    fn begin(&self) {
        self.awaiting_move.store(true, Ordering::SeqCst);
        self.thinking.store(true, Ordering::SeqCst);
    }

    fn finish(&self) {
        self.thinking.store(false, Ordering::SeqCst);
        self.awaiting_move.store(false, Ordering::SeqCst);
    }
}

/// A running WinBoard/XBoard engine.
pub struct XboardSession {
    process: EngineProcess,
    events: mpsc::UnboundedReceiver<LegacyEvent>,
    reader: JoinHandle<()>,
    flags: Arc<SearchFlags>,
    state: XboardState,
    name: String,
    position: GamePosition,
    timings: LegacyTimings,
    timeouts: SessionTimeouts,
}

impl XboardSession {
    /// Spawn the engine and queue the initialization sequence.
    ///
    /// The engine acknowledges nothing, so success only means every command
    /// was written.
    #[tracing::instrument(level = "info", skip(options, init_commands, timings, timeouts))]
    pub async fn start(
        path: &Path,
        options: &EngineOptions,
        init_commands: &[String],
        timings: LegacyTimings,
        timeouts: SessionTimeouts,
    ) -> Result<Self, EngineError> {
        let (process, stdout) = EngineProcess::spawn(path)?;
        let flags = Arc::new(SearchFlags::default());
        let (tx, events) = mpsc::unbounded_channel();

        let label = process.label().to_string();
        let reader = {
            let flags = Arc::clone(&flags);
            let label = label.clone();
            spawn_line_reader(stdout, label.clone(), move |line| {
                dispatch_line(&label, line, &flags, &tx);
            })
        };

        let mut session = Self {
            name: format!("{} (WinBoard)", label),
            process,
            events,
            reader,
            flags,
            state: XboardState::Initializing,
            position: GamePosition::default(),
            timings,
            timeouts,
        };

        if let Err(e) = session.initialize(options, init_commands).await {
            session.quit().await;
            return Err(e);
        }

        session.state = XboardState::Ready;
        tracing::info!("Engine {} initialized", session.name);
        Ok(session)
    }

    async fn initialize(
        &mut self,
        options: &EngineOptions,
        init_commands: &[String],
    ) -> Result<(), EngineError> {
        self.process.send("xboard").await?;
        pause(self.timings.after_xboard).await;
        self.process.send("protover 2").await?;
        pause(self.timings.after_protover).await;

        for cmd in ["new", "random", "force"] {
            self.process.send(cmd).await?;
            pause(self.timings.settle).await;
        }

        self.send_personality(init_commands).await?;

        for cmd in legacy_option_commands(options) {
            self.process.send(&cmd).await?;
        }
        Ok(())
    }

    /// Switch personality on a running engine: enter force mode, then replay
    /// the style commands.
    pub async fn apply_personality(&mut self, commands: &[String]) -> Result<(), EngineError> {
        self.ensure_running()?;
        self.stop().await?;
        self.process.send("force").await?;
        pause(self.timings.settle).await;
        self.send_personality(commands).await
    }

    async fn send_personality(&mut self, commands: &[String]) -> Result<(), EngineError> {
        for cmd in commands.iter().map(|c| c.trim()).filter(|c| !c.is_empty()) {
            tracing::debug!("Personality command: {}", cmd);
            self.process.send(cmd).await?;
            pause(self.timings.settle).await;
        }
        Ok(())
    }

    /// Executable name with the protocol suffix.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> XboardState {
        self.state
    }

    pub fn is_thinking(&self) -> bool {
        self.flags.thinking.load(Ordering::SeqCst)
    }

    /// The game as the engine has been told it.
    pub fn position(&self) -> &GamePosition {
        &self.position
    }

    pub fn is_alive(&mut self) -> bool {
        self.state != XboardState::Stopped && self.process.is_alive()
    }

    /// Re-synchronize the engine with `position` by replaying its history.
    pub async fn set_position(&mut self, position: &GamePosition) -> Result<(), EngineError> {
        self.ensure_running()?;
        self.process.send("force").await?;
        pause(self.timings.move_gap).await;
        self.process.send("new").await?;
        pause(self.timings.move_gap).await;

        if !position.is_standard_start() {
            self.process
                .send(&format!("setboard {}", position.start_fen()))
                .await?;
        }
        for mv in position.engine_moves() {
            self.process.send(&mv).await?;
            pause(self.timings.move_gap).await;
        }

        self.position = position.clone();
        Ok(())
    }

    /// Start searching the tracked position.
    pub async fn go(&mut self, limit: SearchLimit) -> Result<(), EngineError> {
        self.ensure_running()?;
        if let Some(depth) = limit.depth {
            self.process.send(&format!("sd {}", depth)).await?;
        }
        self.process
            .send(&format!("st {}", search_seconds(limit.time)))
            .await?;
        self.flags.begin();
        self.state = XboardState::Thinking;
        self.process.send("go").await
    }

    /// Forward the opponent's move while in force mode.
    pub async fn make_move(&mut self, mv: Move) -> Result<(), EngineError> {
        self.ensure_running()?;
        let text = to_engine_move(self.position.board(), mv);
        self.position.push(mv)?;
        self.process.send(&text).await
    }

    /// Ask a thinking engine to move now; no-op otherwise.
    ///
    /// The move it answers with is still delivered, even as a bare token.
    pub async fn stop(&mut self) -> Result<(), EngineError> {
        if self.flags.thinking.swap(false, Ordering::SeqCst) {
            tracing::debug!("Asking {} to move now", self.name);
            self.process.send("?").await?;
            if self.state == XboardState::Thinking {
                self.state = XboardState::Ready;
            }
        }
        Ok(())
    }

    /// Next event from the reader; `None` once the engine's output has closed.
    pub async fn next_event(&mut self) -> Option<LegacyEvent> {
        let event = self.events.recv().await;
        if matches!(event, Some(LegacyEvent::MoveReady(_))) && self.state == XboardState::Thinking {
            self.state = XboardState::Ready;
        }
        event
    }

    /// Search `position` and return the engine's move.
    ///
    /// Error lines seen during the search go to `on_error`. `Ok(None)` means
    /// the engine answered with something that is not a legal move.
    pub async fn best_move<C, E>(
        &mut self,
        position: &GamePosition,
        limit: SearchLimit,
        cancelled: C,
        on_error: E,
    ) -> Result<Option<Move>, EngineError>
    where
        C: Future<Output = ()>,
        E: FnMut(String),
    {
        let text = self.search(position, limit, cancelled, |_| {}, on_error).await?;
        match from_engine_move(position.board(), &text) {
            Ok(mv) => Ok(Some(mv)),
            Err(e) => {
                tracing::warn!("Engine {} answered with unusable move: {}", self.name, e);
                Ok(None)
            }
        }
    }

    /// Search `position`, turning thinking output into rank-1 updates.
    ///
    /// When the engine never printed thinking output, one final update
    /// carrying just the chosen move is emitted.
    pub async fn analyze<C, F, E>(
        &mut self,
        position: &GamePosition,
        limit: SearchLimit,
        cancelled: C,
        mut on_info: F,
        on_error: E,
    ) -> Result<(), EngineError>
    where
        C: Future<Output = ()>,
        F: FnMut(AnalysisInfo),
        E: FnMut(String),
    {
        let board = position.board().clone();
        let mut seen_thinking = false;
        let text = self
            .search(
                position,
                limit,
                cancelled,
                |line| {
                    seen_thinking = true;
                    on_info(thinking_to_info(&board, line));
                },
                on_error,
            )
            .await?;

        if !seen_thinking {
            let (pv, pv_san) = convert_pv(&board, &[text]);
            if !pv.is_empty() {
                on_info(AnalysisInfo {
                    pv,
                    pv_san,
                    multipv: 1,
                    ..Default::default()
                });
            }
        }
        Ok(())
    }

    async fn search<C, T, E>(
        &mut self,
        position: &GamePosition,
        limit: SearchLimit,
        cancelled: C,
        mut on_thinking: T,
        mut on_error: E,
    ) -> Result<String, EngineError>
    where
        C: Future<Output = ()>,
        T: FnMut(ThinkingLine),
        E: FnMut(String),
    {
        self.ensure_running()?;
        self.discard_stale_events();
        self.set_position(position).await?;
        self.go(limit).await?;

        let sleep = time::sleep(limit.time + self.timeouts.move_slack);
        tokio::pin!(sleep);
        tokio::pin!(cancelled);
        let mut forced = false;

        loop {
            tokio::select! {
                event = self.events.recv() => match event {
                    Some(LegacyEvent::MoveReady(mv)) => {
                        self.state = XboardState::Ready;
                        return Ok(mv);
                    }
                    Some(LegacyEvent::Thinking(line)) => on_thinking(line),
                    Some(LegacyEvent::Error(msg)) => {
                        tracing::warn!("Engine {} reported: {}", self.name, msg);
                        on_error(msg);
                    }
                    Some(LegacyEvent::Feature(_)) => {}
                    None => {
                        self.state = XboardState::Stopped;
                        return Err(EngineError::Closed);
                    }
                },
                _ = &mut cancelled, if !forced => {
                    forced = true;
                    self.stop().await?;
                    sleep.as_mut().reset(Instant::now() + self.timeouts.stop_grace);
                }
                _ = &mut sleep => {
                    if forced {
                        self.flags.finish();
                        self.state = XboardState::Ready;
                        return Err(EngineError::Timeout("move"));
                    }
                    tracing::warn!("Engine {} overran its time limit, forcing a move", self.name);
                    forced = true;
                    self.stop().await?;
                    sleep.as_mut().reset(Instant::now() + self.timeouts.stop_grace);
                }
            }
        }
    }

    /// Send `quit`, kill after the grace period, and wait briefly for the reader.
    pub async fn quit(&mut self) {
        if self.state == XboardState::Stopped {
            return;
        }
        self.state = XboardState::Stopped;
        self.flags.finish();
        self.process.shutdown("quit", self.timeouts.quit_grace).await;

        if time::timeout(Duration::from_secs(1), &mut self.reader)
            .await
            .is_err()
        {
            tracing::debug!("Reader for {} still busy, aborting", self.name);
            self.reader.abort();
        }
        tracing::info!("Engine {} stopped", self.name);
    }

    fn ensure_running(&self) -> Result<(), EngineError> {
        match self.state {
            XboardState::Stopped | XboardState::NotStarted => Err(EngineError::NotRunning),
            _ => Ok(()),
        }
    }

    fn discard_stale_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            tracing::trace!("Discarding stale event: {:?}", event);
        }
    }
}

impl Drop for XboardSession {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

fn dispatch_line(
    label: &str,
    line: &str,
    flags: &SearchFlags,
    tx: &mpsc::UnboundedSender<LegacyEvent>,
) {
    let event = match classify_line(line, flags.phase()) {
        XboardLine::BenignProtoverError => {
            tracing::debug!("[{}] no protover 2 support, continuing", label);
            return;
        }
        XboardLine::Move(mv) => {
            flags.finish();
            LegacyEvent::MoveReady(mv)
        }
        XboardLine::Thinking(t) => LegacyEvent::Thinking(t),
        XboardLine::Feature(f) => LegacyEvent::Feature(f),
        XboardLine::Error(e) => LegacyEvent::Error(e),
        XboardLine::Malformed => {
            tracing::trace!("[{}] dropping malformed line: {}", label, line);
            return;
        }
        XboardLine::Other => return,
    };
    let _ = tx.send(event);
}

/// Commands for the legacy-only options: `contempt`, `style`, and a
/// `time`/`otim` pair (sent only together).
fn legacy_option_commands(options: &EngineOptions) -> Vec<String> {
    let extra = &options.extra;
    let mut cmds = Vec::new();
    if let Some(v) = extra.get("contempt") {
        cmds.push(format!("option Contempt={}", v));
    }
    if let Some(v) = extra.get("style") {
        cmds.push(format!("option Style={}", v));
    }
    if let (Some(t), Some(o)) = (extra.get("time"), extra.get("otim")) {
        cmds.push(format!("time {}", t));
        cmds.push(format!("otim {}", o));
    }
    cmds
}

/// Whole seconds for `st`, rounded up, at least one.
fn search_seconds(time: Duration) -> u64 {
    let millis = time.as_millis() as u64;
    millis.div_ceil(1000).max(1)
}

fn thinking_to_info(board: &cozy_chess::Board, line: ThinkingLine) -> AnalysisInfo {
    let (pv, pv_san) = convert_pv(board, &line.pv);
    AnalysisInfo {
        depth: line.ply,
        time: line.time,
        nodes: line.nodes,
        score: Some(Score::Centipawns(line.score).white_relative(board.side_to_move())),
        pv,
        pv_san,
        multipv: 1,
        ..Default::default()
    }
}
