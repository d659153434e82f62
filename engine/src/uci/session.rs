use std::future::Future;
use std::path::Path;
use std::time::Duration;

use chess_common::{from_engine_move, GamePosition};
use cozy_chess::Move;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use super::parser::{parse_uci_message, RawInfo, UciMessage};
use crate::analysis::{convert_pv, AnalysisInfo};
use crate::options::{is_auto_managed, ConfigSnapshot, EngineOptions, OptionValue, SnapshotDefaults};
use crate::process::{spawn_line_channel, EngineProcess};
use crate::{EngineError, SearchLimit, SessionTimeouts};

/// A running modern-protocol engine.
///
/// Requests are strictly sequential (`&mut self`); output that arrives while
/// no request is in flight is discarded at the start of the next one.
pub struct UciSession {
    process: EngineProcess,
    lines: mpsc::UnboundedReceiver<String>,
    reader: JoinHandle<()>,
    name: String,
    snapshot: ConfigSnapshot,
    multipv: u32,
    timeouts: SessionTimeouts,
    stopped: bool,
}

impl UciSession {
    /// Spawn the engine, complete the handshake and apply the configuration snapshot.
    #[tracing::instrument(level = "info", skip(options, defaults, timeouts))]
    pub async fn start(
        path: &Path,
        options: &EngineOptions,
        defaults: &SnapshotDefaults,
        timeouts: SessionTimeouts,
    ) -> Result<Self, EngineError> {
        let (process, stdout) = EngineProcess::spawn(path)?;
        let (lines, reader) = spawn_line_channel(stdout, process.label().to_string());

        let mut session = Self {
            name: process.label().to_string(),
            process,
            lines,
            reader,
            snapshot: options.configuration_snapshot(defaults),
            multipv: 1,
            timeouts,
            stopped: false,
        };

        if let Err(e) = session.handshake().await {
            session.stop().await;
            return Err(e);
        }

        tracing::info!(
            "Engine {} ready ({} options applied)",
            session.name,
            session.snapshot.len()
        );
        Ok(session)
    }

    async fn handshake(&mut self) -> Result<(), EngineError> {
        self.process.send("uci").await?;

        let deadline = Instant::now() + self.timeouts.init;
        loop {
            let line = self.next_line_until(deadline, "uciok").await?;
            match parse_uci_message(&line) {
                Ok(UciMessage::Id { name, value }) if name == "name" => self.name = value,
                Ok(UciMessage::UciOk) => break,
                _ => {}
            }
        }

        let applied: Vec<(String, OptionValue)> = self
            .snapshot
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect();
        for (name, value) in applied {
            tracing::debug!("Setting option {} = {}", name, value);
            self.send_option(&name, &value).await?;
        }

        self.sync_ready().await
    }

    /// `isready` → `readyok`, bounded by the init timeout.
    async fn sync_ready(&mut self) -> Result<(), EngineError> {
        self.process.send("isready").await?;
        let deadline = Instant::now() + self.timeouts.init;
        loop {
            let line = self.next_line_until(deadline, "readyok").await?;
            if matches!(parse_uci_message(&line), Ok(UciMessage::ReadyOk)) {
                return Ok(());
            }
        }
    }

    async fn next_line_until(
        &mut self,
        deadline: Instant,
        waiting_for: &'static str,
    ) -> Result<String, EngineError> {
        match time::timeout_at(deadline, self.lines.recv()).await {
            Ok(Some(line)) => Ok(line),
            Ok(None) => Err(EngineError::Closed),
            Err(_) => Err(EngineError::Timeout(waiting_for)),
        }
    }

    /// Name reported by the engine (`id name`), or the executable name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configuration currently applied to the process.
    pub fn snapshot(&self) -> &ConfigSnapshot {
        &self.snapshot
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Stream a multi-variation analysis of `position` into `on_info`.
    ///
    /// Ends when the engine reports its best move, the time limit runs out, or
    /// `cancelled` resolves. Scores are reported from White's perspective.
    pub async fn analyze<C, F>(
        &mut self,
        position: &GamePosition,
        multipv: u32,
        limit: SearchLimit,
        cancelled: C,
        mut on_info: F,
    ) -> Result<(), EngineError>
    where
        C: Future<Output = ()>,
        F: FnMut(AnalysisInfo),
    {
        self.ensure_running()?;
        self.discard_stale_output();
        self.set_multipv(multipv.max(1)).await?;
        self.send_position(position).await?;
        self.process.send(&go_command(&limit)).await?;

        let board = position.board().clone();
        let result = self
            .await_bestmove(limit, cancelled, |raw| {
                if let Some(info) = to_analysis_info(&board, raw) {
                    on_info(info);
                }
            })
            .await;
        result.map(|_| ())
    }

    /// Single search; `Ok(None)` when the engine has no move to offer.
    pub async fn best_move(
        &mut self,
        position: &GamePosition,
        limit: SearchLimit,
    ) -> Result<Option<Move>, EngineError> {
        self.ensure_running()?;
        self.discard_stale_output();
        self.set_multipv(1).await?;
        self.send_position(position).await?;
        self.process.send(&go_command(&limit)).await?;

        let Some(text) = self
            .await_bestmove(limit, std::future::pending(), |_| {})
            .await?
        else {
            return Ok(None);
        };

        match from_engine_move(position.board(), &text) {
            Ok(mv) => Ok(Some(mv)),
            Err(e) => {
                tracing::warn!("Engine {} answered with unusable move: {}", self.name, e);
                Ok(None)
            }
        }
    }

    /// Wait for `bestmove`, feeding `info` lines to `on_info` until a stop is requested.
    async fn await_bestmove<C, F>(
        &mut self,
        limit: SearchLimit,
        cancelled: C,
        mut on_info: F,
    ) -> Result<Option<String>, EngineError>
    where
        C: Future<Output = ()>,
        F: FnMut(RawInfo),
    {
        let sleep = time::sleep(limit.time + self.timeouts.move_slack);
        tokio::pin!(sleep);
        tokio::pin!(cancelled);
        let mut stopping = false;

        loop {
            tokio::select! {
                line = self.lines.recv() => {
                    let line = line.ok_or(EngineError::Closed)?;
                    match parse_uci_message(&line) {
                        Ok(UciMessage::BestMove { mv, .. }) => return Ok(mv),
                        Ok(UciMessage::Info(raw)) if !stopping => on_info(raw),
                        _ => {}
                    }
                }
                _ = &mut cancelled, if !stopping => {
                    tracing::debug!("Search cancelled, sending stop");
                    stopping = true;
                    self.process.send("stop").await?;
                    sleep.as_mut().reset(Instant::now() + self.timeouts.stop_grace);
                }
                _ = &mut sleep => {
                    if stopping {
                        tracing::warn!("Engine {} ignored stop", self.name);
                        return Err(EngineError::Timeout("bestmove"));
                    }
                    tracing::warn!("Engine {} overran its time limit, sending stop", self.name);
                    stopping = true;
                    self.process.send("stop").await?;
                    sleep.as_mut().reset(Instant::now() + self.timeouts.stop_grace);
                }
            }
        }
    }

    /// Apply one option to the running engine and record it in the snapshot.
    ///
    /// Auto-managed names are ignored: each request sets those itself.
    pub async fn update_option(&mut self, name: &str, value: OptionValue) -> Result<(), EngineError> {
        self.ensure_running()?;
        if is_auto_managed(name) {
            tracing::debug!("Ignoring update of auto-managed option {}", name);
            return Ok(());
        }
        self.send_option(name, &value).await?;
        self.snapshot.set(name, value);
        Ok(())
    }

    /// Quit the engine; safe to call repeatedly.
    pub async fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.process.shutdown("quit", self.timeouts.quit_grace).await;
        self.reader.abort();
        tracing::info!("Engine {} stopped", self.name);
    }

    fn ensure_running(&self) -> Result<(), EngineError> {
        if self.stopped {
            Err(EngineError::NotRunning)
        } else {
            Ok(())
        }
    }

    fn discard_stale_output(&mut self) {
        while let Ok(line) = self.lines.try_recv() {
            tracing::trace!("Discarding stale output: {}", line);
        }
    }

    async fn set_multipv(&mut self, multipv: u32) -> Result<(), EngineError> {
        if self.multipv != multipv {
            self.send_option("MultiPV", &OptionValue::from(multipv))
                .await?;
            self.multipv = multipv;
        }
        Ok(())
    }

    async fn send_option(&mut self, name: &str, value: &OptionValue) -> Result<(), EngineError> {
        self.process
            .send(&format!("setoption name {} value {}", name, value))
            .await
    }

    async fn send_position(&mut self, position: &GamePosition) -> Result<(), EngineError> {
        self.process.send(&position_command(position)).await
    }
}

impl Drop for UciSession {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

pub(crate) fn position_command(position: &GamePosition) -> String {
    let mut cmd = if position.is_standard_start() {
        "position startpos".to_string()
    } else {
        format!("position fen {}", position.start_fen())
    };
    let moves = position.engine_moves();
    if !moves.is_empty() {
        cmd.push_str(" moves ");
        cmd.push_str(&moves.join(" "));
    }
    cmd
}

pub(crate) fn go_command(limit: &SearchLimit) -> String {
    let mut cmd = "go".to_string();
    if let Some(depth) = limit.depth {
        cmd.push_str(&format!(" depth {}", depth));
    }
    cmd.push_str(&format!(" movetime {}", limit.time.as_millis().max(1)));
    cmd
}

/// Turn a raw `info` line into an update; chatter without score or PV is dropped.
fn to_analysis_info(board: &cozy_chess::Board, raw: RawInfo) -> Option<AnalysisInfo> {
    if raw.score.is_none() && raw.pv.is_empty() {
        return None;
    }
    let (pv, pv_san) = convert_pv(board, &raw.pv);
    Some(AnalysisInfo {
        depth: raw.depth.unwrap_or(0),
        seldepth: raw.seldepth,
        nodes: raw.nodes.unwrap_or(0),
        nps: raw.nps.unwrap_or(0),
        time: Duration::from_millis(raw.time_ms.unwrap_or(0)),
        score: raw.score.map(|s| s.white_relative(board.side_to_move())),
        pv,
        pv_san,
        multipv: raw.multipv.unwrap_or(1),
    })
}
