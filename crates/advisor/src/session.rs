//! Analysis session controller: owns the engine handle, serializes
//! analysis requests behind the readiness handshake, and publishes the
//! ranked-suggestion read model.

use chess_core::{notation, Position};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::engine::{EnginePort, EngineProcess, ProcessClaim};
use crate::error::AdvisorError;
use crate::protocol::{self, AnalysisRecord};
use crate::suggestions::{AnalysisLine, AnalysisSnapshot, SuggestionSet};

/// Plies of a principal variation shown in human-readable form.
const SUGGESTION_LINE_PLIES: usize = 4;

const ENGINE_START_FAILED: &str =
    "Could not start the analysis engine. Check STOCKFISH_PATH and try again.";
const ENGINE_STOPPED: &str = "The analysis engine stopped unexpectedly.";

/// Reactive read model for consumers.
#[derive(Debug, Clone, Default)]
pub struct EngineView {
    pub suggestions: AnalysisSnapshot,
    pub is_ready: bool,
    pub error: Option<String>,
}

enum Command {
    Analyze(String),
    Shutdown,
}

/// Handle to the single engine session per application lifetime.
pub struct AnalysisSession {
    commands: mpsc::UnboundedSender<Command>,
    view: watch::Receiver<EngineView>,
    task: JoinHandle<()>,
}

impl AnalysisSession {
    /// Claim the process-wide engine slot and start the session actor.
    /// Fails if another session is alive.
    pub fn start(config: EngineConfig) -> Result<Self, AdvisorError> {
        let claim = ProcessClaim::acquire().ok_or(AdvisorError::SessionActive)?;
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (view_tx, view_rx) = watch::channel(EngineView::default());
        let task = tokio::spawn(run_session(config, claim, cmd_rx, view_tx));
        Ok(Self {
            commands: cmd_tx,
            view: view_rx,
            task,
        })
    }

    /// Request analysis of `position`. Before engine readiness only the
    /// most recent request is kept; after an engine error this is a no-op.
    pub fn analyze(&self, position: &Position) {
        let _ = self.commands.send(Command::Analyze(position.fen()));
    }

    /// Subscribe to the reactive read model.
    pub fn view(&self) -> watch::Receiver<EngineView> {
        self.view.clone()
    }

    /// Quit the engine and wait for the session to wind down.
    pub async fn shutdown(mut self) {
        let _ = self.commands.send(Command::Shutdown);
        let _ = (&mut self.task).await;
    }
}

impl Drop for AnalysisSession {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run_session(
    config: EngineConfig,
    claim: ProcessClaim,
    mut commands: mpsc::UnboundedReceiver<Command>,
    view: watch::Sender<EngineView>,
) {
    // Held for the whole session so no second engine can be started.
    let _claim = claim;

    let (process, port, mut lines) = match EngineProcess::spawn(&config.path).await {
        Ok(spawned) => spawned,
        Err(e) => {
            warn!(error = %e, "engine spawn failed");
            view.send_modify(|v| v.error = Some(ENGINE_START_FAILED.to_string()));
            // Analysis is permanently disabled for this session; keep
            // draining commands so callers observe no-ops rather than a
            // closed channel.
            while let Some(command) = commands.recv().await {
                if matches!(command, Command::Shutdown) {
                    break;
                }
            }
            return;
        }
    };

    let mut driver = SessionDriver::new(config, port, view);
    driver.handshake();

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Analyze(fen)) => driver.request(fen),
                Some(Command::Shutdown) | None => break,
            },
            line = lines.recv() => match line {
                Some(line) => driver.handle_line(&line),
                None => {
                    warn!("engine output stream closed");
                    driver.view.send_modify(|v| {
                        v.is_ready = false;
                        v.error = Some(ENGINE_STOPPED.to_string());
                    });
                    break;
                }
            },
        }
    }

    info!("shutting down engine");
    driver.port.post("quit");
    process.dispose().await;
}

/// State machine behind the session actor, separated from the process
/// plumbing so tests can drive it with a fake port.
struct SessionDriver {
    config: EngineConfig,
    port: EnginePort,
    view: watch::Sender<EngineView>,
    suggestions: SuggestionSet,
    /// FEN of the most recently requested position; translation context for
    /// incoming lines.
    current_fen: Option<String>,
    /// Most recent request received before readiness (last-write-wins).
    pending_fen: Option<String>,
    ready: bool,
    /// `go` commands not yet acknowledged by a `bestmove` line. Engine
    /// output is ordered with respect to commands, so lines arriving while
    /// more than one search is outstanding belong to a superseded batch.
    outstanding: u32,
}

impl SessionDriver {
    fn new(config: EngineConfig, port: EnginePort, view: watch::Sender<EngineView>) -> Self {
        Self {
            config,
            port,
            view,
            suggestions: SuggestionSet::new(),
            current_fen: None,
            pending_fen: None,
            ready: false,
            outstanding: 0,
        }
    }

    /// Identity/options handshake followed by the readiness probe.
    fn handshake(&self) {
        self.port.post("uci");
        self.port
            .post(&format!("setoption name Threads value {}", self.config.threads));
        self.port
            .post(&format!("setoption name MultiPV value {}", self.config.multipv));
        self.port.post(&format!(
            "setoption name Skill Level value {}",
            self.config.skill_level
        ));
        self.port.post("isready");
    }

    fn request(&mut self, fen: String) {
        if !self.ready {
            self.pending_fen = Some(fen);
            return;
        }
        self.begin_search(fen);
    }

    fn begin_search(&mut self, fen: String) {
        self.port.post("stop");
        self.suggestions.reset();
        self.current_fen = Some(fen.clone());
        self.port.post(&format!("position fen {fen}"));
        self.port
            .post(&format!("go depth {}", self.config.search_depth));
        self.outstanding += 1;
        self.publish();
    }

    fn handle_line(&mut self, raw: &str) {
        if raw == "readyok" {
            self.ready = true;
            self.view.send_modify(|v| v.is_ready = true);
            if let Some(fen) = self.pending_fen.take() {
                self.begin_search(fen);
            }
            return;
        }

        if raw.starts_with("bestmove") {
            self.outstanding = self.outstanding.saturating_sub(1);
            return;
        }

        let Some(record) = protocol::parse_line(raw) else {
            return;
        };
        if self.outstanding > 1 {
            // Tail output of a search that has already been superseded.
            return;
        }
        let Some(fen) = self.current_fen.clone() else {
            return;
        };

        self.suggestions.apply(enrich(record, &fen));
        self.publish();
    }

    fn publish(&self) {
        let snapshot = self.suggestions.snapshot();
        self.view.send_modify(|v| v.suggestions = snapshot);
    }
}

/// Attach human-readable notation to a parsed record.
fn enrich(record: AnalysisRecord, fen: &str) -> AnalysisLine {
    let position = Position::from_fen(fen).ok();
    let first = record.pv.first().cloned().unwrap_or_default();
    let san = position
        .as_ref()
        .and_then(|p| notation::move_to_san(p, &first))
        .unwrap_or_else(|| first.clone());
    let line = position
        .as_ref()
        .map(|p| notation::line_to_san(p, &record.pv, SUGGESTION_LINE_PLIES).join(" "))
        .unwrap_or_default();

    AnalysisLine {
        rank: record.rank,
        depth: record.depth,
        score: record.score,
        pv: record.pv,
        san,
        line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chess_core::board::STARTING_FEN;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn driver() -> (
        SessionDriver,
        UnboundedReceiver<String>,
        watch::Receiver<EngineView>,
    ) {
        let (port, commands) = EnginePort::fake();
        let (view_tx, view_rx) = watch::channel(EngineView::default());
        let driver = SessionDriver::new(EngineConfig::default(), port, view_tx);
        (driver, commands, view_rx)
    }

    fn drain(commands: &mut UnboundedReceiver<String>) -> Vec<String> {
        let mut sent = Vec::new();
        while let Ok(command) = commands.try_recv() {
            sent.push(command);
        }
        sent
    }

    #[test]
    fn test_handshake_sequence() {
        let (driver, mut commands, _view) = driver();
        driver.handshake();
        assert_eq!(
            drain(&mut commands),
            vec![
                "uci",
                "setoption name Threads value 2",
                "setoption name MultiPV value 3",
                "setoption name Skill Level value 20",
                "isready",
            ]
        );
    }

    #[test]
    fn test_requests_before_readiness_queue_last_write_wins() {
        let (mut driver, mut commands, view) = driver();
        driver.handshake();
        drain(&mut commands);

        driver.request("fen-one".to_string());
        driver.request("fen-two".to_string());
        assert!(drain(&mut commands).is_empty());

        driver.handle_line("readyok");
        assert!(view.borrow().is_ready);
        assert_eq!(
            drain(&mut commands),
            vec!["stop", "position fen fen-two", "go depth 16"]
        );

        // The queued request is replayed exactly once.
        driver.handle_line("readyok");
        assert!(drain(&mut commands).is_empty());
    }

    #[test]
    fn test_lines_enriched_and_published() {
        let (mut driver, mut commands, view) = driver();
        driver.handle_line("readyok");
        driver.request(STARTING_FEN.to_string());
        drain(&mut commands);

        driver.handle_line("info depth 12 multipv 1 score cp 35 pv e2e4 e7e5 g1f3 b8c6 f1b5");
        let snapshot = view.borrow().suggestions.clone();
        assert_eq!(snapshot.lines.len(), 1);
        assert_eq!(snapshot.lines[0].san, "e4");
        assert_eq!(snapshot.lines[0].line, "e4 e5 Nf3 Nc6");
        assert_eq!(snapshot.search_depth, Some(12));
    }

    #[test]
    fn test_new_request_resets_before_new_lines() {
        let (mut driver, mut commands, view) = driver();
        driver.handle_line("readyok");
        driver.request(STARTING_FEN.to_string());
        driver.handle_line("info depth 12 multipv 1 score cp 35 pv e2e4");
        driver.handle_line("info depth 12 multipv 2 score cp 20 pv d2d4");
        assert_eq!(view.borrow().suggestions.lines.len(), 2);

        driver.request(STARTING_FEN.to_string());
        drain(&mut commands);
        assert!(view.borrow().suggestions.lines.is_empty());
    }

    #[test]
    fn test_superseded_batch_lines_dropped_until_bestmove() {
        let (mut driver, mut commands, view) = driver();
        driver.handle_line("readyok");
        driver.request(STARTING_FEN.to_string());
        driver.request(STARTING_FEN.to_string());
        drain(&mut commands);

        // Tail output of the first (stopped) search.
        driver.handle_line("info depth 20 multipv 1 score cp 99 pv a2a3");
        assert!(view.borrow().suggestions.lines.is_empty());

        // The stopped search finalizes; output now belongs to the new batch.
        driver.handle_line("bestmove a2a3");
        driver.handle_line("info depth 10 multipv 1 score cp 35 pv e2e4");
        let snapshot = view.borrow().suggestions.clone();
        assert_eq!(snapshot.lines.len(), 1);
        assert_eq!(snapshot.lines[0].san, "e4");
    }

    #[test]
    fn test_unparseable_context_falls_back_to_coordinates() {
        let (mut driver, mut commands, view) = driver();
        driver.handle_line("readyok");
        driver.request("garbage".to_string());
        drain(&mut commands);

        driver.handle_line("info depth 8 multipv 1 score cp 10 pv e2e4");
        let snapshot = view.borrow().suggestions.clone();
        assert_eq!(snapshot.lines[0].san, "e2e4");
        assert_eq!(snapshot.lines[0].line, "");
    }

    #[tokio::test]
    async fn test_spawn_failure_is_terminal_and_slot_is_released() {
        let config = EngineConfig {
            path: "/nonexistent/engine-binary".to_string(),
            ..EngineConfig::default()
        };

        let session = AnalysisSession::start(config.clone()).unwrap();
        let mut view = session.view();
        let state = view.wait_for(|v| v.error.is_some()).await.unwrap().clone();
        assert!(!state.is_ready);

        // Only one session may be alive at a time.
        assert!(matches!(
            AnalysisSession::start(config.clone()),
            Err(AdvisorError::SessionActive)
        ));

        // Requests after the error are no-ops.
        session.analyze(&Position::start());
        session.shutdown().await;

        // The slot is free again once the session is gone.
        let session = AnalysisSession::start(config).unwrap();
        session.shutdown().await;
    }
}
