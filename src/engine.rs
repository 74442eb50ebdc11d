//! UCI engine oracle and the before/after move evaluation protocol.

use crate::config::EngineConfig;
use crate::engine_error;
use crate::errors::Result;
use crate::score::{normalize, EngineScore, MatePolicy};
use chess::{ChessMove, Color};
use log::{debug, trace, warn};
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// A position as sent to the engine: a start position plus the moves played
/// from it, so repetition and fifty-move state survive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UciPosition {
    fen: Option<String>,
    moves: Vec<ChessMove>,
}

impl UciPosition {
    pub fn startpos() -> Self {
        Self {
            fen: None,
            moves: Vec::new(),
        }
    }

    pub fn from_fen(fen: impl Into<String>) -> Self {
        Self {
            fen: Some(fen.into()),
            moves: Vec::new(),
        }
    }

    pub fn push(&mut self, chess_move: ChessMove) {
        self.moves.push(chess_move);
    }

    pub fn moves(&self) -> &[ChessMove] {
        &self.moves
    }

    /// The `position ...` command line
    pub fn command(&self) -> String {
        let mut command = match &self.fen {
            Some(fen) => format!("position fen {fen}"),
            None => "position startpos".to_string(),
        };
        if !self.moves.is_empty() {
            command.push_str(" moves");
            for chess_move in &self.moves {
                command.push(' ');
                command.push_str(&chess_move.to_string());
            }
        }
        command
    }
}

/// Final result of one fixed-depth search, relative to the side to move
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub score: EngineScore,
    pub depth: Option<u32>,
    pub best_move: Option<String>,
}

/// Anything that can score a position at a fixed depth
pub trait EngineOracle {
    /// Called once before the positions of a new game are evaluated
    fn new_game(&mut self) -> Result<()> {
        Ok(())
    }

    fn evaluate(&mut self, position: &UciPosition, depth: u8) -> Result<Evaluation>;
}

/// A reported score and the depth of the iteration that produced it
type ScoredDepth = (EngineScore, Option<u32>);

/// Scores gathered from `info` lines of one search
#[derive(Debug, Default)]
struct InfoSnapshot {
    exact: Option<ScoredDepth>,
    bound: Option<ScoredDepth>,
}

impl InfoSnapshot {
    fn score(&self) -> Option<ScoredDepth> {
        self.exact.or(self.bound)
    }
}

fn parse_info_line(line: &str, out: &mut InfoSnapshot) {
    let mut depth = None;
    let mut score = None;
    let mut is_bound = false;

    let mut it = line.split_whitespace();
    // skip leading "info"
    let _ = it.next();
    while let Some(tok) = it.next() {
        match tok {
            "depth" => depth = it.next().and_then(|s| s.parse::<u32>().ok()),
            "multipv" => {
                // Only the principal line carries the position's score
                if it.next() != Some("1") {
                    return;
                }
            }
            "score" => {
                score = match (it.next(), it.next().and_then(|s| s.parse::<i32>().ok())) {
                    (Some("cp"), Some(v)) => Some(EngineScore::Centipawns(v)),
                    (Some("mate"), Some(v)) => Some(EngineScore::Mate(v)),
                    _ => None,
                };
            }
            "lowerbound" | "upperbound" => is_bound = true,
            // Free text and the move list follow; nothing else to read
            "string" | "pv" => break,
            _ => {}
        }
    }

    if let Some(score) = score {
        if is_bound {
            out.bound = Some((score, depth));
        } else {
            out.exact = Some((score, depth));
        }
    }
}

/// UCI engine running as a child process.
///
/// The process is started once and reused for every evaluation of a run.
/// Dropping the engine sends `quit` and reaps the process, killing it if it
/// does not exit promptly.
pub struct UciEngine {
    process: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    name: Option<String>,
    closed: bool,
}

impl UciEngine {
    pub fn spawn(config: &EngineConfig) -> Result<Self> {
        let mut process = Command::new(&config.path)
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| engine_error!("failed to start {}: {}", config.path.display(), e))?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| engine_error!("failed to get engine stdin"))?;
        let stdout = BufReader::new(
            process
                .stdout
                .take()
                .ok_or_else(|| engine_error!("failed to get engine stdout"))?,
        );

        let mut engine = Self {
            process,
            stdin,
            stdout,
            name: None,
            closed: false,
        };
        engine.initialize(config)?;

        debug!(
            "engine {} ready (hash {} MB, {} threads)",
            engine.name.as_deref().unwrap_or("<unnamed>"),
            config.hash_mb,
            config.threads
        );
        Ok(engine)
    }

    fn initialize(&mut self, config: &EngineConfig) -> Result<()> {
        self.send_command("uci")?;
        loop {
            let response = self.read_response()?;
            if let Some(name) = response.strip_prefix("id name ") {
                self.name = Some(name.to_string());
            } else if response == "uciok" {
                break;
            }
        }

        self.send_command(&format!("setoption name Hash value {}", config.hash_mb))?;
        self.send_command(&format!("setoption name Threads value {}", config.threads))?;
        for (name, value) in &config.options {
            self.send_command(&format!("setoption name {name} value {value}"))?;
        }

        self.sync_ready()
    }

    /// Engine name from `id name`, if it sent one
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn send_command(&mut self, command: &str) -> Result<()> {
        trace!("> {command}");
        writeln!(self.stdin, "{command}")
            .map_err(|e| engine_error!("send failed: {}", e))?;
        self.stdin
            .flush()
            .map_err(|e| engine_error!("flush failed: {}", e))
    }

    fn read_response(&mut self) -> Result<String> {
        let mut line = String::new();
        let read = self
            .stdout
            .read_line(&mut line)
            .map_err(|e| engine_error!("read failed: {}", e))?;
        if read == 0 {
            return Err(engine_error!("engine closed its output"));
        }
        let line = line.trim().to_string();
        trace!("< {line}");
        Ok(line)
    }

    fn sync_ready(&mut self) -> Result<()> {
        self.send_command("isready")?;
        loop {
            if self.read_response()? == "readyok" {
                return Ok(());
            }
        }
    }

    /// Quit the engine and wait for the process to exit
    pub fn close(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        // The engine may already be gone; reaping it below is what matters
        let _ = self.send_command("quit");
        let deadline = Instant::now() + Duration::from_millis(500);
        while Instant::now() < deadline {
            if self.process.try_wait()?.is_some() {
                return Ok(());
            }
            thread::sleep(Duration::from_millis(10));
        }

        warn!("engine did not exit after quit, killing it");
        self.process.kill()?;
        self.process.wait()?;
        Ok(())
    }
}

impl EngineOracle for UciEngine {
    fn new_game(&mut self) -> Result<()> {
        self.send_command("ucinewgame")?;
        self.sync_ready()
    }

    fn evaluate(&mut self, position: &UciPosition, depth: u8) -> Result<Evaluation> {
        self.send_command(&position.command())?;
        self.send_command(&format!("go depth {depth}"))?;

        let mut info = InfoSnapshot::default();
        loop {
            let response = self.read_response()?;
            if response.starts_with("info") {
                parse_info_line(&response, &mut info);
            } else if let Some(rest) = response.strip_prefix("bestmove") {
                let best_move = rest
                    .split_whitespace()
                    .next()
                    .filter(|m| *m != "(none)")
                    .map(str::to_string);
                let (score, depth) = info.score().ok_or_else(|| {
                    engine_error!("search finished without a score: {}", position.command())
                })?;
                return Ok(Evaluation {
                    score,
                    depth,
                    best_move,
                });
            }
        }
    }
}

impl Drop for UciEngine {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!("engine shutdown failed: {e}");
        }
    }
}

/// Both scores of one analyzed move, from the mover's point of view
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveEvaluation {
    /// Engine's evaluation of the position before the move
    pub best_score: Option<i32>,
    /// Evaluation of the position after the move actually played
    pub played_score: Option<i32>,
    pub before: Evaluation,
    pub after: Evaluation,
}

/// Runs the two fixed-depth searches that score a played move
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionEvaluator {
    depth: u8,
    mate_policy: MatePolicy,
}

impl PositionEvaluator {
    pub fn new(depth: u8, mate_policy: MatePolicy) -> Self {
        Self { depth, mate_policy }
    }

    pub fn depth(&self) -> u8 {
        self.depth
    }

    /// Evaluate the position before `chess_move` (mover to play) and after it
    /// (opponent to play). Both scores are expressed for `mover`, so their
    /// difference is the loss caused by the move.
    pub fn evaluate_move<E: EngineOracle + ?Sized>(
        &self,
        engine: &mut E,
        before: &UciPosition,
        mover: Color,
        chess_move: ChessMove,
    ) -> Result<MoveEvaluation> {
        let before_eval = engine.evaluate(before, self.depth)?;

        let mut after = before.clone();
        after.push(chess_move);
        let after_eval = engine.evaluate(&after, self.depth)?;

        let best_score = normalize(before_eval.score, mover, mover, self.mate_policy);
        let played_score = normalize(after_eval.score, !mover, mover, self.mate_policy);

        Ok(MoveEvaluation {
            best_score,
            played_score,
            before: before_eval,
            after: after_eval,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AnalysisError;
    use chess::Square;
    use std::collections::VecDeque;

    /// Replays canned scores and records the positions it was asked about
    struct ScriptedEngine {
        scores: VecDeque<EngineScore>,
        seen: Vec<String>,
    }

    impl EngineOracle for ScriptedEngine {
        fn evaluate(&mut self, position: &UciPosition, depth: u8) -> Result<Evaluation> {
            self.seen.push(position.command());
            let score = self
                .scores
                .pop_front()
                .ok_or_else(|| engine_error!("script exhausted"))?;
            Ok(Evaluation {
                score,
                depth: Some(depth as u32),
                best_move: None,
            })
        }
    }

    fn e2e4() -> ChessMove {
        ChessMove::new(Square::E2, Square::E4, None)
    }

    #[test]
    fn test_position_command() {
        let mut position = UciPosition::startpos();
        assert_eq!(position.command(), "position startpos");
        position.push(e2e4());
        assert_eq!(position.command(), "position startpos moves e2e4");

        let position = UciPosition::from_fen("4k3/8/8/8/8/8/4P3/4K3 w - - 0 1");
        assert_eq!(position.command(), "position fen 4k3/8/8/8/8/8/4P3/4K3 w - - 0 1");
    }

    #[test]
    fn test_parse_info_keeps_last_exact_score() {
        let mut info = InfoSnapshot::default();
        parse_info_line("info depth 1 seldepth 1 multipv 1 score cp 29 nodes 20 pv e2e4", &mut info);
        parse_info_line("info depth 2 score cp 41 lowerbound nodes 80 pv d2d4", &mut info);
        parse_info_line("info depth 2 multipv 2 score cp -15 pv g1f3", &mut info);
        parse_info_line("info string NNUE evaluation using nn-1.nnue score cp 999", &mut info);

        // The bound line is deeper but the exact score keeps its own depth
        assert_eq!(info.exact, Some((EngineScore::Centipawns(29), Some(1))));
        assert_eq!(info.bound, Some((EngineScore::Centipawns(41), Some(2))));
        assert_eq!(info.score(), Some((EngineScore::Centipawns(29), Some(1))));

        parse_info_line("info depth 3 score mate -2 pv e1e2", &mut info);
        assert_eq!(info.score(), Some((EngineScore::Mate(-2), Some(3))));
    }

    #[test]
    fn test_bound_score_used_only_without_exact() {
        let mut info = InfoSnapshot::default();
        parse_info_line("info depth 7 score cp 55 upperbound pv e2e4", &mut info);
        assert_eq!(info.score(), Some((EngineScore::Centipawns(55), Some(7))));

        parse_info_line("info depth 6 score cp 48 pv e2e4", &mut info);
        parse_info_line("info depth 8 score cp 70 lowerbound pv e2e4", &mut info);
        assert_eq!(info.score(), Some((EngineScore::Centipawns(48), Some(6))));
    }

    #[test]
    fn test_evaluate_move_uses_mover_perspective() {
        // Before: White to move, +120 for White. After: Black to move, -80
        // for Black is +80 for White.
        let mut engine = ScriptedEngine {
            scores: VecDeque::from(vec![
                EngineScore::Centipawns(120),
                EngineScore::Centipawns(-80),
            ]),
            seen: Vec::new(),
        };
        let evaluator = PositionEvaluator::new(20, MatePolicy::Exclude);

        let result = evaluator
            .evaluate_move(&mut engine, &UciPosition::startpos(), Color::White, e2e4())
            .unwrap();

        assert_eq!(result.best_score, Some(120));
        assert_eq!(result.played_score, Some(80));
        assert_eq!(
            engine.seen,
            vec!["position startpos", "position startpos moves e2e4"]
        );
    }

    #[test]
    fn test_evaluate_move_mate_policy() {
        let scores = vec![EngineScore::Mate(2), EngineScore::Mate(-1)];

        let mut engine = ScriptedEngine {
            scores: VecDeque::from(scores.clone()),
            seen: Vec::new(),
        };
        let excluded = PositionEvaluator::new(10, MatePolicy::Exclude)
            .evaluate_move(&mut engine, &UciPosition::startpos(), Color::Black, e2e4())
            .unwrap();
        assert_eq!(excluded.best_score, None);
        assert_eq!(excluded.played_score, None);

        let mut engine = ScriptedEngine {
            scores: VecDeque::from(scores),
            seen: Vec::new(),
        };
        let saturated = PositionEvaluator::new(10, MatePolicy::Saturate(1000))
            .evaluate_move(&mut engine, &UciPosition::startpos(), Color::Black, e2e4())
            .unwrap();
        // Opponent being mated after the move is a win for the mover
        assert_eq!(saturated.best_score, Some(1000));
        assert_eq!(saturated.played_score, Some(1000));
    }

    #[test]
    fn test_engine_error_propagates() {
        let mut engine = ScriptedEngine {
            scores: VecDeque::from(vec![EngineScore::Centipawns(0)]),
            seen: Vec::new(),
        };
        let err = PositionEvaluator::new(10, MatePolicy::Exclude)
            .evaluate_move(&mut engine, &UciPosition::startpos(), Color::White, e2e4())
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Engine(_)));
    }

    #[test]
    fn test_spawn_missing_binary_fails() {
        let config = EngineConfig::default().with_path("/nonexistent/engine-binary");
        match UciEngine::spawn(&config) {
            Err(AnalysisError::Engine(msg)) => assert!(msg.contains("failed to start")),
            Err(other) => panic!("Expected Engine error, got {other}"),
            Ok(_) => panic!("spawn should fail"),
        }
    }
}
