//! Game replay for one tracked player.
//!
//! Every ply of a game advances the clock tracker and the engine position.
//! Only plies selected as time-pressure moves of the tracked player reach the
//! engine, which is where nearly all of the run time goes.

use crate::clock::ClockTracker;
use crate::config::AnalysisConfig;
use crate::engine::{EngineOracle, PositionEvaluator, UciPosition};
use crate::errors::{AnalysisError, Result};
use crate::pgn::{GameRecord, PgnGames};
use crate::record::{round_clock, MoveRecord, RecordWriter};
use crate::selector::{TimePressureSelector, TrackedSide};
use log::{debug, info, warn};
use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::Instant;

/// Outcome of replaying one game
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GameReport {
    pub plies: usize,
    /// Plies sent to the engine, one row each
    pub selected: usize,
    /// Rows written with at least one score left empty by the mate policy
    pub incomplete: usize,
}

/// Totals for one player file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerReport {
    pub player: String,
    pub games: usize,
    /// Games where the player appeared on exactly one side
    pub tracked_games: usize,
    /// Games dropped for an illegal move or a malformed clock
    pub rejected_games: usize,
    pub plies: usize,
    pub rows: usize,
    pub incomplete_rows: usize,
}

impl PlayerReport {
    fn add_game(&mut self, game: GameReport) {
        self.plies += game.plies;
        self.rows += game.selected;
        self.incomplete_rows += game.incomplete;
    }
}

/// Replays games of one player against an engine
pub struct GameAnalyzer<'a> {
    player: &'a str,
    config: AnalysisConfig,
    selector: TimePressureSelector,
    evaluator: PositionEvaluator,
}

impl<'a> GameAnalyzer<'a> {
    pub fn new(player: &'a str, config: AnalysisConfig) -> Self {
        Self {
            player,
            config,
            selector: TimePressureSelector::new(config.pressure_threshold),
            evaluator: PositionEvaluator::new(config.depth, config.mate_policy),
        }
    }

    /// Replay one game, writing a row for every selected ply
    pub fn analyze_game<E, W>(
        &self,
        game: &GameRecord,
        engine: &mut E,
        writer: &mut RecordWriter<W>,
    ) -> Result<GameReport>
    where
        E: EngineOracle + ?Sized,
        W: Write,
    {
        let mut report = GameReport {
            plies: game.plies.len(),
            ..GameReport::default()
        };

        let tracked = TrackedSide::from_headers(&game.headers, self.player);
        match tracked {
            TrackedSide::Side(_) => {}
            TrackedSide::Absent => {
                debug!("{} does not play in {}", self.player, game.headers.game_id());
                return Ok(report);
            }
            TrackedSide::Ambiguous => {
                warn!(
                    "{} is named as both White and Black in {}, skipping",
                    self.player,
                    game.headers.game_id()
                );
                return Ok(report);
            }
        }

        let game_id = game.headers.game_id();
        let mut clock = ClockTracker::new(self.config.initial_clock);
        let mut position = match &game.headers.fen {
            Some(fen) => UciPosition::from_fen(fen.clone()),
            None => UciPosition::startpos(),
        };
        let mut engine_ready = false;

        for (move_number, ply) in game.plies.iter().enumerate() {
            let start_of_move = clock.observe(ply.mover, ply.clock);

            if self.selector.select(ply.mover, tracked, start_of_move) {
                if !engine_ready {
                    engine.new_game()?;
                    engine_ready = true;
                }

                let evaluation =
                    self.evaluator
                        .evaluate_move(&mut *engine, &position, ply.mover, ply.chess_move)?;
                debug!(
                    "{} ply {} {}: {} (depth {:?}, best {:?}) -> {} (depth {:?})",
                    game_id,
                    move_number,
                    ply.san,
                    evaluation.before.score,
                    evaluation.before.depth,
                    evaluation.before.best_move,
                    evaluation.after.score,
                    evaluation.after.depth
                );
                if evaluation.best_score.is_none() || evaluation.played_score.is_none() {
                    report.incomplete += 1;
                }

                writer.write(&MoveRecord {
                    game_id: game_id.clone(),
                    move_number,
                    player: self.player.to_string(),
                    clock: round_clock(start_of_move),
                    played_move: ply.chess_move.to_string(),
                    best_score: evaluation.best_score,
                    played_score: evaluation.played_score,
                    engine_depth: self.evaluator.depth(),
                })?;
                report.selected += 1;
            }

            position.push(ply.chess_move);
        }

        Ok(report)
    }

    /// Analyze every game of `input`, replacing `output` with the rows found.
    ///
    /// Rejected games are logged and skipped. An engine or I/O failure stops
    /// the run; rows of the games completed before it stay in `output`.
    pub fn analyze_file<E>(&self, input: &Path, output: &Path, engine: &mut E) -> Result<PlayerReport>
    where
        E: EngineOracle + ?Sized,
    {
        let started = Instant::now();
        if let Some(dir) = output.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }

        let games = PgnGames::open(input)?;
        let mut writer = RecordWriter::create(output)?;
        let mut report = PlayerReport {
            player: self.player.to_string(),
            ..PlayerReport::default()
        };

        for (index, game) in games.enumerate() {
            report.games += 1;
            let game = match game {
                Ok(game) => game,
                Err(AnalysisError::Io(e)) => return Err(AnalysisError::Io(e)),
                Err(e) => {
                    warn!("{}: rejecting game {} of {}: {}", self.player, index + 1, input.display(), e);
                    report.rejected_games += 1;
                    continue;
                }
            };

            if TrackedSide::from_headers(&game.headers, self.player).color().is_some() {
                report.tracked_games += 1;
            }

            let game_report = self
                .analyze_game(&game, &mut *engine, &mut writer)
                .map_err(|e| e.context(format!("game {} ({})", index + 1, game.headers.game_id())))?;
            report.add_game(game_report);
            writer.flush()?;
        }
        writer.flush()?;

        info!(
            "{}: analyzed {} games ({} played, {} rejected), {} plies, {} time-pressure moves ({} without both scores) in {:.1}s -> {}",
            self.player,
            report.games,
            report.tracked_games,
            report.rejected_games,
            report.plies,
            report.rows,
            report.incomplete_rows,
            started.elapsed().as_secs_f64(),
            output.display()
        );
        Ok(report)
    }
}
