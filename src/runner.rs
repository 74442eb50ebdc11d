//! Parallel per-player analysis.
//!
//! Each player is one task on a fixed-size rayon pool. A task owns its engine
//! and its output file, so tasks share nothing and results meet only on disk.

use crate::analysis::{GameAnalyzer, PlayerReport};
use crate::config::{PlayerEntry, RunConfig};
use crate::config_error;
use crate::engine::{EngineOracle, UciEngine};
use crate::errors::{AnalysisError, Result};
use indicatif::ProgressBar;
use log::{error, info, warn};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// What happened to one player
#[derive(Debug)]
pub enum PlayerOutcome {
    Completed(PlayerReport),
    /// Input file not found; nothing was written
    MissingInput(PathBuf),
    /// Aborted; rows of games finished before the failure remain on disk
    Failed(AnalysisError),
}

#[derive(Debug)]
pub struct PlayerRun {
    pub player: PlayerEntry,
    pub outcome: PlayerOutcome,
}

/// Results of one run, in roster order
#[derive(Debug, Default)]
pub struct RunReport {
    pub players: Vec<PlayerRun>,
}

impl RunReport {
    pub fn completed(&self) -> impl Iterator<Item = (&PlayerEntry, &PlayerReport)> {
        self.players.iter().filter_map(|run| match &run.outcome {
            PlayerOutcome::Completed(report) => Some((&run.player, report)),
            _ => None,
        })
    }

    pub fn failures(&self) -> impl Iterator<Item = (&PlayerEntry, &AnalysisError)> {
        self.players.iter().filter_map(|run| match &run.outcome {
            PlayerOutcome::Failed(e) => Some((&run.player, e)),
            _ => None,
        })
    }

    pub fn missing(&self) -> usize {
        self.players
            .iter()
            .filter(|run| matches!(run.outcome, PlayerOutcome::MissingInput(_)))
            .count()
    }
}

/// Runs the per-player pass over a roster
pub struct Runner<'a> {
    config: &'a RunConfig,
    progress: ProgressBar,
}

impl<'a> Runner<'a> {
    pub fn new(config: &'a RunConfig) -> Self {
        Self {
            config,
            progress: ProgressBar::hidden(),
        }
    }

    /// Advance `progress` once per finished player
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Analyze every player with a UCI engine process each
    pub fn run(&self) -> Result<RunReport> {
        let engine_config = &self.config.engine;
        self.run_tasks(|player, analyzer, input, output| {
            let mut engine = UciEngine::spawn(engine_config)?;
            if let Some(name) = engine.name() {
                info!("{}: engine {}", player.name, name);
            }
            let report = analyzer.analyze_file(input, output, &mut engine)?;
            engine.close()?;
            Ok(report)
        })
    }

    /// Analyze every player with engines built by `factory`
    pub fn run_with<E, F>(&self, factory: F) -> Result<RunReport>
    where
        E: EngineOracle,
        F: Fn(&PlayerEntry) -> Result<E> + Sync,
    {
        self.run_tasks(|player, analyzer, input, output| {
            let mut engine = factory(player)?;
            analyzer.analyze_file(input, output, &mut engine)
        })
    }

    fn run_tasks<F>(&self, task: F) -> Result<RunReport>
    where
        F: Fn(&PlayerEntry, &GameAnalyzer<'_>, &Path, &Path) -> Result<PlayerReport> + Sync,
    {
        let config = self.config;
        config.analysis.validate()?;
        if config.players.is_empty() {
            return Err(config_error!("no players configured"));
        }
        fs::create_dir_all(&config.output_dir)?;

        let workers = config.worker_count();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|e| config_error!("Failed to build worker pool: {}", e))?;

        info!(
            "Analyzing {} players with {} workers (depth {}, threshold {}s)",
            config.players.len(),
            workers,
            config.analysis.depth,
            config.analysis.pressure_threshold
        );
        self.progress.set_length(config.players.len() as u64);
        let started = Instant::now();

        let players: Vec<PlayerRun> = pool.install(|| {
            config
                .players
                .par_iter()
                .map(|player| {
                    let outcome = self.run_player(player, &task);
                    self.progress.inc(1);
                    PlayerRun {
                        player: player.clone(),
                        outcome,
                    }
                })
                .collect()
        });

        self.progress.finish_and_clear();
        let report = RunReport { players };
        info!(
            "Finished {} players in {:.1}s ({} missing, {} failed)",
            report.completed().count(),
            started.elapsed().as_secs_f64(),
            report.missing(),
            report.failures().count()
        );
        Ok(report)
    }

    fn run_player<F>(&self, player: &PlayerEntry, task: &F) -> PlayerOutcome
    where
        F: Fn(&PlayerEntry, &GameAnalyzer<'_>, &Path, &Path) -> Result<PlayerReport> + Sync,
    {
        let input = self.config.input_path(player);
        if !input.exists() {
            warn!("Missing file: {}", input.display());
            return PlayerOutcome::MissingInput(input);
        }

        self.progress.set_message(player.name.clone());
        let output = self.config.output_path(player);
        let analyzer = GameAnalyzer::new(&player.username, self.config.analysis);

        match task(player, &analyzer, &input, &output) {
            Ok(report) => PlayerOutcome::Completed(report),
            Err(e) => {
                error!("{}: {}", player.name, e);
                PlayerOutcome::Failed(e.context(format!("Analyzing {}", player.name)))
            }
        }
    }
}
