//! # Time Pressure Analyzer
//!
//! Measures how well chess players move when their clock runs low.
//!
//! Games are replayed from PGN files carrying `[%clk ...]` annotations. Every
//! move the tracked player started with less than the pressure threshold
//! (10 seconds by default) is evaluated by a UCI engine twice, before and
//! after the move, both from the mover's point of view. The difference is the
//! centipawn loss of that move.
//!
//! ## Pipeline
//!
//! 1. [`runner::Runner`] analyzes each player on a rayon pool, one engine
//!    process and one `<username>_time_pressure.csv` file per player.
//! 2. [`aggregate::run_aggregation`] reads those files back and writes
//!    `summary.csv`, `summary_under_5s.csv` and `summary_critical.csv`.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use time_pressure_analyzer::{run_aggregation, PlayerEntry, RunConfig, Runner};
//!
//! let config = RunConfig {
//!     players: vec![PlayerEntry::new("Magnus Carlsen", "MagnusCarlsen")],
//!     ..RunConfig::default()
//! };
//!
//! let report = Runner::new(&config).run()?;
//! println!("{} players analyzed", report.completed().count());
//!
//! let summaries = run_aggregation(&config)?;
//! for row in &summaries.overall {
//!     println!("{}: {:.1} cp", row.player, row.avg_cp_loss);
//! }
//! # Ok::<(), time_pressure_analyzer::AnalysisError>(())
//! ```

pub mod errors;

pub mod aggregate;
pub mod analysis;
pub mod clock;
pub mod config;
pub mod engine;
pub mod pgn;
pub mod record;
pub mod runner;
pub mod score;
pub mod selector;

pub use aggregate::{run_aggregation, MoveMetrics, Summaries, SummaryRow};
pub use analysis::{GameAnalyzer, GameReport, PlayerReport};
pub use clock::ClockTracker;
pub use config::{AggregateConfig, AnalysisConfig, BucketMode, EngineConfig, PlayerEntry, RunConfig};
pub use engine::{EngineOracle, Evaluation, PositionEvaluator, UciEngine, UciPosition};
pub use errors::{AnalysisError, Result};
pub use pgn::{GameRecord, PgnGames};
pub use record::{MoveRecord, RecordWriter};
pub use runner::{PlayerOutcome, RunReport, Runner};
pub use score::{EngineScore, MatePolicy};
pub use selector::TimePressureSelector;
