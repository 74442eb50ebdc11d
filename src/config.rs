//! Run configuration.
//!
//! Every option has a default, so an empty TOML file (or none at all) gives
//! the standard three-minute analysis. Command line flags are applied on top
//! of whatever the file sets.

use crate::clock::DEFAULT_INITIAL_SECONDS;
use crate::config_error;
use crate::errors::{AnalysisError, Result};
use crate::score::MatePolicy;
use crate::selector::DEFAULT_PRESSURE_SECONDS;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// UCI engine process settings
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub path: PathBuf,
    pub args: Vec<String>,
    /// Transposition table size in MB
    pub hash_mb: u32,
    pub threads: u32,
    /// Extra `setoption` pairs sent after Hash and Threads
    pub options: BTreeMap<String, String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("stockfish"), // Assume stockfish in PATH
            args: Vec::new(),
            hash_mb: 1300,
            threads: 1,
            options: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    pub fn with_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_hash_mb(mut self, hash_mb: u32) -> Self {
        self.hash_mb = hash_mb;
        self
    }

    pub fn with_threads(mut self, threads: u32) -> Self {
        self.threads = threads;
        self
    }
}

/// Replay and selection settings for the per-player pass
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Moves started with less than this many seconds are evaluated
    pub pressure_threshold: f64,
    /// Clock both sides start every game with
    pub initial_clock: f64,
    /// Fixed engine search depth
    pub depth: u8,
    pub mate_policy: MatePolicy,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            pressure_threshold: DEFAULT_PRESSURE_SECONDS,
            initial_clock: DEFAULT_INITIAL_SECONDS,
            depth: 20,
            mate_policy: MatePolicy::Exclude,
        }
    }
}

impl AnalysisConfig {
    pub fn with_pressure_threshold(mut self, seconds: f64) -> Self {
        self.pressure_threshold = seconds;
        self
    }

    pub fn with_initial_clock(mut self, seconds: f64) -> Self {
        self.initial_clock = seconds;
        self
    }

    pub fn with_depth(mut self, depth: u8) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_mate_policy(mut self, policy: MatePolicy) -> Self {
        self.mate_policy = policy;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.pressure_threshold.is_finite() && self.pressure_threshold > 0.0) {
            return Err(config_error!(
                "pressure threshold must be positive, got {}",
                self.pressure_threshold
            ));
        }
        if !(self.initial_clock.is_finite() && self.initial_clock >= 0.0) {
            return Err(config_error!(
                "initial clock must be non-negative, got {}",
                self.initial_clock
            ));
        }
        if self.depth == 0 {
            return Err(config_error!("search depth must be at least 1"));
        }
        if let MatePolicy::Saturate(limit) = self.mate_policy {
            if limit <= 0 {
                return Err(config_error!("mate saturation limit must be positive, got {}", limit));
            }
        }
        Ok(())
    }
}

/// How the under-5s and critical buckets relate to each other
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketMode {
    /// Each bucket is an independent filter; a move can be in both
    #[default]
    Overlapping,
    /// A move that qualifies for both buckets is counted in neither subset
    Exclusive,
}

/// Settings for the summary pass
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct AggregateConfig {
    /// Moves with |best_score| below this are critical
    pub critical_threshold: i32,
    /// Clock below which a move counts as very low time
    pub secondary_threshold: f64,
    pub bucket_mode: BucketMode,
}

impl Default for AggregateConfig {
    fn default() -> Self {
        Self {
            critical_threshold: 100,
            secondary_threshold: 5.0,
            bucket_mode: BucketMode::Overlapping,
        }
    }
}

/// A tracked player: display name for summaries, account name for files and
/// PGN headers
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PlayerEntry {
    pub name: String,
    pub username: String,
}

impl PlayerEntry {
    pub fn new(name: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            username: username.into(),
        }
    }

    /// Entry whose display name is the username itself
    pub fn from_username(username: impl Into<String>) -> Self {
        let username = username.into();
        Self {
            name: username.clone(),
            username,
        }
    }
}

/// Everything one invocation needs
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Appended to the username to form the PGN file name
    pub input_suffix: String,
    /// Worker count; defaults to min(players, cores)
    pub jobs: Option<usize>,
    pub players: Vec<PlayerEntry>,
    pub analysis: AnalysisConfig,
    pub engine: EngineConfig,
    pub aggregate: AggregateConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("pgns"),
            output_dir: PathBuf::from("time_pressure_analysis"),
            input_suffix: ".pgn".to_string(),
            jobs: None,
            players: Vec::new(),
            analysis: AnalysisConfig::default(),
            engine: EngineConfig::default(),
            aggregate: AggregateConfig::default(),
        }
    }
}

impl RunConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: RunConfig = toml::from_str(text)?;
        config.analysis.validate()?;
        Ok(config)
    }

    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| AnalysisError::from(e).context(format!("Reading {}", path.display())))?;
        Self::from_toml_str(&text).map_err(|e| e.context(format!("Loading {}", path.display())))
    }

    pub fn input_path(&self, player: &PlayerEntry) -> PathBuf {
        self.input_dir
            .join(format!("{}{}", player.username, self.input_suffix))
    }

    pub fn output_path(&self, player: &PlayerEntry) -> PathBuf {
        self.output_dir
            .join(format!("{}_time_pressure.csv", player.username))
    }

    /// Number of per-player workers to run
    pub fn worker_count(&self) -> usize {
        let cap = self.jobs.unwrap_or_else(num_cpus::get);
        cap.min(self.players.len()).max(1)
    }
}
