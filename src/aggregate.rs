//! Second pass: per-player summaries over all emitted records.
//!
//! Rows missing either score are dropped before any metric is computed. The
//! remaining rows are grouped by player display name and averaged; summaries
//! are ordered by ascending mean centipawn loss, ties broken by name.

use crate::config::{AggregateConfig, BucketMode, PlayerEntry, RunConfig};
use crate::errors::{AnalysisError, Result};
use crate::record::{read_records, MoveRecord};
use log::{info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Derived quantities of one usable record
#[derive(Debug, Clone, PartialEq)]
pub struct MoveMetrics {
    pub player: String,
    pub clock: f64,
    pub best_score: i32,
    pub played_score: i32,
    pub cp_loss: f64,
    /// Loss relative to how large the best evaluation was
    pub rel_loss: f64,
    pub log_norm_loss: f64,
    pub is_critical: bool,
    pub is_under_5s: bool,
}

impl MoveMetrics {
    /// Compute metrics for `record` under `player`'s display name.
    /// Returns `None` when either score is missing.
    pub fn from_record(record: &MoveRecord, player: &str, config: &AggregateConfig) -> Option<Self> {
        let best = record.best_score?;
        let played = record.played_score?;

        let cp_loss = f64::from(best) - f64::from(played);
        let best_abs = f64::from(best).abs();

        Some(Self {
            player: player.to_string(),
            clock: record.clock,
            best_score: best,
            played_score: played,
            cp_loss,
            rel_loss: cp_loss / (best_abs + 1.0),
            log_norm_loss: cp_loss / (best_abs + 2.0).ln(),
            is_critical: best.unsigned_abs() < config.critical_threshold.unsigned_abs(),
            is_under_5s: record.clock < config.secondary_threshold,
        })
    }
}

/// Which moves a summary covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    All,
    Under5s,
    Critical,
}

impl Bucket {
    fn contains(self, metrics: &MoveMetrics, mode: BucketMode) -> bool {
        match (self, mode) {
            (Bucket::All, _) => true,
            (Bucket::Under5s, BucketMode::Overlapping) => metrics.is_under_5s,
            (Bucket::Critical, BucketMode::Overlapping) => metrics.is_critical,
            (Bucket::Under5s, BucketMode::Exclusive) => metrics.is_under_5s && !metrics.is_critical,
            (Bucket::Critical, BucketMode::Exclusive) => metrics.is_critical && !metrics.is_under_5s,
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            Bucket::All => "summary.csv",
            Bucket::Under5s => "summary_under_5s.csv",
            Bucket::Critical => "summary_critical.csv",
        }
    }
}

/// One line of a summary file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    pub player: String,
    pub avg_cp_loss: f64,
    pub avg_rel_loss: f64,
    pub avg_log_norm_loss: f64,
    pub total_moves: usize,
    pub moves_under_5s: usize,
    pub critical_moves: usize,
}

#[derive(Default)]
struct Accumulator {
    cp_loss: f64,
    rel_loss: f64,
    log_norm_loss: f64,
    count: usize,
    under_5s: usize,
    critical: usize,
}

impl Accumulator {
    fn add(&mut self, metrics: &MoveMetrics) {
        self.cp_loss += metrics.cp_loss;
        self.rel_loss += metrics.rel_loss;
        self.log_norm_loss += metrics.log_norm_loss;
        self.count += 1;
        self.under_5s += usize::from(metrics.is_under_5s);
        self.critical += usize::from(metrics.is_critical);
    }

    fn into_row(self, player: String) -> SummaryRow {
        let n = self.count as f64;
        SummaryRow {
            player,
            avg_cp_loss: self.cp_loss / n,
            avg_rel_loss: self.rel_loss / n,
            avg_log_norm_loss: self.log_norm_loss / n,
            total_moves: self.count,
            moves_under_5s: self.under_5s,
            critical_moves: self.critical,
        }
    }
}

/// Group the moves of `bucket` by player and sort the result
pub fn summarize(metrics: &[MoveMetrics], bucket: Bucket, mode: BucketMode) -> Vec<SummaryRow> {
    let mut groups: BTreeMap<&str, Accumulator> = BTreeMap::new();
    for m in metrics.iter().filter(|m| bucket.contains(m, mode)) {
        groups.entry(m.player.as_str()).or_default().add(m);
    }

    let mut rows: Vec<SummaryRow> = groups
        .into_iter()
        .map(|(player, acc)| acc.into_row(player.to_string()))
        .collect();
    sort_rows(&mut rows);
    rows
}

/// Ascending mean loss, then player name
pub fn sort_rows(rows: &mut [SummaryRow]) {
    rows.sort_by(|a, b| {
        a.avg_cp_loss
            .total_cmp(&b.avg_cp_loss)
            .then_with(|| a.player.cmp(&b.player))
    });
}

/// The three summaries of a run
#[derive(Debug, Clone, PartialEq)]
pub struct Summaries {
    pub overall: Vec<SummaryRow>,
    pub under_5s: Vec<SummaryRow>,
    pub critical: Vec<SummaryRow>,
}

impl Summaries {
    pub fn from_metrics(metrics: &[MoveMetrics], mode: BucketMode) -> Self {
        Self {
            overall: summarize(metrics, Bucket::All, mode),
            under_5s: summarize(metrics, Bucket::Under5s, mode),
            critical: summarize(metrics, Bucket::Critical, mode),
        }
    }

    fn by_bucket(&self) -> [(Bucket, &[SummaryRow]); 3] {
        [
            (Bucket::All, &self.overall),
            (Bucket::Under5s, &self.under_5s),
            (Bucket::Critical, &self.critical),
        ]
    }

    /// Write one CSV per bucket into `dir`, returning the paths written
    pub fn write_to_dir(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(dir)?;
        let mut written = Vec::new();
        for (bucket, rows) in self.by_bucket() {
            let path = dir.join(bucket.file_name());
            write_summary(&path, rows)?;
            written.push(path);
        }
        Ok(written)
    }
}

/// Write summary rows with the standard header
pub fn write_summary(path: &Path, rows: &[SummaryRow]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;
    writer.write_record([
        "player",
        "avg_cp_loss",
        "avg_rel_loss",
        "avg_log_norm_loss",
        "total_moves",
        "moves_under_5s",
        "critical_moves",
    ])?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Load the usable rows of every player file that exists.
///
/// A missing file is a warning. Finding no usable row in any file is fatal.
pub fn load_metrics(config: &RunConfig) -> Result<Vec<MoveMetrics>> {
    let mut metrics = Vec::new();
    let mut files_read = 0;

    for player in &config.players {
        let path = config.output_path(player);
        if !path.exists() {
            warn!("Missing file: {}", path.display());
            continue;
        }
        files_read += 1;
        let loaded = load_player(&path, player, &config.aggregate)?;
        metrics.extend(loaded);
    }

    if metrics.is_empty() {
        warn!("{} of {} player files found, none with usable rows", files_read, config.players.len());
        return Err(AnalysisError::NoData);
    }
    Ok(metrics)
}

fn load_player(path: &Path, player: &PlayerEntry, config: &AggregateConfig) -> Result<Vec<MoveMetrics>> {
    let records = read_records(path).map_err(|e| e.context(format!("Reading {}", path.display())))?;
    let total = records.len();
    let metrics: Vec<MoveMetrics> = records
        .iter()
        .filter_map(|record| MoveMetrics::from_record(record, &player.name, config))
        .collect();

    if metrics.len() < total {
        info!(
            "{}: dropped {} of {} rows without both scores",
            player.name,
            total - metrics.len(),
            total
        );
    }
    Ok(metrics)
}

/// Load every player file, summarize, and write the summary files into the
/// output directory. Nothing is written when no usable data exists.
pub fn run_aggregation(config: &RunConfig) -> Result<Summaries> {
    let metrics = load_metrics(config)?;
    let summaries = Summaries::from_metrics(&metrics, config.aggregate.bucket_mode);

    for path in summaries.write_to_dir(&config.output_dir)? {
        info!("Wrote {}", path.display());
    }
    Ok(summaries)
}
