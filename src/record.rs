//! Per-player CSV records of analyzed moves.

use crate::errors::{AnalysisError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Column order of the per-player file
pub const RECORD_HEADER: [&str; 8] = [
    "game_id",
    "move_number",
    "player",
    "clock",
    "move",
    "best_score",
    "played_score",
    "engine_depth",
];

/// One analyzed time-pressure move
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveRecord {
    pub game_id: String,
    /// 0-based ply index within the game
    pub move_number: usize,
    pub player: String,
    /// Mover's clock at the start of the move, seconds (one decimal)
    pub clock: f64,
    /// Move in UCI notation
    #[serde(rename = "move")]
    pub played_move: String,
    /// Before the move, mover's perspective; empty if excluded
    pub best_score: Option<i32>,
    /// After the move, mover's perspective; empty if excluded
    pub played_score: Option<i32>,
    pub engine_depth: u8,
}

/// Round a clock reading to tenths of a second for storage
pub fn round_clock(seconds: f64) -> f64 {
    (seconds * 10.0).round() / 10.0
}

/// Writes [`MoveRecord`] rows, header first even when no row follows
pub struct RecordWriter<W: Write> {
    writer: csv::Writer<W>,
    rows: usize,
}

impl RecordWriter<File> {
    /// Create (or truncate) the file at `path`
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::new(File::create(path)?)
    }
}

impl<W: Write> RecordWriter<W> {
    pub fn new(inner: W) -> Result<Self> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(inner);
        writer.write_record(RECORD_HEADER)?;
        Ok(Self { writer, rows: 0 })
    }

    pub fn write(&mut self, record: &MoveRecord) -> Result<()> {
        self.writer.serialize(record)?;
        self.rows += 1;
        Ok(())
    }

    /// Push buffered rows to the underlying writer
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn rows_written(&self) -> usize {
        self.rows
    }

    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| AnalysisError::Io(e.into_error()))
    }
}

/// Read every row of a per-player file
pub fn read_records<P: AsRef<Path>>(path: P) -> Result<Vec<MoveRecord>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut records = Vec::new();
    for row in reader.deserialize() {
        records.push(row?);
    }
    Ok(records)
}
