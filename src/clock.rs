//! Clock annotations and per-game clock reconstruction.
//!
//! Online game exports attach the mover's remaining time to each move as a
//! `[%clk H:MM:SS]` comment. The time a player had available when starting a
//! move is the value left by their previous annotated move, so the tracker
//! reports the stored value before overwriting it.

use crate::clock_error;
use crate::errors::Result;
use chess::Color;

/// Default starting allotment: a three minute game
pub const DEFAULT_INITIAL_SECONDS: f64 = 180.0;

const CLOCK_TAG: &str = "[%clk";

/// Find and parse the `[%clk ...]` command inside a move comment.
///
/// Returns `Ok(None)` when the comment carries no clock command.
pub fn extract_clock(comment: &str) -> Result<Option<f64>> {
    let Some(start) = comment.find(CLOCK_TAG) else {
        return Ok(None);
    };
    let rest = &comment[start + CLOCK_TAG.len()..];
    let end = rest
        .find(']')
        .ok_or_else(|| clock_error!(comment.trim(), "missing closing bracket"))?;

    parse_clock(rest[..end].trim()).map(Some)
}

/// Parse `H:MM:SS` (or `MM:SS`) into seconds. Every field may be fractional.
pub fn parse_clock(text: &str) -> Result<f64> {
    let fields: Vec<&str> = text.split(':').collect();
    if !(2..=3).contains(&fields.len()) {
        return Err(clock_error!(text, "expected H:MM:SS"));
    }

    let mut seconds = 0.0;
    for field in &fields {
        let value: f64 = field
            .trim()
            .parse()
            .map_err(|_| clock_error!(text, format!("invalid field '{field}'")))?;
        if !value.is_finite() || value < 0.0 {
            return Err(clock_error!(text, format!("field '{field}' out of range")));
        }
        seconds = seconds * 60.0 + value;
    }

    Ok(seconds)
}

/// Remaining time of both sides during the replay of one game
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockTracker {
    white: f64,
    black: f64,
}

impl ClockTracker {
    pub fn new(initial_seconds: f64) -> Self {
        Self {
            white: initial_seconds,
            black: initial_seconds,
        }
    }

    /// Record the ply just played by `mover` and return the time `mover` had
    /// at the start of it. Without an annotation the stored time carries
    /// forward unchanged.
    pub fn observe(&mut self, mover: Color, annotation: Option<f64>) -> f64 {
        let slot = match mover {
            Color::White => &mut self.white,
            Color::Black => &mut self.black,
        };
        let start_of_move = *slot;
        if let Some(remaining) = annotation {
            *slot = remaining;
        }
        start_of_move
    }

    pub fn remaining(&self, side: Color) -> f64 {
        match side {
            Color::White => self.white,
            Color::Black => self.black,
        }
    }
}

impl Default for ClockTracker {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL_SECONDS)
    }
}
