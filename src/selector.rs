//! Time-pressure move selection.

use crate::pgn::GameHeaders;
use chess::Color;

/// Default pressure threshold in seconds
pub const DEFAULT_PRESSURE_SECONDS: f64 = 10.0;

/// Which side of a game, if any, the tracked player had
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackedSide {
    Side(Color),
    /// The player does not appear in the headers
    Absent,
    /// Both White and Black carry the player's name
    Ambiguous,
}

impl TrackedSide {
    /// Resolve the tracked player's side strictly from header identity
    pub fn from_headers(headers: &GameHeaders, player: &str) -> Self {
        let is_white = headers.white.as_deref() == Some(player);
        let is_black = headers.black.as_deref() == Some(player);
        match (is_white, is_black) {
            (true, false) => TrackedSide::Side(Color::White),
            (false, true) => TrackedSide::Side(Color::Black),
            (false, false) => TrackedSide::Absent,
            (true, true) => TrackedSide::Ambiguous,
        }
    }

    pub fn color(self) -> Option<Color> {
        match self {
            TrackedSide::Side(color) => Some(color),
            TrackedSide::Absent | TrackedSide::Ambiguous => None,
        }
    }
}

/// Decides which plies are worth an engine evaluation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimePressureSelector {
    threshold_seconds: f64,
}

impl TimePressureSelector {
    pub fn new(threshold_seconds: f64) -> Self {
        Self { threshold_seconds }
    }

    /// A ply is selected when the tracked player made it and started the
    /// move with strictly less than the threshold on the clock
    pub fn select(&self, mover: Color, tracked: TrackedSide, start_of_move: f64) -> bool {
        tracked.color() == Some(mover) && start_of_move < self.threshold_seconds
    }
}

impl Default for TimePressureSelector {
    fn default() -> Self {
        Self::new(DEFAULT_PRESSURE_SECONDS)
    }
}
