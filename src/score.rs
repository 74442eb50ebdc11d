//! Engine score normalization.
//!
//! UCI engines report scores relative to the side to move, either as
//! centipawns or as a mate distance. Loss arithmetic needs both scores of a
//! record in centipawns from one fixed side, so every score passes through
//! [`normalize`] before it is stored.

use chess::Color;
use serde::Deserialize;
use std::fmt;

/// Raw score as reported on a UCI `info` line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineScore {
    Centipawns(i32),
    /// Moves to mate; positive if the reporting side mates, negative or zero
    /// if it is being mated
    Mate(i32),
}

impl fmt::Display for EngineScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineScore::Centipawns(cp) => write!(f, "cp {cp}"),
            EngineScore::Mate(n) => write!(f, "mate {n}"),
        }
    }
}

/// What to do with mate scores, which have no centipawn magnitude
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatePolicy {
    /// Leave the score empty; aggregation drops the row
    #[default]
    Exclude,
    /// Map to a fixed centipawn magnitude
    Saturate(i32),
}

impl MatePolicy {
    fn mate_to_centipawns(self, moves: i32) -> Option<i32> {
        match self {
            MatePolicy::Exclude => None,
            MatePolicy::Saturate(limit) => {
                let limit = limit.saturating_abs();
                // mate 0: the side to move is already mated
                Some(if moves > 0 { limit } else { -limit })
            }
        }
    }
}

/// Express `score`, reported from `reported_by`, from the point of view of
/// `perspective`. Returns `None` when the mate policy excludes the score.
pub fn normalize(
    score: EngineScore,
    reported_by: Color,
    perspective: Color,
    policy: MatePolicy,
) -> Option<i32> {
    let value = match score {
        EngineScore::Centipawns(cp) => cp,
        EngineScore::Mate(moves) => policy.mate_to_centipawns(moves)?,
    };

    if reported_by == perspective {
        Some(value)
    } else {
        Some(value.saturating_neg())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centipawns_same_perspective() {
        let score = EngineScore::Centipawns(35);
        assert_eq!(normalize(score, Color::White, Color::White, MatePolicy::Exclude), Some(35));
        assert_eq!(normalize(score, Color::Black, Color::Black, MatePolicy::Exclude), Some(35));
    }

    #[test]
    fn test_centipawns_flipped_perspective() {
        let score = EngineScore::Centipawns(-120);
        assert_eq!(normalize(score, Color::Black, Color::White, MatePolicy::Exclude), Some(120));
    }

    #[test]
    fn test_mate_excluded() {
        assert_eq!(
            normalize(EngineScore::Mate(3), Color::White, Color::White, MatePolicy::Exclude),
            None
        );
    }

    #[test]
    fn test_mate_saturated() {
        let policy = MatePolicy::Saturate(10_000);
        assert_eq!(normalize(EngineScore::Mate(3), Color::White, Color::White, policy), Some(10_000));
        assert_eq!(normalize(EngineScore::Mate(-2), Color::White, Color::White, policy), Some(-10_000));
        // Opponent to move and already mated: a win for the mover
        assert_eq!(normalize(EngineScore::Mate(0), Color::Black, Color::White, policy), Some(10_000));
    }

    #[test]
    fn test_extreme_values_do_not_overflow() {
        let flipped = normalize(EngineScore::Centipawns(i32::MIN), Color::White, Color::Black, MatePolicy::Exclude);
        assert_eq!(flipped, Some(i32::MAX));

        let policy = MatePolicy::Saturate(i32::MIN);
        assert_eq!(normalize(EngineScore::Mate(1), Color::White, Color::White, policy), Some(i32::MAX));
        assert_eq!(normalize(EngineScore::Mate(1), Color::White, Color::Black, policy), Some(-i32::MAX));
    }

    #[test]
    fn test_negative_limit_is_magnitude() {
        let policy = MatePolicy::Saturate(-5_000);
        assert_eq!(normalize(EngineScore::Mate(1), Color::White, Color::White, policy), Some(5_000));
    }
}
