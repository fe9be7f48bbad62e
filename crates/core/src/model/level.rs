use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum LevelError {
    #[error("unknown level label: {0:?}")]
    UnknownLevelLabel(String),
}

//
// ─── LEVEL ─────────────────────────────────────────────────────────────────────
//

/// Proficiency tier, ordered from lowest to highest.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Level {
    Beginner,
    Elementary,
    Intermediate,
    Advanced,
}

/// The taxonomy in order; a level's position here is its index.
pub const TAXONOMY: [Level; 4] = [
    Level::Beginner,
    Level::Elementary,
    Level::Intermediate,
    Level::Advanced,
];

/// Index used for labels outside the taxonomy.
pub const UNKNOWN_INDEX: i32 = -1;

impl Level {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Level::Beginner => "Beginner",
            Level::Elementary => "Elementary",
            Level::Intermediate => "Intermediate",
            Level::Advanced => "Advanced",
        }
    }

    /// Position in `TAXONOMY`, 0 to 3.
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Level::Beginner => 0,
            Level::Elementary => 1,
            Level::Intermediate => 2,
            Level::Advanced => 3,
        }
    }

    /// Parse a taxonomy label. Matching ignores case and surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns `LevelError::UnknownLevelLabel` for anything else.
    pub fn parse(label: &str) -> Result<Self, LevelError> {
        let trimmed = label.trim();
        TAXONOMY
            .into_iter()
            .find(|level| level.label().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| LevelError::UnknownLevelLabel(label.to_string()))
    }

    /// The higher of two levels.
    #[must_use]
    pub fn ratchet(self, current_highest: Level) -> Level {
        self.max(current_highest)
    }

    /// `round(100 * index / 3)`: 0, 33, 67 or 100.
    #[must_use]
    pub fn progress_percent(self) -> u8 {
        const STEPS: usize = TAXONOMY.len() - 1;
        // index <= STEPS, so the value is at most 100.
        ((200 * self.index() + STEPS) / (2 * STEPS)) as u8
    }

    /// Placement for a level-test score: one tier per quarter of the range.
    #[must_use]
    pub fn for_score(percentage: u32) -> Level {
        match percentage {
            0..=24 => Level::Beginner,
            25..=49 => Level::Elementary,
            50..=74 => Level::Intermediate,
            _ => Level::Advanced,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Level {
    type Err = LevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Level::parse(s)
    }
}

//
// ─── LABEL-LEVEL RULES ─────────────────────────────────────────────────────────
//
// Persisted values are plain labels and may predate the taxonomy, so these
// rules work on raw text and never fail.

/// Taxonomy index of `label`, or `UNKNOWN_INDEX` when it is not a known level.
#[must_use]
pub fn taxonomy_index(label: &str) -> i32 {
    Level::parse(label).map_or(UNKNOWN_INDEX, |level| level.index() as i32)
}

/// Returns `new_level` if it ranks strictly above `current_highest`,
/// otherwise `current_highest` unchanged.
///
/// Unknown labels rank below every known level.
#[must_use]
pub fn ratchet<'a>(new_level: &'a str, current_highest: &'a str) -> &'a str {
    if taxonomy_index(new_level) > taxonomy_index(current_highest) {
        new_level
    } else {
        current_highest
    }
}

/// Progress along the taxonomy for `label`; 0 for unknown labels.
#[must_use]
pub fn progress_percent(label: &str) -> u8 {
    Level::parse(label).map_or(0, Level::progress_percent)
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_maps_each_tier() {
        let got: Vec<u8> = TAXONOMY.iter().map(|l| l.progress_percent()).collect();
        assert_eq!(got, vec![0, 33, 67, 100]);
        assert_eq!(progress_percent("Intermediate"), 67);
        assert_eq!(progress_percent("Expert"), 0);
    }

    #[test]
    fn ratchet_moves_forward_only() {
        assert_eq!(ratchet("Intermediate", "Elementary"), "Intermediate");
        assert_eq!(ratchet("Beginner", "Advanced"), "Advanced");
        assert_eq!(ratchet("Elementary", "Elementary"), "Elementary");
    }

    #[test]
    fn unknown_labels_rank_lowest() {
        assert_eq!(taxonomy_index("B+"), UNKNOWN_INDEX);
        assert_eq!(ratchet("B+", "Beginner"), "Beginner");
        assert_eq!(ratchet("Beginner", "legacy"), "Beginner");
        assert_eq!(ratchet("junk", "other"), "other");
    }

    #[test]
    fn ratchet_is_monotonic_over_a_sequence() {
        let inputs = [
            "Elementary",
            "Beginner",
            "???",
            "Advanced",
            "Intermediate",
            "Elementary",
        ];
        let mut highest = "Beginner".to_string();
        let mut last_index = taxonomy_index(&highest);
        for input in inputs {
            highest = ratchet(input, &highest).to_string();
            let idx = taxonomy_index(&highest);
            assert!(idx >= last_index);
            last_index = idx;
        }
        assert_eq!(highest, "Advanced");
    }

    #[test]
    fn parse_ignores_case_and_whitespace() {
        assert_eq!(Level::parse(" advanced ").unwrap(), Level::Advanced);
        let err = Level::parse("Expert").unwrap_err();
        assert_eq!(err, LevelError::UnknownLevelLabel("Expert".into()));
    }

    #[test]
    fn typed_ratchet_keeps_the_higher_level() {
        assert_eq!(Level::Beginner.ratchet(Level::Advanced), Level::Advanced);
        assert_eq!(
            Level::Intermediate.ratchet(Level::Elementary),
            Level::Intermediate
        );
    }

    #[test]
    fn level_test_scores_place_by_quarter() {
        assert_eq!(Level::for_score(0), Level::Beginner);
        assert_eq!(Level::for_score(25), Level::Elementary);
        assert_eq!(Level::for_score(74), Level::Intermediate);
        assert_eq!(Level::for_score(75), Level::Advanced);
        assert_eq!(Level::for_score(100), Level::Advanced);
    }
}
