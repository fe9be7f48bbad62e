//! One-time migration of historical level labels.
//!
//! Early profiles stored coarse grades (CEFR codes such as `A1`, or letter
//! grades such as `B+`). The first time a profile's highest level is read and
//! nothing is stored yet, its legacy label is mapped through `LEGACY_LEVELS`
//! and the result is persisted. Labels the table does not know map to
//! `Level::Beginner`.

use crate::model::level::Level;

/// Legacy label to taxonomy level. Matching ignores case and whitespace.
pub const LEGACY_LEVELS: &[(&str, Level)] = &[
    ("A1", Level::Beginner),
    ("A-", Level::Beginner),
    ("A", Level::Beginner),
    ("A2", Level::Elementary),
    ("A+", Level::Elementary),
    ("B1", Level::Intermediate),
    ("B-", Level::Intermediate),
    ("B", Level::Intermediate),
    ("B+", Level::Intermediate),
    ("B2", Level::Intermediate),
    ("C1", Level::Advanced),
    ("C-", Level::Advanced),
    ("C", Level::Advanced),
    ("C+", Level::Advanced),
    ("C2", Level::Advanced),
];

/// Look a legacy or current label up without applying the fallback.
#[must_use]
pub fn lookup_legacy_label(raw: &str) -> Option<Level> {
    let trimmed = raw.trim();
    if let Ok(level) = Level::parse(trimmed) {
        return Some(level);
    }
    LEGACY_LEVELS
        .iter()
        .find(|(label, _)| label.eq_ignore_ascii_case(trimmed))
        .map(|(_, level)| *level)
}

/// Map a legacy label onto the taxonomy, falling back to `Level::Beginner`.
#[must_use]
pub fn migrate_legacy_label(raw: &str) -> Level {
    lookup_legacy_label(raw).unwrap_or(Level::Beginner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn b_plus_migrates_to_intermediate() {
        let level = migrate_legacy_label("B+");
        assert_eq!(level, Level::Intermediate);
        assert_eq!(level.progress_percent(), 67);
    }

    #[test]
    fn cefr_codes_cover_every_tier() {
        assert_eq!(migrate_legacy_label("a1"), Level::Beginner);
        assert_eq!(migrate_legacy_label("A2"), Level::Elementary);
        assert_eq!(migrate_legacy_label("B2"), Level::Intermediate);
        assert_eq!(migrate_legacy_label(" c2 "), Level::Advanced);
    }

    #[test]
    fn current_labels_map_to_themselves() {
        assert_eq!(migrate_legacy_label("Elementary"), Level::Elementary);
        assert_eq!(lookup_legacy_label("advanced"), Some(Level::Advanced));
    }

    #[test]
    fn unrecognised_labels_fall_back_to_beginner() {
        assert_eq!(lookup_legacy_label("D"), None);
        assert_eq!(migrate_legacy_label("D"), Level::Beginner);
        assert_eq!(migrate_legacy_label(""), Level::Beginner);
    }
}
