//! CMMI maturity level catalog.
//!
//! Each of the five levels is played through one designated mini-game. The
//! game identifier is what score records carry in `gameName`, so the strings
//! here are part of the persisted format.
use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the five ordered CMMI maturity stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MaturityLevel {
    Initial,
    Managed,
    Defined,
    QuantitativelyManaged,
    Optimizing,
}

/// How the best attempt at a level is measured against its threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Measure {
    /// Compare the record's percentage.
    Percentage,
    /// Compare the record's raw score (items placed or matched).
    RawScore,
}

/// The mini-game mechanic used for a level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MiniGame {
    Quiz,
    MemoryMatch,
    DragAndDrop,
    TrueFalse,
    Ordering,
}

/// Static description of a maturity level and its designated game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LevelSpec {
    pub level: MaturityLevel,
    pub name: &'static str,
    pub game: &'static str,
    /// Identifier the same game was stored under before the English rename.
    pub former_game: &'static str,
    pub mini_game: MiniGame,
    pub measure: Measure,
    /// Threshold in the unit given by `measure`.
    pub required: u32,
    /// Number of questions, pairs or items the game is scored out of.
    pub items: u32,
    pub color: &'static str,
    pub description: &'static str,
    pub section_id: &'static str,
}

pub static LEVELS: [LevelSpec; 5] = [
    LevelSpec {
        level: MaturityLevel::Initial,
        name: "Initial",
        game: "Level 1: Initial",
        former_game: "Niveau 1: Initial",
        mini_game: MiniGame::Quiz,
        measure: Measure::Percentage,
        required: 70,
        items: 7,
        color: "#ef4444",
        description: "Understand the basics of CMMI",
        section_id: "level1-initial",
    },
    LevelSpec {
        level: MaturityLevel::Managed,
        name: "Managed",
        game: "Level 2: Managed",
        former_game: "Niveau 2: Managed",
        mini_game: MiniGame::MemoryMatch,
        measure: Measure::RawScore,
        required: 3,
        items: 3,
        color: "#f59e0b",
        description: "Manage projects effectively",
        section_id: "level2-managed",
    },
    LevelSpec {
        level: MaturityLevel::Defined,
        name: "Defined",
        game: "Level 3: Defined",
        former_game: "Niveau 3: Defined",
        mini_game: MiniGame::DragAndDrop,
        measure: Measure::RawScore,
        required: 8,
        items: 8,
        color: "#3b82f6",
        description: "Standardize the processes",
        section_id: "level3-defined",
    },
    LevelSpec {
        level: MaturityLevel::QuantitativelyManaged,
        name: "Quantitatively Managed",
        game: "Level 4: Quantitatively Managed",
        former_game: "Niveau 4: Quantitatively Managed",
        mini_game: MiniGame::TrueFalse,
        measure: Measure::Percentage,
        required: 80,
        items: 6,
        color: "#8b5cf6",
        description: "Measure quantitatively",
        section_id: "level4-quantitatively-managed",
    },
    LevelSpec {
        level: MaturityLevel::Optimizing,
        name: "Optimizing",
        game: "Level 5: Optimizing",
        former_game: "Niveau 5: Optimizing",
        mini_game: MiniGame::Ordering,
        measure: Measure::Percentage,
        required: 100,
        items: 5,
        color: "#10b981",
        description: "Improve continuously",
        section_id: "level5-optimizing",
    },
];

/// Game names written by earlier revisions of the suite. They still show up
/// in leaderboards but never count as progression evidence.
pub const LEGACY_GAMES: [&str; 5] = [
    "Quiz CMMI",
    "Jeu de Mémoire",
    "Drag & Drop Processus",
    "TrueFalse",
    "OrderLevels",
];

impl MaturityLevel {
    pub const ALL: [Self; 5] = [
        Self::Initial,
        Self::Managed,
        Self::Defined,
        Self::QuantitativelyManaged,
        Self::Optimizing,
    ];

    /// Level number in `1..=5`.
    #[must_use]
    pub const fn number(self) -> u8 {
        match self {
            Self::Initial => 1,
            Self::Managed => 2,
            Self::Defined => 3,
            Self::QuantitativelyManaged => 4,
            Self::Optimizing => 5,
        }
    }

    #[must_use]
    pub const fn from_number(number: u8) -> Option<Self> {
        match number {
            1 => Some(Self::Initial),
            2 => Some(Self::Managed),
            3 => Some(Self::Defined),
            4 => Some(Self::QuantitativelyManaged),
            5 => Some(Self::Optimizing),
            _ => None,
        }
    }

    #[must_use]
    pub fn spec(self) -> &'static LevelSpec {
        &LEVELS[usize::from(self.number() - 1)]
    }

    #[must_use]
    pub const fn previous(self) -> Option<Self> {
        Self::from_number(self.number() - 1)
    }

    #[must_use]
    pub fn game(self) -> &'static str {
        self.spec().game
    }
}

impl fmt::Display for MaturityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Level {}: {}", self.number(), self.spec().name)
    }
}

/// Look up the level whose designated game is `game`, under its current or
/// former identifier.
#[must_use]
pub fn level_for_game(game: &str) -> Option<MaturityLevel> {
    LEVELS
        .iter()
        .find(|spec| spec.game == game || spec.former_game == game)
        .map(|spec| spec.level)
}

/// Page anchor for a level's game, or an empty string for unknown games.
#[must_use]
pub fn section_id(game: &str) -> &'static str {
    level_for_game(game).map_or("", |level| level.spec().section_id)
}

#[must_use]
pub fn is_legacy(game: &str) -> bool {
    LEGACY_GAMES.contains(&game)
}

/// Human-readable label for a derived level, `0` meaning nothing reached yet.
#[must_use]
pub fn level_label(level: u8) -> String {
    MaturityLevel::from_number(level).map_or_else(
        || "No level reached".to_string(),
        |reached| reached.to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_is_ordered_and_self_consistent() {
        for (idx, spec) in LEVELS.iter().enumerate() {
            assert_eq!(usize::from(spec.level.number()), idx + 1);
            assert_eq!(level_for_game(spec.game), Some(spec.level));
            assert_eq!(level_for_game(spec.former_game), Some(spec.level));
            assert!(!is_legacy(spec.former_game));
            assert_eq!(section_id(spec.game), spec.section_id);
            if spec.measure == Measure::RawScore {
                assert!(spec.required <= spec.items, "{} threshold unreachable", spec.name);
            }
        }
    }

    #[test]
    fn legacy_games_have_no_level() {
        for game in LEGACY_GAMES {
            assert!(is_legacy(game));
            assert_eq!(level_for_game(game), None);
            assert_eq!(section_id(game), "");
        }
    }

    #[test]
    fn previous_walks_down_to_none() {
        assert_eq!(
            MaturityLevel::Optimizing.previous(),
            Some(MaturityLevel::QuantitativelyManaged)
        );
        assert_eq!(MaturityLevel::Initial.previous(), None);
        assert_eq!(MaturityLevel::from_number(0), None);
        assert_eq!(MaturityLevel::from_number(6), None);
    }

    #[test]
    fn labels_render_level_names() {
        assert_eq!(MaturityLevel::Defined.to_string(), "Level 3: Defined");
        assert_eq!(level_label(0), "No level reached");
        assert_eq!(level_label(4), "Level 4: Quantitatively Managed");
    }
}
