//! Progression Engine.
//!
//! A player's level is found by walking the five levels in order and stopping
//! at the first one without qualifying evidence. Which evidence qualifies is
//! decided by one [`GatingPolicy`] for both level derivation and lock checks.
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::constants::MAX_LEVEL;
use crate::levels::{MaturityLevel, Measure, level_for_game, level_label};
use crate::score::ScoreRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GatingPolicy {
    /// Any recorded attempt, even a zero score, satisfies a level.
    #[default]
    AttemptOnly,
    /// The best attempt must meet the level's required threshold.
    Threshold,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown gating policy {0:?}; expected attempt-only or threshold")]
pub struct UnknownGatingPolicy(pub String);

impl FromStr for GatingPolicy {
    type Err = UnknownGatingPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "attempt-only" | "attempt_only" | "attempt" => Ok(Self::AttemptOnly),
            "threshold" => Ok(Self::Threshold),
            _ => Err(UnknownGatingPolicy(s.to_string())),
        }
    }
}

/// Per-level detail for the progress tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LevelProgress {
    pub level: MaturityLevel,
    pub attempts: usize,
    /// Best percentage or raw score, depending on the level's measure.
    pub best: Option<u32>,
    pub best_percentage: Option<u32>,
    /// The level's threshold has been met, whatever the gating policy.
    pub mastered: bool,
    pub locked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressReport {
    pub player_name: String,
    pub level: u8,
    pub level_label: String,
    pub mastery_percent: u32,
    pub levels: Vec<LevelProgress>,
    pub completed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgressionEngine {
    policy: GatingPolicy,
}

fn best_for(level: MaturityLevel, attempts: &[&ScoreRecord]) -> Option<u32> {
    let measure = level.spec().measure;
    attempts
        .iter()
        .map(|record| match measure {
            Measure::Percentage => record.percentage,
            Measure::RawScore => record.score,
        })
        .max()
}

impl ProgressionEngine {
    #[must_use]
    pub const fn new(policy: GatingPolicy) -> Self {
        Self { policy }
    }

    #[must_use]
    pub const fn policy(&self) -> GatingPolicy {
        self.policy
    }

    fn attempts<'a>(
        player_name: &str,
        level: MaturityLevel,
        scores: &'a [ScoreRecord],
    ) -> Vec<&'a ScoreRecord> {
        scores
            .iter()
            .filter(|record| {
                record.player_name == player_name
                    && level_for_game(&record.game_name) == Some(level)
            })
            .collect()
    }

    fn satisfied(&self, level: MaturityLevel, attempts: &[&ScoreRecord]) -> bool {
        let Some(best) = best_for(level, attempts) else {
            return false;
        };
        match self.policy {
            GatingPolicy::AttemptOnly => true,
            GatingPolicy::Threshold => best >= level.spec().required,
        }
    }

    /// Highest level reached, `0` through `5`.
    #[must_use]
    pub fn player_level(&self, player_name: &str, scores: &[ScoreRecord]) -> u8 {
        let mut reached = 0;
        for level in MaturityLevel::ALL {
            let attempts = Self::attempts(player_name, level, scores);
            if !self.satisfied(level, &attempts) {
                break;
            }
            reached = level.number();
        }
        reached
    }

    /// Level 1 and unknown games are never locked. Level `i` opens once the
    /// player has reached level `i - 1`. A player without a name is locked out
    /// of every gated level.
    #[must_use]
    pub fn is_locked(&self, game_name: &str, player_name: &str, scores: &[ScoreRecord]) -> bool {
        let Some(previous) = level_for_game(game_name).and_then(MaturityLevel::previous) else {
            return false;
        };
        if player_name.trim().is_empty() {
            return true;
        }
        self.player_level(player_name, scores) < previous.number()
    }

    #[must_use]
    pub fn can_access(&self, game_name: &str, player_name: &str, scores: &[ScoreRecord]) -> bool {
        !self.is_locked(game_name, player_name, scores)
    }

    #[must_use]
    pub fn report(&self, player_name: &str, scores: &[ScoreRecord]) -> ProgressReport {
        let level = self.player_level(player_name, scores);
        let gated_out = player_name.trim().is_empty();
        let levels: Vec<LevelProgress> = MaturityLevel::ALL
            .into_iter()
            .map(|maturity| {
                let attempts = Self::attempts(player_name, maturity, scores);
                let best = best_for(maturity, &attempts);
                let locked = maturity
                    .previous()
                    .is_some_and(|previous| gated_out || level < previous.number());
                LevelProgress {
                    level: maturity,
                    attempts: attempts.len(),
                    best,
                    best_percentage: attempts.iter().map(|r| r.percentage).max(),
                    mastered: best.is_some_and(|b| b >= maturity.spec().required),
                    locked,
                }
            })
            .collect();
        let completed = levels.iter().all(|progress| progress.mastered);

        ProgressReport {
            player_name: player_name.to_string(),
            level,
            level_label: level_label(level),
            mastery_percent: u32::from(level) * 100 / u32::from(MAX_LEVEL),
            levels,
            completed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::score::ScoreDraft;
    use chrono::{TimeZone, Utc};

    fn attempt(player: &str, level: MaturityLevel, score: u32, max: u32) -> ScoreRecord {
        ScoreDraft::new(player, level.game(), score, max)
            .into_record("id", Utc.timestamp_opt(0, 0).unwrap())
            .unwrap()
    }

    #[test]
    fn attempt_only_counts_zero_scores() {
        let engine = ProgressionEngine::new(GatingPolicy::AttemptOnly);
        let scores = vec![
            attempt("Alice", MaturityLevel::Initial, 0, 7),
            attempt("Alice", MaturityLevel::Managed, 1, 3),
        ];
        assert_eq!(engine.player_level("Alice", &scores), 2);
        assert!(!engine.is_locked(MaturityLevel::Defined.game(), "Alice", &scores));
        assert!(engine.is_locked(MaturityLevel::QuantitativelyManaged.game(), "Alice", &scores));
    }

    #[test]
    fn records_under_former_level_ids_count_as_evidence() {
        let engine = ProgressionEngine::new(GatingPolicy::AttemptOnly);
        let scores = vec![
            ScoreDraft::new("Alice", MaturityLevel::Initial.spec().former_game, 6, 7)
                .into_record("old", Utc.timestamp_opt(0, 0).unwrap())
                .unwrap(),
            ScoreDraft::new("Alice", "Quiz CMMI", 7, 7)
                .into_record("legacy", Utc.timestamp_opt(0, 0).unwrap())
                .unwrap(),
        ];
        assert_eq!(engine.player_level("Alice", &scores), 1);
        assert!(!engine.is_locked("Niveau 2: Managed", "Alice", &scores));
        assert!(engine.is_locked("Niveau 3: Defined", "Alice", &scores));
    }

    #[test]
    fn threshold_policy_uses_best_attempt_per_measure() {
        let engine = ProgressionEngine::new(GatingPolicy::Threshold);
        let mut scores = vec![
            attempt("Alice", MaturityLevel::Initial, 4, 7),
            attempt("Alice", MaturityLevel::Managed, 3, 3),
        ];
        assert_eq!(engine.player_level("Alice", &scores), 0);
        scores.push(attempt("Alice", MaturityLevel::Initial, 5, 7));
        assert_eq!(engine.player_level("Alice", &scores), 2);
        scores.push(attempt("Alice", MaturityLevel::Defined, 7, 8));
        assert_eq!(engine.player_level("Alice", &scores), 2);
    }

    #[test]
    fn gap_in_sequence_caps_the_level() {
        let engine = ProgressionEngine::default();
        let scores = vec![
            attempt("Alice", MaturityLevel::Initial, 7, 7),
            attempt("Alice", MaturityLevel::Defined, 8, 8),
        ];
        assert_eq!(engine.player_level("Alice", &scores), 1);
    }

    #[test]
    fn other_players_and_legacy_games_do_not_count() {
        let engine = ProgressionEngine::default();
        let legacy = ScoreDraft::new("Alice", "Quiz CMMI", 7, 7)
            .into_record("x", Utc.timestamp_opt(0, 0).unwrap())
            .unwrap();
        let scores = vec![legacy, attempt("Bob", MaturityLevel::Initial, 7, 7)];
        assert_eq!(engine.player_level("Alice", &scores), 0);
    }

    #[test]
    fn level_one_unknown_games_and_anonymous_players() {
        let engine = ProgressionEngine::default();
        assert!(!engine.is_locked(MaturityLevel::Initial.game(), "", &[]));
        assert!(!engine.is_locked("Quiz CMMI", "", &[]));
        assert!(engine.is_locked(MaturityLevel::Managed.game(), "  ", &[]));
        assert!(engine.can_access(MaturityLevel::Initial.game(), "Zed", &[]));
    }

    #[test]
    fn report_separates_mastery_from_gating() {
        let engine = ProgressionEngine::new(GatingPolicy::AttemptOnly);
        let scores = vec![
            attempt("Alice", MaturityLevel::Initial, 3, 7),
            attempt("Alice", MaturityLevel::Initial, 6, 7),
            attempt("Alice", MaturityLevel::Managed, 2, 3),
        ];
        let report = engine.report("Alice", &scores);
        assert_eq!(report.level, 2);
        assert_eq!(report.mastery_percent, 40);
        assert_eq!(report.level_label, "Level 2: Managed");
        assert!(!report.completed);

        let initial = &report.levels[0];
        assert_eq!(initial.attempts, 2);
        assert_eq!(initial.best, Some(86));
        assert!(initial.mastered);
        let managed = &report.levels[1];
        assert_eq!(managed.best, Some(2));
        assert_eq!(managed.best_percentage, Some(67));
        assert!(!managed.mastered);
        assert!(!report.levels[2].locked);
        assert!(report.levels[3].locked);
    }

    #[test]
    fn policy_parses_from_text() {
        assert_eq!("Threshold".parse(), Ok(GatingPolicy::Threshold));
        assert_eq!("attempt-only".parse(), Ok(GatingPolicy::AttemptOnly));
        let err = " sometimes".parse::<GatingPolicy>().unwrap_err();
        assert_eq!(err, UnknownGatingPolicy(" sometimes".to_string()));
        assert!(err.to_string().contains("attempt-only or threshold"));
    }
}
