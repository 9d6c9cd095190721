//! Score records and percentage derivation
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

pub type Timestamp = DateTime<Utc>;

/// Raised when a game hands over a score that cannot be turned into a record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScoreInputError {
    #[error("max score must be greater than zero")]
    ZeroMaxScore,
    #[error("score {score} exceeds max score {max_score}")]
    ScoreAboveMax { score: u32, max_score: u32 },
    #[error("player name must not be empty")]
    MissingPlayer,
    #[error("game name must not be empty")]
    MissingGame,
}

/// One persisted game attempt. Records are never updated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreRecord {
    #[serde(deserialize_with = "id_from_string_or_number")]
    pub id: String,
    pub player_name: String,
    pub game_name: String,
    pub score: u32,
    pub max_score: u32,
    pub percentage: u32,
    #[serde(default)]
    pub time_spent: u32,
    pub date: Timestamp,
}

/// Caller-provided fields of a score before it is stamped and stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreDraft {
    pub player_name: String,
    pub game_name: String,
    pub score: u32,
    pub max_score: u32,
    #[serde(default)]
    pub time_spent: u32,
}

impl ScoreDraft {
    #[must_use]
    pub fn new(
        player_name: impl Into<String>,
        game_name: impl Into<String>,
        score: u32,
        max_score: u32,
    ) -> Self {
        Self {
            player_name: player_name.into(),
            game_name: game_name.into(),
            score,
            max_score,
            time_spent: 0,
        }
    }

    #[must_use]
    pub const fn with_time_spent(mut self, seconds: u32) -> Self {
        self.time_spent = seconds;
        self
    }

    /// Derive the percentage this draft will be stored with.
    ///
    /// # Errors
    ///
    /// Returns an error if the draft is missing its player or game, or if the
    /// score cannot be expressed as a 0-100 percentage.
    pub fn percentage(&self) -> Result<u32, ScoreInputError> {
        if self.player_name.trim().is_empty() {
            return Err(ScoreInputError::MissingPlayer);
        }
        if self.game_name.trim().is_empty() {
            return Err(ScoreInputError::MissingGame);
        }
        percentage_of(self.score, self.max_score)
    }

    /// Stamp the draft with an id and a date.
    ///
    /// # Errors
    ///
    /// Returns an error if the draft fails validation.
    pub fn into_record(
        self,
        id: impl Into<String>,
        date: Timestamp,
    ) -> Result<ScoreRecord, ScoreInputError> {
        let percentage = self.percentage()?;
        Ok(ScoreRecord {
            id: id.into(),
            player_name: self.player_name,
            game_name: self.game_name,
            score: self.score,
            max_score: self.max_score,
            percentage,
            time_spent: self.time_spent,
            date,
        })
    }
}

/// `round(score / max_score * 100)`, rounding halves up.
///
/// # Errors
///
/// Returns an error when `max_score` is zero or `score` exceeds it.
pub fn percentage_of(score: u32, max_score: u32) -> Result<u32, ScoreInputError> {
    if max_score == 0 {
        return Err(ScoreInputError::ZeroMaxScore);
    }
    if score > max_score {
        return Err(ScoreInputError::ScoreAboveMax { score, max_score });
    }
    let score = u64::from(score);
    let max = u64::from(max_score);
    let pct = (200 * score + max) / (2 * max);
    Ok(u32::try_from(pct).unwrap_or(100))
}

/// Order records newest first. Records sharing a timestamp keep the most
/// recently appended one first.
pub fn sort_newest_first(records: &mut [ScoreRecord]) {
    records.reverse();
    records.sort_by(|a, b| b.date.cmp(&a.date));
}

fn id_from_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(u64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(text) => text,
        RawId::Number(number) => number.to_string(),
    })
}
