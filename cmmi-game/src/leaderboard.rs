//! Leaderboard Aggregator.
//!
//! Pure functions of the full score list, recomputed on every change.
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::levels::MaturityLevel;
use crate::score::ScoreRecord;

/// Percentage desc, then score desc, then time spent asc.
#[must_use]
pub fn compare_records(a: &ScoreRecord, b: &ScoreRecord) -> Ordering {
    b.percentage
        .cmp(&a.percentage)
        .then_with(|| b.score.cmp(&a.score))
        .then_with(|| a.time_spent.cmp(&b.time_spent))
}

/// Best `limit` records, optionally restricted to one game.
#[must_use]
pub fn top_n(scores: &[ScoreRecord], limit: usize, game_name: Option<&str>) -> Vec<ScoreRecord> {
    let mut ranked: Vec<ScoreRecord> = scores
        .iter()
        .filter(|record| game_name.is_none_or(|game| record.game_name == game))
        .cloned()
        .collect();
    ranked.sort_by(compare_records);
    ranked.truncate(limit);
    ranked
}

#[must_use]
pub fn top3(scores: &[ScoreRecord], game_name: Option<&str>) -> Vec<ScoreRecord> {
    top_n(scores, 3, game_name)
}

/// A player's totals across every record carrying their name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerAggregate {
    pub player_name: String,
    pub total_score: u64,
    pub games_played: usize,
    /// Unweighted mean of the record percentages, rounded.
    pub average_percentage: u32,
}

#[derive(Default)]
struct Totals {
    score: u64,
    percentage: u64,
    games: usize,
}

/// Rank players by total score, then average percentage, then games played.
/// Players tied on all three keep the order in which they first appear.
#[must_use]
pub fn overall_ranking(scores: &[ScoreRecord]) -> Vec<PlayerAggregate> {
    let mut order: Vec<&str> = Vec::new();
    let mut totals: HashMap<&str, Totals> = HashMap::new();
    for record in scores {
        let entry = totals.entry(record.player_name.as_str()).or_insert_with(|| {
            order.push(record.player_name.as_str());
            Totals::default()
        });
        entry.score += u64::from(record.score);
        entry.percentage += u64::from(record.percentage);
        entry.games += 1;
    }

    let mut ranking: Vec<PlayerAggregate> = order
        .into_iter()
        .filter_map(|name| {
            let total = totals.get(name)?;
            let games = u64::try_from(total.games).ok()?;
            let average = (2 * total.percentage + games) / (2 * games);
            Some(PlayerAggregate {
                player_name: name.to_string(),
                total_score: total.score,
                games_played: total.games,
                average_percentage: u32::try_from(average).unwrap_or(100),
            })
        })
        .collect();

    ranking.sort_by(|a, b| {
        b.total_score
            .cmp(&a.total_score)
            .then_with(|| b.average_percentage.cmp(&a.average_percentage))
            .then_with(|| b.games_played.cmp(&a.games_played))
    });
    ranking
}

/// Everything a leaderboard screen shows, computed from one snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaderboardView {
    pub per_level: Vec<(MaturityLevel, Vec<ScoreRecord>)>,
    pub overall: Vec<PlayerAggregate>,
}

impl LeaderboardView {
    #[must_use]
    pub fn compute(scores: &[ScoreRecord], size: usize) -> Self {
        let per_level = MaturityLevel::ALL
            .into_iter()
            .map(|level| (level, top_n(scores, size, Some(level.game()))))
            .collect();
        Self {
            per_level,
            overall: overall_ranking(scores),
        }
    }
}
