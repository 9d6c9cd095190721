//! Admin dashboard model, gated by the shared secret from configuration.
use serde::Serialize;
use std::collections::HashSet;

use crate::config::SuiteConfig;
use crate::leaderboard::{PlayerAggregate, overall_ranking, top_n};
use crate::levels::{MaturityLevel, level_label};
use crate::progression::ProgressionEngine;
use crate::score::ScoreRecord;
use crate::store::ScoreStore;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdminError {
    #[error("admin access requires authentication")]
    NotAuthenticated,
    #[error("incorrect admin secret")]
    WrongSecret,
}

/// A row of the overall ranking with the player's derived level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedPlayer {
    pub rank: usize,
    #[serde(flatten)]
    pub aggregate: PlayerAggregate,
    pub level: u8,
    pub level_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminSnapshot {
    pub scores: Vec<ScoreRecord>,
    pub ranking: Vec<RankedPlayer>,
    pub top_by_level: Vec<(MaturityLevel, Vec<ScoreRecord>)>,
    /// Records that were not present at the previous refresh.
    pub new_scores: usize,
}

pub struct AdminConsole {
    store: ScoreStore,
    progression: ProgressionEngine,
    secret: String,
    board_size: usize,
    authenticated: bool,
    seen: Option<HashSet<String>>,
}

impl AdminConsole {
    #[must_use]
    pub fn new(store: ScoreStore, progression: ProgressionEngine, config: &SuiteConfig) -> Self {
        Self {
            store,
            progression,
            secret: config.admin_secret.clone(),
            board_size: config.leaderboard_size,
            authenticated: false,
            seen: None,
        }
    }

    /// # Errors
    ///
    /// Returns [`AdminError::WrongSecret`] if `secret` does not match.
    pub fn authenticate(&mut self, secret: &str) -> Result<(), AdminError> {
        if secret != self.secret {
            log::warn!("rejected admin login");
            self.authenticated = false;
            return Err(AdminError::WrongSecret);
        }
        self.authenticated = true;
        log::info!("admin authenticated");
        Ok(())
    }

    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn sign_out(&mut self) {
        self.authenticated = false;
        self.seen = None;
    }

    const fn ensure_authenticated(&self) -> Result<(), AdminError> {
        if self.authenticated {
            Ok(())
        } else {
            Err(AdminError::NotAuthenticated)
        }
    }

    /// Build the dashboard from `scores`, usually the latest snapshot
    /// delivered to a subscription.
    ///
    /// # Errors
    ///
    /// Returns [`AdminError::NotAuthenticated`] before a successful login.
    pub fn refresh(&mut self, scores: &[ScoreRecord]) -> Result<AdminSnapshot, AdminError> {
        self.ensure_authenticated()?;

        let ids: HashSet<String> = scores.iter().map(|record| record.id.clone()).collect();
        let new_scores = self
            .seen
            .as_ref()
            .map_or(0, |seen| ids.difference(seen).count());
        if new_scores > 0 {
            log::info!("{new_scores} new score(s) since last refresh");
        }
        self.seen = Some(ids);

        let ranking = overall_ranking(scores)
            .into_iter()
            .enumerate()
            .map(|(idx, aggregate)| {
                let level = self.progression.player_level(&aggregate.player_name, scores);
                RankedPlayer {
                    rank: idx + 1,
                    aggregate,
                    level,
                    level_name: level_label(level),
                }
            })
            .collect();
        let top_by_level = MaturityLevel::ALL
            .into_iter()
            .map(|level| (level, top_n(scores, self.board_size, Some(level.game()))))
            .collect();

        Ok(AdminSnapshot {
            scores: scores.to_vec(),
            ranking,
            top_by_level,
            new_scores,
        })
    }

    /// Fetch the current list and build the dashboard from it.
    ///
    /// # Errors
    ///
    /// Returns [`AdminError::NotAuthenticated`] before a successful login.
    pub async fn load(&mut self) -> Result<AdminSnapshot, AdminError> {
        self.ensure_authenticated()?;
        let scores = self.store.list().await;
        self.refresh(&scores)
    }

    /// Delete every score record. Identities are kept.
    ///
    /// # Errors
    ///
    /// Returns [`AdminError::NotAuthenticated`] before a successful login.
    pub async fn clear_scores(&mut self) -> Result<(), AdminError> {
        self.ensure_authenticated()?;
        self.store.clear_all().await;
        self.seen = Some(HashSet::new());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::MemoryStorage;
    use crate::persistence::Persistence;
    use crate::score::ScoreDraft;
    use futures::executor::block_on;
    use std::rc::Rc;

    fn console() -> AdminConsole {
        let config = SuiteConfig::default();
        let store = ScoreStore::new(Persistence::local_only(Rc::new(MemoryStorage::new()), &config));
        AdminConsole::new(store, ProgressionEngine::default(), &config)
    }

    #[test]
    fn every_action_requires_the_secret() {
        let mut admin = console();
        assert_eq!(admin.refresh(&[]).unwrap_err(), AdminError::NotAuthenticated);
        assert_eq!(
            block_on(admin.clear_scores()).unwrap_err(),
            AdminError::NotAuthenticated
        );
        assert_eq!(admin.authenticate("guess").unwrap_err(), AdminError::WrongSecret);
        assert!(!admin.is_authenticated());
        admin.authenticate("admin123").unwrap();
        assert!(admin.refresh(&[]).is_ok());
        admin.sign_out();
        assert!(block_on(admin.load()).is_err());
    }

    #[test]
    fn snapshot_ranks_players_with_levels_and_counts_new_records() {
        let mut admin = console();
        admin.authenticate("admin123").unwrap();
        let store = admin.store.clone();

        block_on(store.record(ScoreDraft::new("Alice", MaturityLevel::Initial.game(), 7, 7)))
            .unwrap();
        let first = block_on(admin.load()).unwrap();
        assert_eq!(first.new_scores, 0);

        block_on(store.record(ScoreDraft::new("Alice", MaturityLevel::Managed.game(), 3, 3)))
            .unwrap();
        block_on(store.record(ScoreDraft::new("Bob", "Quiz CMMI", 9, 10))).unwrap();
        let second = block_on(admin.load()).unwrap();
        assert_eq!(second.new_scores, 2);
        assert_eq!(second.scores.len(), 3);

        let alice = &second.ranking[0];
        assert_eq!(alice.rank, 1);
        assert_eq!(alice.aggregate.total_score, 10);
        assert_eq!(alice.level, 2);
        assert_eq!(alice.level_name, "Level 2: Managed");
        assert_eq!(second.ranking[1].level_name, "No level reached");

        assert_eq!(second.top_by_level.len(), 5);
        assert_eq!(second.top_by_level[0].1.len(), 1);

        block_on(admin.clear_scores()).unwrap();
        assert!(block_on(admin.load()).unwrap().scores.is_empty());
    }
}
