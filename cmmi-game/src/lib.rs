//! CMMI Game Suite Engine
//!
//! Platform-agnostic core for the CMMI maturity game suite: score storage
//! with durable/local fallback, player identities, level gating and
//! leaderboards. This crate has no UI or platform-specific dependencies.

pub mod admin;
pub mod backend;
pub mod clock;
pub mod config;
pub mod constants;
pub mod events;
pub mod identity;
pub mod leaderboard;
pub mod levels;
pub mod local;
pub mod persistence;
pub mod progression;
pub mod score;
pub mod session;
pub mod store;

// Re-export commonly used types
pub use admin::{AdminConsole, AdminError, AdminSnapshot, RankedPlayer};
pub use backend::{BackendError, DocumentBackend, MemoryDocumentBackend, PlayerInsert, WatchGuard};
pub use clock::{Clock, IdGenerator, ManualClock, SystemClock};
pub use config::{ConfigError, DurableConfig, SuiteConfig};
pub use events::{BusToken, ChangeBus};
pub use identity::{IdentityError, IdentityRegistry, PlayerIdentity, normalize_name};
pub use leaderboard::{
    LeaderboardView, PlayerAggregate, compare_records, overall_ranking, top_n, top3,
};
pub use levels::{
    LEGACY_GAMES, LEVELS, LevelSpec, MaturityLevel, Measure, MiniGame, is_legacy, level_for_game,
    level_label, section_id,
};
pub use local::{ActiveSession, LocalStore, MemoryStorage, StorageKeys};
pub use persistence::{Persistence, PersistenceBuilder};
pub use progression::{
    GatingPolicy, LevelProgress, ProgressReport, ProgressionEngine, UnknownGatingPolicy,
};
pub use score::{ScoreDraft, ScoreInputError, ScoreRecord, Timestamp, percentage_of};
pub use session::{GameSession, SessionState, Urgency};
pub use store::{ScoreStore, Subscription};

/// Failure reported by a key-value storage backend.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("storage rejected write to {key}: {reason}")]
    Write { key: String, reason: String },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Trait for abstracting string key-value storage
/// Platform-specific implementations should provide this
pub trait KeyValueStorage {
    /// Read the value stored under `key`
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be read.
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Store `value` under `key`, replacing any previous value
    ///
    /// # Errors
    ///
    /// Returns an error if the storage rejects the write (quota, privacy mode).
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove `key`
    ///
    /// # Errors
    ///
    /// Returns an error if the storage rejects the removal.
    fn remove_item(&self, key: &str) -> Result<(), StorageError>;
}

/// Main entry point wiring the store, registry and progression rules
/// around one [`Persistence`].
#[derive(Clone)]
pub struct Suite {
    config: SuiteConfig,
    scores: ScoreStore,
    identities: IdentityRegistry,
    progression: ProgressionEngine,
}

impl Suite {
    #[must_use]
    pub fn new(config: SuiteConfig, persistence: Persistence) -> Self {
        let progression = ProgressionEngine::new(config.gating_policy);
        Self {
            scores: ScoreStore::new(persistence.clone()),
            identities: IdentityRegistry::new(persistence),
            progression,
            config,
        }
    }

    /// A suite over `shared` storage only, configured from `config`.
    #[must_use]
    pub fn local_only(shared: std::rc::Rc<dyn KeyValueStorage>, config: SuiteConfig) -> Self {
        let persistence = Persistence::local_only(shared, &config);
        Self::new(config, persistence)
    }

    #[must_use]
    pub const fn config(&self) -> &SuiteConfig {
        &self.config
    }

    #[must_use]
    pub const fn scores(&self) -> &ScoreStore {
        &self.scores
    }

    #[must_use]
    pub const fn identities(&self) -> &IdentityRegistry {
        &self.identities
    }

    #[must_use]
    pub const fn progression(&self) -> &ProgressionEngine {
        &self.progression
    }

    #[must_use]
    pub fn admin_console(&self) -> AdminConsole {
        AdminConsole::new(self.scores.clone(), self.progression, &self.config)
    }

    /// Record a result for the session's active player.
    ///
    /// # Errors
    ///
    /// Returns [`ScoreInputError::MissingPlayer`] if no name is active, or any
    /// other input validation error from [`ScoreStore::record`].
    pub async fn record_for_current_player(
        &self,
        game_name: &str,
        score: u32,
        max_score: u32,
        time_spent: u32,
    ) -> Result<ScoreRecord, ScoreInputError> {
        let player = self.identities.current_name();
        if player.is_empty() {
            return Err(ScoreInputError::MissingPlayer);
        }
        let draft = ScoreDraft::new(player, game_name, score, max_score).with_time_spent(time_spent);
        self.scores.record(draft).await
    }

    /// Start a timed attempt at `level`'s game for the active player, limited
    /// to the configured `time_limit_secs`.
    ///
    /// # Errors
    ///
    /// Returns [`ScoreInputError::MissingPlayer`] if no name is active.
    pub fn start_session(&self, level: MaturityLevel) -> Result<GameSession, ScoreInputError> {
        let player = self.identities.current_name();
        if player.is_empty() {
            return Err(ScoreInputError::MissingPlayer);
        }
        Ok(GameSession::for_level(player, level).with_time_limit(self.config.time_limit_secs))
    }

    pub async fn player_level(&self, player_name: &str) -> u8 {
        let scores = self.scores.list().await;
        self.progression.player_level(player_name, &scores)
    }

    /// Gate check for `game_name`. `None` checks the session's active player.
    pub async fn is_locked(&self, game_name: &str, player_name: Option<&str>) -> bool {
        let player = player_name.map_or_else(|| self.identities.current_name(), str::to_string);
        let scores = self.scores.list().await;
        self.progression.is_locked(game_name, &player, &scores)
    }

    pub async fn progress_report(&self, player_name: &str) -> ProgressReport {
        let scores = self.scores.list().await;
        self.progression.report(player_name, &scores)
    }

    pub async fn top_n(&self, limit: usize, game_name: Option<&str>) -> Vec<ScoreRecord> {
        let scores = self.scores.list().await;
        top_n(&scores, limit, game_name)
    }

    pub async fn overall_ranking(&self) -> Vec<PlayerAggregate> {
        let scores = self.scores.list().await;
        overall_ranking(&scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use std::rc::Rc;

    fn suite(shared: &MemoryStorage) -> Suite {
        let config = SuiteConfig {
            id_seed: Some(11),
            ..SuiteConfig::default()
        };
        Suite::local_only(Rc::new(shared.clone()), config)
    }

    #[test]
    fn recording_requires_an_active_player() {
        let suite = suite(&MemoryStorage::new());
        let err = block_on(suite.record_for_current_player(MaturityLevel::Initial.game(), 5, 7, 40))
            .unwrap_err();
        assert_eq!(err, ScoreInputError::MissingPlayer);
    }

    #[test]
    fn recorded_attempt_unlocks_next_level_for_current_player() {
        let suite = suite(&MemoryStorage::new());
        block_on(suite.identities().register("Alice")).unwrap();
        let managed = MaturityLevel::Managed.game();

        assert!(block_on(suite.is_locked(managed, None)));
        let record =
            block_on(suite.record_for_current_player(MaturityLevel::Initial.game(), 2, 7, 95))
                .unwrap();
        assert_eq!(record.player_name, "Alice");
        assert_eq!(record.time_spent, 95);

        assert!(!block_on(suite.is_locked(managed, None)));
        assert!(block_on(suite.is_locked(managed, Some("Bob"))));
        assert_eq!(block_on(suite.player_level("Alice")), 1);
        assert_eq!(block_on(suite.progress_report("Alice")).mastery_percent, 20);
    }

    #[test]
    fn timed_out_session_records_with_the_configured_limit() {
        let config = SuiteConfig {
            time_limit_secs: 3,
            ..SuiteConfig::default()
        };
        let suite = Suite::local_only(Rc::new(MemoryStorage::new()), config);
        assert_eq!(
            suite.start_session(MaturityLevel::Initial).unwrap_err(),
            ScoreInputError::MissingPlayer
        );

        block_on(suite.identities().register("Alice")).unwrap();
        let mut session = suite.start_session(MaturityLevel::Initial).unwrap();
        session.set_score(4);
        assert_eq!(session.remaining_secs(), 3);
        assert!(session.tick().is_none());
        assert!(session.tick().is_none());
        let draft = session.tick().unwrap();
        assert_eq!(session.state(), SessionState::Expired);

        let record = block_on(suite.scores().record(draft)).unwrap();
        assert_eq!(record.player_name, "Alice");
        assert_eq!(record.score, 4);
        assert_eq!(record.max_score, MaturityLevel::Initial.spec().items);
        assert_eq!(record.time_spent, 3);
        assert!(!block_on(suite.is_locked(MaturityLevel::Managed.game(), None)));
    }

    #[test]
    fn memory_storage_round_trips_items() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.get_item("k").unwrap(), None);
        storage.set_item("k", "v").unwrap();
        assert_eq!(storage.get_item("k").unwrap().as_deref(), Some("v"));
        storage.remove_item("k").unwrap();
        assert!(storage.is_empty());
    }
}
