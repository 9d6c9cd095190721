//! Local key-value fallback store.
//!
//! Mirrors the browser layout: one JSON array per collection plus the
//! session's active player under plain string keys.
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::cell::RefCell;
use std::collections::HashMap;
use std::hash::Hasher;
use std::rc::Rc;
use twox_hash::XxHash64;

use crate::constants::{
    DEFAULT_STORAGE_PREFIX, PLAYER_ID_KEY_SUFFIX, PLAYER_NAME_KEY_SUFFIX, PLAYERS_KEY_SUFFIX,
    SCORES_KEY_SUFFIX,
};
use crate::identity::PlayerIdentity;
use crate::score::{ScoreRecord, sort_newest_first};
use crate::{KeyValueStorage, StorageError};

/// In-memory storage. Clones share the same map, which is how tests model
/// two browser contexts on one origin.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    items: Rc<RefCell<HashMap<String, String>>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.items.borrow().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.items
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.items.borrow_mut().remove(key);
        Ok(())
    }
}

/// Keys used inside the local store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKeys {
    pub scores: String,
    pub players: String,
    pub player_name: String,
    pub player_id: String,
}

impl StorageKeys {
    #[must_use]
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            scores: format!("{prefix}_{SCORES_KEY_SUFFIX}"),
            players: format!("{prefix}_{PLAYERS_KEY_SUFFIX}"),
            player_name: format!("{prefix}_{PLAYER_NAME_KEY_SUFFIX}"),
            player_id: format!("{prefix}_{PLAYER_ID_KEY_SUFFIX}"),
        }
    }
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self::with_prefix(DEFAULT_STORAGE_PREFIX)
    }
}

/// The session's chosen identity.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ActiveSession {
    pub player_name: String,
    pub player_id: Option<String>,
}

/// Typed access to the shared collections and the per-session keys.
#[derive(Clone)]
pub struct LocalStore {
    shared: Rc<dyn KeyValueStorage>,
    session: Rc<dyn KeyValueStorage>,
    keys: StorageKeys,
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore")
            .field("keys", &self.keys)
            .finish_non_exhaustive()
    }
}

impl LocalStore {
    #[must_use]
    pub fn new(
        shared: Rc<dyn KeyValueStorage>,
        session: Rc<dyn KeyValueStorage>,
        keys: StorageKeys,
    ) -> Self {
        Self {
            shared,
            session,
            keys,
        }
    }

    #[must_use]
    pub const fn keys(&self) -> &StorageKeys {
        &self.keys
    }

    fn read_list<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>, StorageError> {
        match self.shared.get_item(key)? {
            Some(json) if !json.trim().is_empty() => Ok(serde_json::from_str(&json)?),
            _ => Ok(Vec::new()),
        }
    }

    fn write_list<T: Serialize>(&self, key: &str, items: &[T]) -> Result<(), StorageError> {
        let json = serde_json::to_string(items)?;
        self.shared.set_item(key, &json)
    }

    /// Score history, newest first. Unreadable data reads as empty.
    #[must_use]
    pub fn scores(&self) -> Vec<ScoreRecord> {
        match self.read_list::<ScoreRecord>(&self.keys.scores) {
            Ok(mut scores) => {
                sort_newest_first(&mut scores);
                scores
            }
            Err(err) => {
                log::error!("reading local scores failed: {err}");
                Vec::new()
            }
        }
    }

    /// Fingerprint of the stored score payload, used to detect writes from
    /// other contexts sharing this storage.
    #[must_use]
    pub fn scores_fingerprint(&self) -> u64 {
        let raw = self
            .shared
            .get_item(&self.keys.scores)
            .ok()
            .flatten()
            .unwrap_or_default();
        let mut hasher = XxHash64::with_seed(0);
        hasher.write(raw.as_bytes());
        hasher.finish()
    }

    /// Append one record to the stored array. An undecodable array is
    /// replaced by a new one holding only `record`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be read or the new array
    /// cannot be written.
    pub fn append_score(&self, record: &ScoreRecord) -> Result<(), StorageError> {
        let mut scores: Vec<ScoreRecord> = match self.read_list(&self.keys.scores) {
            Ok(scores) => scores,
            Err(StorageError::Serialization(err)) => {
                log::warn!("stored scores are unreadable, starting a new list: {err}");
                Vec::new()
            }
            Err(err) => return Err(err),
        };
        scores.push(record.clone());
        self.write_list(&self.keys.scores, &scores)
    }

    /// Remove the stored score array.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage rejects the removal.
    pub fn clear_scores(&self) -> Result<(), StorageError> {
        self.shared.remove_item(&self.keys.scores)
    }

    /// Registered identities.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored array cannot be read.
    pub fn players(&self) -> Result<Vec<PlayerIdentity>, StorageError> {
        self.read_list(&self.keys.players)
    }

    /// Replace the stored identity array.
    ///
    /// # Errors
    ///
    /// Returns an error if the array cannot be written.
    pub fn save_players(&self, players: &[PlayerIdentity]) -> Result<(), StorageError> {
        self.write_list(&self.keys.players, players)
    }

    /// Remove every stored identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage rejects the removal.
    pub fn clear_players(&self) -> Result<(), StorageError> {
        self.shared.remove_item(&self.keys.players)
    }

    #[must_use]
    pub fn active_session(&self) -> ActiveSession {
        let read = |key: &str| self.session.get_item(key).ok().flatten();
        ActiveSession {
            player_name: read(&self.keys.player_name).unwrap_or_default(),
            player_id: read(&self.keys.player_id).filter(|id| !id.is_empty()),
        }
    }

    /// Persist the session's active identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the session storage rejects the write.
    pub fn set_active_session(&self, player: &PlayerIdentity) -> Result<(), StorageError> {
        self.session
            .set_item(&self.keys.player_name, &player.player_name)?;
        self.session.set_item(&self.keys.player_id, &player.id)
    }

    /// Forget the session's active identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the session storage rejects the removal.
    pub fn clear_active_session(&self) -> Result<(), StorageError> {
        self.session.remove_item(&self.keys.player_name)?;
        self.session.remove_item(&self.keys.player_id)
    }
}
