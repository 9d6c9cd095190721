//! Durable document backend seam.
//!
//! The hosted document store is treated as an opaque CRUD and change-stream
//! service. Platforms supply an implementation; [`MemoryDocumentBackend`]
//! stands in for it in simulations and tests and can be switched offline.
use async_trait::async_trait;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use crate::identity::{PlayerIdentity, normalize_name};
use crate::score::{ScoreRecord, Timestamp, sort_newest_first};

/// Any failure reaching the durable backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("durable backend unavailable: {0}")]
    Unavailable(String),
    #[error("durable backend rejected the request: {0}")]
    Rejected(String),
}

/// Receives full score snapshots pushed by the backend.
pub type SnapshotListener = Rc<dyn Fn(Result<Vec<ScoreRecord>, BackendError>)>;

/// Outcome of a conditional identity insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerInsert {
    Inserted(PlayerIdentity),
    /// Another identity already holds the normalized name.
    Existing(PlayerIdentity),
}

/// Stops a backend change stream when dropped.
pub struct WatchGuard {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl WatchGuard {
    pub fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }
}

impl Drop for WatchGuard {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

#[async_trait(?Send)]
pub trait DocumentBackend {
    /// Store a score. The backend assigns the id of the returned record.
    async fn add_score(&self, record: ScoreRecord) -> Result<ScoreRecord, BackendError>;

    /// Full score history, newest first.
    async fn scores(&self) -> Result<Vec<ScoreRecord>, BackendError>;

    /// Delete the given records in one batch.
    async fn delete_scores(&self, ids: &[String]) -> Result<(), BackendError>;

    async fn players(&self) -> Result<Vec<PlayerIdentity>, BackendError>;

    /// Insert `player` unless an identity with the same normalized name
    /// exists. Must be atomic with respect to other inserts.
    async fn insert_player_if_absent(
        &self,
        player: PlayerIdentity,
    ) -> Result<PlayerInsert, BackendError>;

    async fn touch_player(&self, id: &str, at: Timestamp) -> Result<(), BackendError>;

    async fn delete_players(&self) -> Result<(), BackendError>;

    /// Push a fresh snapshot to `listener` on every change to the score
    /// collection until the guard is dropped.
    fn watch_scores(&self, listener: SnapshotListener) -> Result<WatchGuard, BackendError>;
}

#[derive(Default)]
struct MemoryBackendState {
    scores: Vec<ScoreRecord>,
    players: Vec<PlayerIdentity>,
    listeners: BTreeMap<u64, SnapshotListener>,
    next_listener: u64,
    next_doc: u64,
}

/// In-process document store with an on/off switch for outages.
/// Clones share the same collections.
#[derive(Clone)]
pub struct MemoryDocumentBackend {
    state: Rc<RefCell<MemoryBackendState>>,
    online: Rc<Cell<bool>>,
}

impl Default for MemoryDocumentBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocumentBackend {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(MemoryBackendState::default())),
            online: Rc::new(Cell::new(true)),
        }
    }

    /// A backend that fails every request.
    #[must_use]
    pub fn offline() -> Self {
        let backend = Self::new();
        backend.set_online(false);
        backend
    }

    pub fn set_online(&self, online: bool) {
        self.online.set(online);
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        self.online.get()
    }

    #[must_use]
    pub fn stored_scores(&self) -> usize {
        self.state.borrow().scores.len()
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.state.borrow().listeners.len()
    }

    fn ensure_online(&self) -> Result<(), BackendError> {
        if self.online.get() {
            Ok(())
        } else {
            Err(BackendError::Unavailable("network unreachable".to_string()))
        }
    }

    fn snapshot(&self) -> Vec<ScoreRecord> {
        let mut scores = self.state.borrow().scores.clone();
        sort_newest_first(&mut scores);
        scores
    }

    fn push_snapshot(&self) {
        let listeners: Vec<SnapshotListener> =
            self.state.borrow().listeners.values().cloned().collect();
        if listeners.is_empty() {
            return;
        }
        let snapshot = self.snapshot();
        for listener in listeners {
            listener(Ok(snapshot.clone()));
        }
    }
}

#[async_trait(?Send)]
impl DocumentBackend for MemoryDocumentBackend {
    async fn add_score(&self, mut record: ScoreRecord) -> Result<ScoreRecord, BackendError> {
        self.ensure_online()?;
        {
            let mut state = self.state.borrow_mut();
            state.next_doc += 1;
            record.id = format!("doc-{:06}", state.next_doc);
            state.scores.push(record.clone());
        }
        self.push_snapshot();
        Ok(record)
    }

    async fn scores(&self) -> Result<Vec<ScoreRecord>, BackendError> {
        self.ensure_online()?;
        Ok(self.snapshot())
    }

    async fn delete_scores(&self, ids: &[String]) -> Result<(), BackendError> {
        self.ensure_online()?;
        self.state
            .borrow_mut()
            .scores
            .retain(|record| !ids.contains(&record.id));
        self.push_snapshot();
        Ok(())
    }

    async fn players(&self) -> Result<Vec<PlayerIdentity>, BackendError> {
        self.ensure_online()?;
        Ok(self.state.borrow().players.clone())
    }

    async fn insert_player_if_absent(
        &self,
        player: PlayerIdentity,
    ) -> Result<PlayerInsert, BackendError> {
        self.ensure_online()?;
        let wanted = normalize_name(&player.player_name);
        let mut state = self.state.borrow_mut();
        if let Some(existing) = state
            .players
            .iter()
            .find(|p| normalize_name(&p.player_name) == wanted)
        {
            return Ok(PlayerInsert::Existing(existing.clone()));
        }
        state.players.push(player.clone());
        Ok(PlayerInsert::Inserted(player))
    }

    async fn touch_player(&self, id: &str, at: Timestamp) -> Result<(), BackendError> {
        self.ensure_online()?;
        let mut state = self.state.borrow_mut();
        let player = state
            .players
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| BackendError::Rejected(format!("no player with id {id}")))?;
        player.last_active = at;
        Ok(())
    }

    async fn delete_players(&self) -> Result<(), BackendError> {
        self.ensure_online()?;
        self.state.borrow_mut().players.clear();
        Ok(())
    }

    fn watch_scores(&self, listener: SnapshotListener) -> Result<WatchGuard, BackendError> {
        self.ensure_online()?;
        let id = {
            let mut state = self.state.borrow_mut();
            state.next_listener += 1;
            let id = state.next_listener;
            state.listeners.insert(id, listener);
            id
        };
        let weak: Weak<RefCell<MemoryBackendState>> = Rc::downgrade(&self.state);
        Ok(WatchGuard::new(move || {
            if let Some(state) = weak.upgrade() {
                state.borrow_mut().listeners.remove(&id);
            }
        }))
    }
}
