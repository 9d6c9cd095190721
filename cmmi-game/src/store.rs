//! Score Store Adapter.
//!
//! Writes and reads go to the durable backend when one is configured and
//! silently fall back to the local store whenever it fails. Every mutation
//! publishes a fresh snapshot on the change bus. Cross-context changes to the
//! local store are picked up by [`ScoreStore::poll`], which hosts call once per
//! poll interval.
use std::cell::Cell;
use std::rc::Rc;

use crate::backend::{BackendError, WatchGuard};
use crate::events::{BusToken, ScoreCallback};
use crate::persistence::Persistence;
use crate::score::{ScoreDraft, ScoreInputError, ScoreRecord};

/// Keeps a subscriber registered. Dropping it stops all deliveries.
pub struct Subscription {
    token: BusToken,
    remote: Option<WatchGuard>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        drop(self);
    }

    /// Whether snapshots are also pushed by the durable backend.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        self.remote.is_some()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.token.cancel();
        self.remote.take();
    }
}

#[derive(Clone)]
pub struct ScoreStore {
    persistence: Persistence,
    seen_fingerprint: Rc<Cell<u64>>,
}

impl ScoreStore {
    #[must_use]
    pub fn new(persistence: Persistence) -> Self {
        let fingerprint = persistence.local().scores_fingerprint();
        Self {
            persistence,
            seen_fingerprint: Rc::new(Cell::new(fingerprint)),
        }
    }

    #[must_use]
    pub const fn persistence(&self) -> &Persistence {
        &self.persistence
    }

    /// Record one game attempt and notify subscribers.
    ///
    /// Backend failures never surface here: the record lands in the local
    /// store instead.
    ///
    /// # Errors
    ///
    /// Returns an error only for malformed input (zero max score, score above
    /// max, missing player or game).
    pub async fn record(&self, draft: ScoreDraft) -> Result<ScoreRecord, ScoreInputError> {
        let date = self.persistence.now();
        let record = draft.into_record(String::new(), date)?;

        let stored = match self.persistence.durable() {
            Some(backend) => match backend.add_score(record.clone()).await {
                Ok(stored) => stored,
                Err(err) => {
                    log::warn!("saving score to durable backend failed, using local store: {err}");
                    self.record_locally(record)
                }
            },
            None => self.record_locally(record),
        };

        log::debug!(
            "recorded {} for {} on {:?} ({}%)",
            stored.id,
            stored.player_name,
            stored.game_name,
            stored.percentage
        );
        self.notify().await;
        Ok(stored)
    }

    fn record_locally(&self, mut record: ScoreRecord) -> ScoreRecord {
        record.id = self.persistence.next_id();
        let local = self.persistence.local();
        if let Err(err) = local.append_score(&record) {
            log::error!("saving score {} to local store failed: {err}", record.id);
        }
        self.seen_fingerprint.set(local.scores_fingerprint());
        record
    }

    /// Complete score history, newest first.
    pub async fn list(&self) -> Vec<ScoreRecord> {
        if let Some(backend) = self.persistence.durable() {
            match backend.scores().await {
                Ok(scores) => return scores,
                Err(err) => {
                    log::warn!("reading scores from durable backend failed, using local store: {err}");
                }
            }
        }
        self.persistence.local().scores()
    }

    /// Register `callback`. It runs once right away with the current list and
    /// again after every change until the returned handle is dropped.
    pub async fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&[ScoreRecord]) + 'static,
    {
        let callback: ScoreCallback = Rc::new(callback);
        let current = self.list().await;
        callback(&current);

        let token = self.persistence.bus().subscribe(Rc::clone(&callback));
        let remote = self.persistence.durable().and_then(|backend| {
            let local = self.persistence.local().clone();
            let forward = Rc::clone(&callback);
            let listener = Rc::new(move |snapshot: Result<Vec<ScoreRecord>, BackendError>| {
                match snapshot {
                    Ok(scores) => forward(&scores),
                    Err(err) => {
                        log::warn!("score stream error, serving local store: {err}");
                        forward(&local.scores());
                    }
                }
            });
            match backend.watch_scores(listener) {
                Ok(guard) => Some(guard),
                Err(err) => {
                    log::warn!("subscribing to durable backend failed, relying on polling: {err}");
                    None
                }
            }
        });

        Subscription { token, remote }
    }

    /// Delete every score from the durable backend and the local store.
    pub async fn clear_all(&self) {
        if let Some(backend) = self.persistence.durable() {
            let result = match backend.scores().await {
                Ok(scores) => {
                    let ids: Vec<String> = scores.into_iter().map(|s| s.id).collect();
                    backend.delete_scores(&ids).await
                }
                Err(err) => Err(err),
            };
            if let Err(err) = result {
                log::warn!("clearing durable scores failed, clearing local store only: {err}");
            }
        }

        let local = self.persistence.local();
        if let Err(err) = local.clear_scores() {
            log::error!("clearing local scores failed: {err}");
        }
        self.seen_fingerprint.set(local.scores_fingerprint());
        log::info!("all scores cleared");
        self.notify().await;
    }

    /// Check the local store for writes made by other contexts and notify
    /// subscribers if it changed. Returns whether a notification went out.
    pub async fn poll(&self) -> bool {
        let fingerprint = self.persistence.local().scores_fingerprint();
        if fingerprint == self.seen_fingerprint.get() {
            return false;
        }
        self.seen_fingerprint.set(fingerprint);
        self.notify().await;
        true
    }

    async fn notify(&self) {
        if self.persistence.bus().subscriber_count() == 0 {
            return;
        }
        let snapshot = self.list().await;
        self.persistence.bus().publish(&snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryDocumentBackend;
    use crate::clock::ManualClock;
    use crate::local::MemoryStorage;
    use chrono::{TimeZone, Utc};
    use futures::executor::block_on;
    use std::cell::RefCell;

    fn clock() -> Rc<ManualClock> {
        Rc::new(ManualClock::new(Utc.timestamp_opt(1_700_000_000, 0).unwrap()))
    }

    fn local_store(shared: &MemoryStorage, clock: &Rc<ManualClock>) -> ScoreStore {
        ScoreStore::new(
            Persistence::builder(Rc::new(shared.clone()))
                .clock(Rc::clone(clock) as Rc<dyn crate::Clock>)
                .id_seed(1)
                .build(),
        )
    }

    fn durable_store(
        shared: &MemoryStorage,
        backend: &MemoryDocumentBackend,
        clock: &Rc<ManualClock>,
    ) -> ScoreStore {
        ScoreStore::new(
            Persistence::builder(Rc::new(shared.clone()))
                .durable(Rc::new(backend.clone()))
                .clock(Rc::clone(clock) as Rc<dyn crate::Clock>)
                .id_seed(1)
                .build(),
        )
    }

    fn recorder() -> (Rc<RefCell<Vec<usize>>>, impl Fn(&[ScoreRecord]) + 'static) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        (seen, move |scores: &[ScoreRecord]| {
            sink.borrow_mut().push(scores.len());
        })
    }

    #[test]
    fn record_derives_percentage_and_lists_newest_first() {
        let clock = clock();
        let store = local_store(&MemoryStorage::new(), &clock);
        block_on(store.record(ScoreDraft::new("Alice", "Level 1: Initial", 5, 7))).unwrap();
        clock.advance_secs(10);
        let second = block_on(store.record(ScoreDraft::new("Bob", "Level 1: Initial", 1, 8)))
            .unwrap();
        assert_eq!(second.percentage, 13);

        let listed = block_on(store.list());
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].player_name, "Bob");
        assert_ne!(listed[0].id, listed[1].id);
    }

    #[test]
    fn malformed_input_is_rejected_without_writing() {
        let shared = MemoryStorage::new();
        let store = local_store(&shared, &clock());
        let err = block_on(store.record(ScoreDraft::new("Alice", "Level 1: Initial", 1, 0)))
            .unwrap_err();
        assert_eq!(err, ScoreInputError::ZeroMaxScore);
        assert!(shared.is_empty());
    }

    #[test]
    fn subscribe_fires_immediately_then_on_every_change() {
        let store = local_store(&MemoryStorage::new(), &clock());
        let (seen, callback) = recorder();
        let subscription = block_on(store.subscribe(callback));
        block_on(store.record(ScoreDraft::new("Alice", "TrueFalse", 3, 4))).unwrap();
        block_on(store.clear_all());
        assert_eq!(*seen.borrow(), [0, 1, 0]);

        subscription.unsubscribe();
        block_on(store.record(ScoreDraft::new("Alice", "TrueFalse", 3, 4))).unwrap();
        assert_eq!(seen.borrow().len(), 3);
    }

    #[test]
    fn poll_picks_up_writes_from_another_context_once() {
        let shared = MemoryStorage::new();
        let clock = clock();
        let tab_a = local_store(&shared, &clock);
        let tab_b = local_store(&shared, &clock);
        let (seen, callback) = recorder();
        let _subscription = block_on(tab_a.subscribe(callback));

        assert!(!block_on(tab_a.poll()));
        block_on(tab_b.record(ScoreDraft::new("Bob", "OrderLevels", 5, 5))).unwrap();
        assert!(block_on(tab_a.poll()));
        assert!(!block_on(tab_a.poll()));
        assert_eq!(*seen.borrow(), [0, 1]);
    }

    #[test]
    fn own_writes_do_not_trigger_a_second_poll_notification() {
        let store = local_store(&MemoryStorage::new(), &clock());
        block_on(store.record(ScoreDraft::new("Alice", "TrueFalse", 1, 4))).unwrap();
        assert!(!block_on(store.poll()));
    }

    #[test]
    fn durable_backend_receives_writes_and_pushes_to_subscribers() {
        let shared = MemoryStorage::new();
        let backend = MemoryDocumentBackend::new();
        let clock = clock();
        let store = durable_store(&shared, &backend, &clock);
        let other_device = durable_store(&MemoryStorage::new(), &backend, &clock);

        let (seen, callback) = recorder();
        let subscription = block_on(store.subscribe(callback));
        assert!(subscription.is_live());

        let record =
            block_on(other_device.record(ScoreDraft::new("Bob", "Level 1: Initial", 7, 7)))
                .unwrap();
        assert!(record.id.starts_with("doc-"));
        assert!(shared.is_empty());
        assert_eq!(*seen.borrow(), [0, 1]);
        assert_eq!(backend.stored_scores(), 1);

        drop(subscription);
        assert_eq!(backend.listener_count(), 0);
    }

    #[test]
    fn record_over_a_corrupt_local_array_is_still_listed() {
        use crate::KeyValueStorage;

        let shared = MemoryStorage::new();
        shared.set_item("cmmi_scores", "{not json").unwrap();
        let store = local_store(&shared, &clock());
        assert!(block_on(store.list()).is_empty());

        let record =
            block_on(store.record(ScoreDraft::new("Alice", "Level 1: Initial", 4, 7))).unwrap();
        assert_eq!(block_on(store.list()), vec![record]);
    }

    #[test]
    fn offline_backend_degrades_to_local_store() {
        let shared = MemoryStorage::new();
        let backend = MemoryDocumentBackend::offline();
        let store = durable_store(&shared, &backend, &clock());

        let (seen, callback) = recorder();
        let subscription = block_on(store.subscribe(callback));
        assert!(!subscription.is_live());

        let record =
            block_on(store.record(ScoreDraft::new("Alice", "Level 1: Initial", 6, 7))).unwrap();
        assert_eq!(record.percentage, 86);
        assert!(!record.id.starts_with("doc-"));

        let listed = block_on(store.list());
        assert_eq!(listed, vec![record]);
        assert_eq!(*seen.borrow(), [0, 1]);
    }

    #[test]
    fn records_written_during_an_outage_stay_local_once_backend_returns() {
        let shared = MemoryStorage::new();
        let backend = MemoryDocumentBackend::new();
        let store = durable_store(&shared, &backend, &clock());

        backend.set_online(false);
        let offline =
            block_on(store.record(ScoreDraft::new("Alice", "Level 1: Initial", 6, 7))).unwrap();
        backend.set_online(true);
        let online =
            block_on(store.record(ScoreDraft::new("Bob", "Level 1: Initial", 2, 7))).unwrap();

        assert_eq!(block_on(store.list()), vec![online]);
        backend.set_online(false);
        assert_eq!(block_on(store.list()), vec![offline]);
    }

    #[test]
    fn clear_all_empties_both_backends() {
        let shared = MemoryStorage::new();
        let backend = MemoryDocumentBackend::new();
        let store = durable_store(&shared, &backend, &clock());

        backend.set_online(false);
        block_on(store.record(ScoreDraft::new("Alice", "Level 1: Initial", 6, 7))).unwrap();
        backend.set_online(true);
        block_on(store.record(ScoreDraft::new("Bob", "Level 1: Initial", 2, 7))).unwrap();

        block_on(store.clear_all());
        assert!(block_on(store.list()).is_empty());
        backend.set_online(false);
        assert!(block_on(store.list()).is_empty());
    }
}
