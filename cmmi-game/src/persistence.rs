//! Startup wiring for storage backends.
//!
//! A [`Persistence`] is built once and cloned into every component. It
//! carries the local fallback store, the optional durable backend, the
//! clock, the id source and the change bus.
use std::cell::RefCell;
use std::rc::Rc;

use crate::KeyValueStorage;
use crate::backend::DocumentBackend;
use crate::clock::{Clock, IdGenerator, SystemClock};
use crate::config::SuiteConfig;
use crate::events::ChangeBus;
use crate::local::{LocalStore, StorageKeys};
use crate::score::Timestamp;

#[derive(Clone)]
pub struct Persistence {
    local: LocalStore,
    durable: Option<Rc<dyn DocumentBackend>>,
    clock: Rc<dyn Clock>,
    ids: Rc<RefCell<IdGenerator>>,
    bus: ChangeBus,
}

impl std::fmt::Debug for Persistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Persistence")
            .field("local", &self.local)
            .field("durable", &self.durable.is_some())
            .field("bus", &self.bus)
            .finish_non_exhaustive()
    }
}

impl Persistence {
    #[must_use]
    pub fn builder(shared: Rc<dyn KeyValueStorage>) -> PersistenceBuilder {
        PersistenceBuilder::new(shared)
    }

    /// Local storage only, wall clock, ids seeded from config.
    #[must_use]
    pub fn local_only(shared: Rc<dyn KeyValueStorage>, config: &SuiteConfig) -> Self {
        Self::builder(shared).config(config).build()
    }

    #[must_use]
    pub const fn local(&self) -> &LocalStore {
        &self.local
    }

    #[must_use]
    pub fn durable(&self) -> Option<&dyn DocumentBackend> {
        self.durable.as_deref()
    }

    #[must_use]
    pub fn durable_handle(&self) -> Option<Rc<dyn DocumentBackend>> {
        self.durable.clone()
    }

    #[must_use]
    pub const fn has_durable(&self) -> bool {
        self.durable.is_some()
    }

    #[must_use]
    pub const fn bus(&self) -> &ChangeBus {
        &self.bus
    }

    #[must_use]
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    #[must_use]
    pub fn next_id(&self) -> String {
        let now = self.clock.now();
        self.ids.borrow_mut().next_id(now)
    }
}

pub struct PersistenceBuilder {
    shared: Rc<dyn KeyValueStorage>,
    session: Option<Rc<dyn KeyValueStorage>>,
    durable: Option<Rc<dyn DocumentBackend>>,
    durable_enabled: bool,
    clock: Rc<dyn Clock>,
    id_seed: Option<u64>,
    keys: StorageKeys,
}

impl PersistenceBuilder {
    fn new(shared: Rc<dyn KeyValueStorage>) -> Self {
        Self {
            shared,
            session: None,
            durable: None,
            durable_enabled: true,
            clock: Rc::new(SystemClock),
            id_seed: None,
            keys: StorageKeys::default(),
        }
    }

    /// Take storage keys, id seed and durable-backend gating from `config`.
    #[must_use]
    pub fn config(mut self, config: &SuiteConfig) -> Self {
        self.keys = StorageKeys::with_prefix(&config.storage_prefix);
        self.id_seed = config.id_seed;
        self.durable_enabled = config.durable.is_configured();
        self
    }

    /// Keep the active-player keys apart from the shared collections.
    #[must_use]
    pub fn session_storage(mut self, session: Rc<dyn KeyValueStorage>) -> Self {
        self.session = Some(session);
        self
    }

    /// Offer a durable backend. It is only used if the config marks the
    /// backend as configured (or no config is applied).
    #[must_use]
    pub fn durable(mut self, backend: Rc<dyn DocumentBackend>) -> Self {
        self.durable = Some(backend);
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: Rc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn id_seed(mut self, seed: u64) -> Self {
        self.id_seed = Some(seed);
        self
    }

    #[must_use]
    pub fn build(self) -> Persistence {
        let durable = match self.durable {
            Some(backend) if self.durable_enabled => Some(backend),
            Some(_) => {
                log::info!("durable backend not configured; using local storage only");
                None
            }
            None => None,
        };
        let ids = self.id_seed.map_or_else(
            || IdGenerator::from_clock(self.clock.as_ref()),
            IdGenerator::from_seed,
        );
        let session = self.session.unwrap_or_else(|| Rc::clone(&self.shared));
        Persistence {
            local: LocalStore::new(self.shared, session, self.keys),
            durable,
            clock: self.clock,
            ids: Rc::new(RefCell::new(ids)),
            bus: ChangeBus::new(),
        }
    }
}
