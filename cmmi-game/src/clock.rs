//! Time and id sources injected into the persistence layer.
use chrono::{Duration, Utc};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use std::cell::Cell;

use crate::score::Timestamp;

pub trait Clock {
    fn now(&self) -> Timestamp;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

/// A clock that only moves when told to. Used by simulations and tests.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Cell<Timestamp>,
}

impl ManualClock {
    #[must_use]
    pub const fn new(start: Timestamp) -> Self {
        Self {
            now: Cell::new(start),
        }
    }

    pub fn advance_secs(&self, secs: i64) {
        self.now.set(self.now.get() + Duration::seconds(secs));
    }

    pub fn set(&self, at: Timestamp) {
        self.now.set(at);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.get()
    }
}

/// Generates record ids of the form `<millis-hex>-<random-hex>`.
#[derive(Debug, Clone)]
pub struct IdGenerator {
    rng: ChaCha20Rng,
}

impl IdGenerator {
    #[must_use]
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: ChaCha20Rng::seed_from_u64(seed),
        }
    }

    /// Seed from the clock when no explicit seed is configured.
    #[must_use]
    pub fn from_clock(clock: &dyn Clock) -> Self {
        let now = clock.now();
        let nanos = now.timestamp_nanos_opt().unwrap_or_else(|| now.timestamp());
        Self::from_seed(nanos.unsigned_abs())
    }

    pub fn next_id(&mut self, at: Timestamp) -> String {
        let millis = at.timestamp_millis().max(0);
        format!("{millis:x}-{:08x}", self.rng.next_u32())
    }
}
