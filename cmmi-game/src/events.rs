//! In-process change bus for score snapshots.
//!
//! Every mutation publishes the complete current score list, so subscribers
//! never have to merge deltas.
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use crate::score::ScoreRecord;

pub type ScoreCallback = Rc<dyn Fn(&[ScoreRecord])>;

#[derive(Default)]
struct BusState {
    next_id: u64,
    subscribers: BTreeMap<u64, ScoreCallback>,
}

/// Shared handle to the bus. Clones publish to the same subscribers.
#[derive(Clone, Default)]
pub struct ChangeBus {
    state: Rc<RefCell<BusState>>,
}

impl std::fmt::Debug for ChangeBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl ChangeBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, callback: ScoreCallback) -> BusToken {
        let mut state = self.state.borrow_mut();
        state.next_id += 1;
        let id = state.next_id;
        state.subscribers.insert(id, callback);
        BusToken {
            id,
            bus: Rc::downgrade(&self.state),
        }
    }

    /// Deliver `snapshot` to every current subscriber in subscription order.
    /// Subscribers may subscribe or cancel from inside their callback.
    pub fn publish(&self, snapshot: &[ScoreRecord]) {
        let callbacks: Vec<ScoreCallback> =
            self.state.borrow().subscribers.values().cloned().collect();
        log::debug!(
            "publishing {} score(s) to {} subscriber(s)",
            snapshot.len(),
            callbacks.len()
        );
        for callback in callbacks {
            callback(snapshot);
        }
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.state.borrow().subscribers.len()
    }
}

/// Registration on a [`ChangeBus`]. Cancelling is idempotent.
#[derive(Debug)]
pub struct BusToken {
    id: u64,
    bus: Weak<RefCell<BusState>>,
}

impl BusToken {
    pub fn cancel(&self) {
        if let Some(state) = self.bus.upgrade() {
            state.borrow_mut().subscribers.remove(&self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn publish_reaches_all_until_cancelled() {
        let bus = ChangeBus::new();
        let hits = Rc::new(Cell::new(0));
        let a = {
            let hits = Rc::clone(&hits);
            bus.subscribe(Rc::new(move |_| hits.set(hits.get() + 1)))
        };
        let _b = {
            let hits = Rc::clone(&hits);
            bus.subscribe(Rc::new(move |_| hits.set(hits.get() + 10)))
        };
        bus.publish(&[]);
        assert_eq!(hits.get(), 11);

        a.cancel();
        a.cancel();
        bus.publish(&[]);
        assert_eq!(hits.get(), 21);
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[test]
    fn callbacks_can_resubscribe_while_publishing() {
        let bus = ChangeBus::new();
        let inner_bus = bus.clone();
        let _token = bus.subscribe(Rc::new(move |_| {
            let token = inner_bus.subscribe(Rc::new(|_| {}));
            token.cancel();
        }));
        bus.publish(&[]);
        assert_eq!(bus.subscriber_count(), 1);
    }
}
