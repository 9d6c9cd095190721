//! Browser timer that drives `ScoreStore::poll` once per interval so that
//! writes from other tabs reach this tab's subscribers.
use cmmi_game::ScoreStore;
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use crate::dom;

/// Stops the polling loop when dropped.
pub struct PollHandle {
    running: Rc<Cell<bool>>,
}

impl PollHandle {
    pub fn stop(&self) {
        self.running.set(false);
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.get()
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

fn timer_ms(interval: Duration) -> i32 {
    i32::try_from(interval.as_millis()).unwrap_or(i32::MAX).max(1)
}

/// Spawn the poll loop on the current task queue.
#[must_use]
pub fn start(store: ScoreStore, interval: Duration) -> PollHandle {
    let running = Rc::new(Cell::new(true));
    let flag = Rc::clone(&running);
    let delay = timer_ms(interval);
    wasm_bindgen_futures::spawn_local(async move {
        while flag.get() {
            if let Err(err) = dom::sleep_ms(delay).await {
                log::error!("poll timer failed: {}", dom::js_error_message(&err));
                flag.set(false);
                break;
            }
            if flag.get() && store.poll().await {
                log::debug!("score list changed in another tab");
            }
        }
    });
    PollHandle { running }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_interval_is_clamped() {
        assert_eq!(timer_ms(Duration::from_secs(1)), 1_000);
        assert_eq!(timer_ms(Duration::ZERO), 1);
        assert_eq!(timer_ms(Duration::from_secs(u64::MAX)), i32::MAX);
    }
}
