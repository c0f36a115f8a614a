//! One-shot latch used to hold sub-resource requests until the page site key is known.

use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// A single-use gate: starts closed, opens once, stays open.
#[derive(Debug, Default)]
pub struct Latch {
    released: Mutex<bool>,
    cond: Condvar,
}

impl Latch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the latch and wake every waiter. Further calls do nothing.
    pub fn release(&self) {
        let mut released = self.released.lock().unwrap_or_else(PoisonError::into_inner);
        if !*released {
            *released = true;
            self.cond.notify_all();
        }
    }

    pub fn is_released(&self) -> bool {
        *self.released.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until the latch opens or `timeout` elapses. Returns whether it opened.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut released = self.released.lock().unwrap_or_else(PoisonError::into_inner);
        while !*released {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .cond
                .wait_timeout(released, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            released = guard;
        }
        true
    }
}
