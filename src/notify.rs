//! Bounded-wait notification primitive for callback-style collaborators.
//!
//! Each `notify()` adds one pending notification. A successful wait consumes
//! exactly one; an expired wait leaves the count untouched.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
pub struct CallbackNotifier {
    pending: Mutex<u32>,
    cond: Condvar,
}

impl CallbackNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one notification and wake a waiter.
    pub fn notify(&self) {
        let mut pending = self.pending.lock();
        *pending = pending.saturating_add(1);
        self.cond.notify_one();
    }

    /// Block until a notification is pending or `deadline` passes.
    ///
    /// Returns `true` and consumes one notification on success.
    pub fn wait_until(&self, deadline: Instant) -> bool {
        let mut pending = self.pending.lock();
        while *pending == 0 {
            if self.cond.wait_until(&mut pending, deadline).timed_out() {
                if *pending == 0 {
                    return false;
                }
                break;
            }
        }
        *pending -= 1;
        true
    }

    /// Relative-timeout convenience over [`wait_until`](Self::wait_until).
    ///
    /// A timeout too large to express as a deadline waits without one.
    pub fn wait_for(&self, timeout: Duration) -> bool {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.wait_until(deadline),
            None => {
                self.wait();
                true
            }
        }
    }

    /// Block until a notification is pending, then consume it.
    pub fn wait(&self) {
        let mut pending = self.pending.lock();
        while *pending == 0 {
            self.cond.wait(&mut pending);
        }
        *pending -= 1;
    }

    pub fn pending(&self) -> u32 {
        *self.pending.lock()
    }
}
