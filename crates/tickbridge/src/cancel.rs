//! Cancellation signal shared between a controller and any number of waiters.
//!
//! [`CancelSource`] owns the signal; [`CancelToken`] is the cheaply-cloneable
//! observer handed to queued actions and flush loops. Cancellation is
//! level-triggered and permanent: once signaled, every current and future
//! check observes it, and sleepers in [`CancelToken::wait_timeout`] wake
//! immediately.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug)]
struct Shared {
    cancelled: Mutex<bool>,
    cond: Condvar,
}

/// Controller half: signals cancellation.
#[derive(Debug)]
pub struct CancelSource {
    shared: Arc<Shared>,
}

/// Observer half: checks for, or sleeps against, cancellation.
#[derive(Debug, Clone)]
pub struct CancelToken {
    shared: Arc<Shared>,
}

impl Default for CancelSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelSource {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                cancelled: Mutex::new(false),
                cond: Condvar::new(),
            }),
        }
    }

    pub fn token(&self) -> CancelToken {
        CancelToken {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Signal cancellation. Idempotent.
    pub fn cancel(&self) {
        let mut cancelled = self.shared.cancelled.lock().unwrap();
        *cancelled = true;
        self.shared.cond.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.shared.cancelled.lock().unwrap()
    }
}

impl CancelToken {
    /// A token that can never be cancelled, for call sites without a
    /// controller.
    pub fn never() -> Self {
        CancelSource::new().token()
    }

    pub fn is_cancelled(&self) -> bool {
        *self.shared.cancelled.lock().unwrap()
    }

    /// Sleep for up to `timeout`, waking early on cancellation.
    ///
    /// Returns `true` if cancelled (before or during the wait), `false` if
    /// the full timeout elapsed without a signal.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut cancelled = self.shared.cancelled.lock().unwrap();
        while !*cancelled {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            // Spurious wakeups loop back around via the deadline.
            cancelled = self
                .shared
                .cond
                .wait_timeout(cancelled, remaining)
                .unwrap()
                .0;
        }
        true
    }
}
