//! Time-windowed batch buffer.
//!
//! Producers append from any thread; a background flush loop hands the whole
//! accumulated batch to a callback once per interval. Elements are never
//! delivered one by one: a window's worth always arrives in a single call.
//!
//! The buffer lock is held while the callback runs, so the callback must not
//! call [`BatchBuffer::add`] on the same buffer (reentrancy deadlocks).
//! A panicking callback terminates the flush loop; the supervised runner
//! logs it. Restarting requires an explicit [`BatchBuffer::start`].

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use crate::bridge::{spawn_supervised, WorkerPool};
use crate::cancel::CancelSource;

type FlushFn<T> = Box<dyn Fn(&[T]) + Send + Sync>;

/// Unbounded append buffer with an interval-driven flush loop.
///
/// States: stopped (initial) and running. `add` and manual `flush` work in
/// either state; the loop only exists while running.
pub struct BatchBuffer<T> {
    queued: Mutex<Vec<T>>,
    interval: Duration,
    on_flush: FlushFn<T>,
    running: Mutex<Option<CancelSource>>,
    // Handed to the flush loop so it never extends the buffer's lifetime.
    weak_self: Weak<BatchBuffer<T>>,
}

impl<T: Send + 'static> BatchBuffer<T> {
    pub fn new(interval: Duration, on_flush: impl Fn(&[T]) + Send + Sync + 'static) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            queued: Mutex::new(Vec::new()),
            interval,
            on_flush: Box::new(on_flush),
            running: Mutex::new(None),
            weak_self: weak.clone(),
        })
    }

    /// Append an element. Works whether or not the loop is running; while
    /// stopped, elements accumulate until the next flush.
    pub fn add(&self, element: T) {
        self.queued.lock().unwrap().push(element);
    }

    /// Elements currently awaiting the next flush.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queued.lock().unwrap().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queued.lock().unwrap().is_empty()
    }

    /// Deliver the current batch to the callback and clear it. The callback
    /// runs on every flush, empty batch included, so hosts can use it as a
    /// periodic signal. Callable manually at any time; the loop calls it
    /// once per interval.
    pub fn flush(&self) {
        let mut queued = self.queued.lock().unwrap();
        (self.on_flush)(&queued);
        queued.clear();
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.lock().unwrap().is_some()
    }

    /// Launch the flush loop on `pool`. Returns `false` if already running.
    ///
    /// Loop body: flush, then wait out the interval (cancellable), repeat.
    /// The loop holds only a weak reference, so dropping every strong
    /// handle also ends it.
    pub fn start(&self, pool: &dyn WorkerPool) -> bool {
        let token = {
            let mut running = self.running.lock().unwrap();
            if running.is_some() {
                return false;
            }
            let source = CancelSource::new();
            let token = source.token();
            *running = Some(source);
            token
        };

        let interval = self.interval;
        let weak = self.weak_self.clone();
        spawn_supervised(pool, "batch-buffer-flush", move || {
            loop {
                let Some(buffer) = weak.upgrade() else { break };
                if token.is_cancelled() {
                    break;
                }
                buffer.flush();
                drop(buffer);
                if token.wait_timeout(interval) {
                    break;
                }
            }
            Ok(())
        });

        true
    }

    /// Cancel the flush loop. Returns `false` if not running.
    ///
    /// Does not flush remaining elements; callers wanting a final drain
    /// call [`Self::flush`] first.
    pub fn stop(&self) -> bool {
        match self.running.lock().unwrap().take() {
            Some(source) => {
                source.cancel();
                true
            }
            None => false,
        }
    }
}
