//! Cross-thread execution bridge.
//!
//! Background threads hand control to a single-threaded host tick loop (or
//! to a worker pool) by queueing a [`PendingAction`] and awaiting the
//! [`Future`] returned from [`move_to`]. The host drives the tick-loop side
//! by calling [`TickBridge::drain_and_run`] once per update cycle; the
//! bridge never owns the loop itself.
//!
//! # Guarantees
//!
//! - Each future resolves at most once, as exactly one of ok / cancelled /
//!   faulted.
//! - Actions drain in enqueue order within a single drain.
//! - An action enqueued *during* a drain runs on the next drain, never the
//!   current one, so an action rescheduling itself cannot starve the loop.
//! - A panicking action is logged and does not abort the rest of the drain.

use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::cancel::CancelToken;
use crate::error::Cancelled;
use crate::promise::{Future, Promise};

/// A unit of deferred work, executed exactly once by the destination
/// context's driver.
pub type PendingAction = Box<dyn FnOnce() + Send>;

/// A destination that accepts pending actions from any thread.
pub trait ExecutionContext: Send + Sync {
    fn enqueue(&self, action: PendingAction);
}

/// External worker-pool provider: runs a job soon, on any background thread.
pub trait WorkerPool: Send + Sync {
    fn execute(&self, job: PendingAction);
}

/// Queue a hand-off to `ctx` and return a future that resolves when the
/// context's driver runs the queued action.
///
/// An already-cancelled token fails the future immediately with
/// [`Cancelled`] and queues nothing. A token cancelled after enqueue fails
/// the future with [`Cancelled`] when the action is reached, without side
/// effects. Resolution failures are delivered through the future, never
/// surfaced on the enqueueing thread.
pub fn move_to(ctx: &dyn ExecutionContext, token: &CancelToken) -> Future<()> {
    if token.is_cancelled() {
        return Future::err(Cancelled.into());
    }

    let mut promise = Promise::new();
    let future = promise.get_future();
    let token = token.clone();

    ctx.enqueue(Box::new(move || {
        if token.is_cancelled() {
            promise.err(Cancelled.into());
        } else {
            promise.ok(());
        }
    }));

    future
}

/// The tick-loop side of the bridge.
///
/// Owned by the host composition root and passed to producers explicitly;
/// there is no process-wide instance. Producers enqueue from any thread,
/// the host calls [`TickBridge::drain_and_run`] from its update function.
pub struct TickBridge {
    tx: flume::Sender<PendingAction>,
    rx: flume::Receiver<PendingAction>,
}

impl Default for TickBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl TickBridge {
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = flume::unbounded();
        Self { tx, rx }
    }

    /// Number of actions awaiting the next drain.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.rx.len()
    }

    /// Drain all currently-queued actions and run them in enqueue order.
    ///
    /// Call once per host tick, from the tick thread only. The queue is
    /// snapshotted before anything runs, so actions enqueued mid-drain wait
    /// for the next drain. A panic in one action is caught, reported via
    /// `tracing`, and does not stop the remaining actions.
    pub fn drain_and_run(&self) {
        let batch: Vec<PendingAction> = self.rx.try_iter().collect();
        for action in batch {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(action)) {
                tracing::error!(
                    "queued action panicked: {}",
                    panic_message(panic.as_ref())
                );
            }
        }
    }
}

impl ExecutionContext for TickBridge {
    fn enqueue(&self, action: PendingAction) {
        // Send only fails when the receiver half is gone, i.e. the bridge
        // itself was dropped; the action's promise then resolves as broken.
        let _ = self.tx.send(action);
    }
}

/// Default [`WorkerPool`]: one OS thread per job.
pub struct ThreadPerJobPool;

impl WorkerPool for ThreadPerJobPool {
    fn execute(&self, job: PendingAction) {
        if let Err(err) = std::thread::Builder::new()
            .name("tickbridge-worker".into())
            .spawn(job)
        {
            tracing::error!(error = %err, "failed to spawn worker thread");
        }
    }
}

impl ExecutionContext for ThreadPerJobPool {
    fn enqueue(&self, action: PendingAction) {
        self.execute(action);
    }
}

/// Run a fallible job on the pool, routing failure or panic to `tracing`
/// instead of losing it. The fire-and-forget replacement: completion is
/// always observed, success silently, failure loudly.
pub fn spawn_supervised<F>(pool: &dyn WorkerPool, name: &'static str, job: F)
where
    F: FnOnce() -> anyhow::Result<()> + Send + 'static,
{
    pool.execute(Box::new(move || {
        match catch_unwind(AssertUnwindSafe(job)) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::error!(task = name, "supervised task failed: {err:#}");
            }
            Err(panic) => {
                tracing::error!(
                    task = name,
                    "supervised task panicked: {}",
                    panic_message(panic.as_ref())
                );
            }
        }
    }));
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelSource;
    use crate::error::{BrokenPromise, Cancelled};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[test]
    fn future_resolves_on_next_drain() {
        let bridge = TickBridge::new();
        let future = move_to(&bridge, &CancelToken::never());
        assert_eq!(bridge.pending_len(), 1);

        bridge.drain_and_run();
        assert_eq!(bridge.pending_len(), 0);
        assert!(pollster::block_on(future).is_ok());
    }

    #[test]
    fn pre_cancelled_token_fails_without_queueing() {
        let bridge = TickBridge::new();
        let source = CancelSource::new();
        source.cancel();

        let future = move_to(&bridge, &source.token());
        assert_eq!(bridge.pending_len(), 0);

        let err = pollster::block_on(future).unwrap_err();
        assert!(err.downcast_ref::<Cancelled>().is_some());
    }

    #[test]
    fn cancel_between_enqueue_and_drain() {
        let bridge = TickBridge::new();
        let source = CancelSource::new();
        let future = move_to(&bridge, &source.token());

        source.cancel();
        bridge.drain_and_run();

        let err = pollster::block_on(future).unwrap_err();
        assert!(err.downcast_ref::<Cancelled>().is_some());
    }

    #[test]
    fn actions_run_in_enqueue_order() {
        let bridge = TickBridge::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..5 {
            let order = Arc::clone(&order);
            bridge.enqueue(Box::new(move || order.lock().unwrap().push(i)));
        }

        bridge.drain_and_run();
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn action_enqueued_during_drain_waits_for_next_drain() {
        let bridge = Arc::new(TickBridge::new());
        let ran_a = Arc::new(AtomicUsize::new(0));
        let ran_b = Arc::new(AtomicUsize::new(0));

        let inner_bridge = Arc::clone(&bridge);
        let a = Arc::clone(&ran_a);
        let b = Arc::clone(&ran_b);
        bridge.enqueue(Box::new(move || {
            a.fetch_add(1, Ordering::SeqCst);
            let b = Arc::clone(&b);
            inner_bridge.enqueue(Box::new(move || {
                b.fetch_add(1, Ordering::SeqCst);
            }));
        }));

        bridge.drain_and_run();
        assert_eq!(ran_a.load(Ordering::SeqCst), 1);
        assert_eq!(ran_b.load(Ordering::SeqCst), 0);

        bridge.drain_and_run();
        assert_eq!(ran_a.load(Ordering::SeqCst), 1);
        assert_eq!(ran_b.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_action_does_not_abort_drain() {
        let bridge = TickBridge::new();
        let survivor = Arc::new(AtomicUsize::new(0));

        bridge.enqueue(Box::new(|| panic!("deliberate test panic")));
        let s = Arc::clone(&survivor);
        bridge.enqueue(Box::new(move || {
            s.fetch_add(1, Ordering::SeqCst);
        }));

        bridge.drain_and_run();
        assert_eq!(survivor.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropping_bridge_breaks_queued_futures() {
        let bridge = TickBridge::new();
        let future = move_to(&bridge, &CancelToken::never());
        drop(bridge);

        let err = pollster::block_on(future).unwrap_err();
        assert!(err.downcast_ref::<BrokenPromise>().is_some());
    }

    #[test]
    fn move_to_worker_pool_resolves() {
        let pool = ThreadPerJobPool;
        let future = move_to(&pool, &CancelToken::never());
        assert!(pollster::block_on(future).is_ok());
    }

    #[test]
    fn enqueue_from_many_threads_all_resolve() {
        let bridge = Arc::new(TickBridge::new());
        let mut futures = Vec::new();
        let mut handles = Vec::new();

        for _ in 0..8 {
            let bridge = Arc::clone(&bridge);
            let (tx, rx) = std::sync::mpsc::channel();
            handles.push(std::thread::spawn(move || {
                tx.send(move_to(bridge.as_ref(), &CancelToken::never()))
                    .unwrap();
            }));
            futures.push(rx);
        }
        for handle in handles {
            handle.join().unwrap();
        }

        bridge.drain_and_run();
        for rx in futures {
            let future = rx.recv().unwrap();
            assert!(pollster::block_on(future).is_ok());
        }
    }

    #[test]
    fn supervised_task_failure_is_contained() {
        // Both branches just have to not unwind into the pool.
        let pool = ThreadPerJobPool;
        let (tx, rx) = std::sync::mpsc::channel();

        let done = tx.clone();
        spawn_supervised(&pool, "failing-task", move || {
            done.send(()).unwrap();
            anyhow::bail!("expected failure")
        });
        spawn_supervised(&pool, "ok-task", move || {
            tx.send(()).unwrap();
            Ok(())
        });

        rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap();
        rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap();
    }
}
