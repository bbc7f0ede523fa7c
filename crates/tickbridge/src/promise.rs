//! Single-resolution completion handles.
//!
//! A [`Promise`]/[`Future`] pair shares one slot protected by a mutex. The
//! producing side resolves the slot at most once; the consuming side is a
//! plain `std::future::Future` that parks its waker in the slot until the
//! result arrives. No runtime is assumed: whoever resolves the promise
//! wakes the stored waker, whatever executor it belongs to.

use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

use anyhow::Error;

use crate::error::BrokenPromise;

#[derive(Debug)]
struct Core<T> {
    result: Option<anyhow::Result<T>>,
    resolved: bool,
    waker: Option<Waker>,
}

impl<T> Core<T> {
    /// First resolution wins; later attempts are rejected.
    fn resolve(&mut self, result: Result<T, Error>) -> bool {
        if self.resolved {
            return false;
        }
        self.resolved = true;
        self.result = Some(result);
        if let Some(waker) = self.waker.take() {
            waker.wake();
        }
        true
    }
}

/// The producing half: resolves the paired [`Future`] exactly once.
pub struct Promise<T> {
    core: Arc<Mutex<Core<T>>>,
}

/// The consuming half: completes when the paired [`Promise`] resolves.
#[derive(Debug)]
pub struct Future<T> {
    core: Arc<Mutex<Core<T>>>,
}

impl<T> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Promise<T> {
    pub fn new() -> Self {
        Self {
            core: Arc::new(Mutex::new(Core {
                result: None,
                resolved: false,
                waker: None,
            })),
        }
    }

    /// Obtain the future half. One future per promise; a second call hands
    /// out another view of the same slot, which only one poller may consume.
    pub fn get_future(&mut self) -> Future<T> {
        Future {
            core: Arc::clone(&self.core),
        }
    }

    /// Resolve with a value. Returns `false` if already resolved.
    pub fn ok(&mut self, value: T) -> bool {
        self.result(Ok(value))
    }

    /// Resolve with an error. Returns `false` if already resolved.
    pub fn err(&mut self, err: Error) -> bool {
        self.result(Err(err))
    }

    /// Resolve with a result. Returns `false` if already resolved.
    pub fn result(&mut self, result: Result<T, Error>) -> bool {
        self.core.lock().unwrap().resolve(result)
    }
}

impl<T> Drop for Promise<T> {
    fn drop(&mut self) {
        // A future must never hang because its producer disappeared.
        self.core.lock().unwrap().resolve(Err(BrokenPromise.into()));
    }
}

impl<T: Send + 'static> Future<T> {
    /// Leaf future, immediately ready with the provided value.
    pub fn ok(value: T) -> Self {
        Self::result(Ok(value))
    }

    /// Leaf future, immediately ready with the provided error.
    pub fn err(err: Error) -> Self {
        Self::result(Err(err))
    }

    /// Leaf future, immediately ready with the provided result.
    pub fn result(result: Result<T, Error>) -> Self {
        Self {
            core: Arc::new(Mutex::new(Core {
                result: Some(result),
                resolved: true,
                waker: None,
            })),
        }
    }
}

impl<T: Send + 'static> std::future::Future for Future<T> {
    type Output = Result<T, Error>;

    fn poll(self: Pin<&mut Self>, ctx: &mut Context) -> Poll<Self::Output> {
        let waker = ctx.waker().clone();

        let mut core = self.core.lock().unwrap();
        if let Some(result) = core.result.take() {
            Poll::Ready(result)
        } else {
            core.waker.replace(waker);
            Poll::Pending
        }
    }
}
