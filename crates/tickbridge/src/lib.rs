//! tickbridge: cross-thread execution bridge and deferred-apply collections
//! for host-driven tick loops.
//!
//! Background threads (engine callbacks, network handlers, workers) hand
//! data and control to a single-threaded tick loop the host owns (this
//! crate only participates when the host drains it once per tick) and back
//! out to a worker pool, without locks held across the hand-off and without
//! readers ever seeing a half-mutated collection.
//!
//! # Architecture
//!
//! ```text
//! producer threads ──► TickBridge queue ──► drain_and_run()   (per tick)
//!                 ──► DeferredMap pending ──► apply_changes() (per tick)
//!                 ──► BatchBuffer ──► flush loop ──► callback (per interval)
//! ```
//!
//! # Modules
//!
//! - `bridge`: pending-action queues, tick drain, worker pool, supervised
//!   spawns
//! - `promise`: single-resolution completion handles
//! - `cancel`: cancellation source/token with cancellable waits
//! - `deferred`: deferred-apply map and set
//! - `throttle`: refill-on-empty rate-limited reader
//! - `entities`: entity add/remove event plumbing and the mapped cache
//! - `batch`: time-windowed batch buffer
//! - `error`: typed errors carried through futures
//!
//! # Safety
//!
//! This crate forbids unsafe code.

#![forbid(unsafe_code)]

pub mod batch;
pub mod bridge;
pub mod cancel;
pub mod deferred;
pub mod entities;
pub mod error;
pub mod promise;
pub mod throttle;

pub use batch::BatchBuffer;
pub use bridge::{
    move_to, spawn_supervised, ExecutionContext, PendingAction, ThreadPerJobPool, TickBridge,
    WorkerPool,
};
pub use cancel::{CancelSource, CancelToken};
pub use deferred::{DeferredMap, DeferredSet};
pub use entities::{EntityHub, EntityListener, EntitySource, ListenerId, MappedEntityCache};
pub use error::{BrokenPromise, Cancelled};
pub use promise::{Future, Promise};
pub use throttle::{TakeIter, ThrottledReader};
