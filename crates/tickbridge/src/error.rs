//! Error types for tickbridge.
//!
//! Failures travel through [`crate::promise::Future`] as `anyhow::Error`,
//! with the typed leaf errors below recoverable via `downcast_ref`.
//! Cancellation is always surfaced as [`Cancelled`], never as a generic
//! failure, so callers can distinguish "told to stop" from "broke".

use thiserror::Error;

/// A pending action's cancellation token was signaled before the action ran.
///
/// The action's side effects did not happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("pending action was cancelled before it ran")]
pub struct Cancelled;

/// The resolving side of a promise was dropped before completion.
///
/// Seen by a future whose destination context was torn down with the
/// bookkeeping action still queued, e.g. a [`crate::bridge::TickBridge`]
/// dropped before its next drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("promise was dropped before completion")]
pub struct BrokenPromise;
