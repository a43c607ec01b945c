//! Error types for the scheduling engine.

use thiserror::Error;

/// Result alias used throughout `sparrow-core`.
pub type SparrowResult<T> = Result<T, SparrowError>;

/// Errors raised by the domain engine.
///
/// Everything at the RPC boundary (timeouts, malformed replies, unknown
/// reservations) is recovered locally by the transport or the scheduler's
/// fallback logic and never surfaces here. `SparrowError` is reserved for
/// configuration mistakes the caller must fix and for invariant violations
/// that are fatal by design.
#[derive(Debug, Error)]
pub enum SparrowError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invariant violated: {0}")]
    Invariant(String),
}

impl SparrowError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::Invariant(msg.into())
    }
}

/// Logs `msg` at `error!` and aborts the process.
///
/// Used for the class of bug spec.md §7 calls fatal: a duplicate
/// reservation id, negative `R`, or any other condition that means the
/// worker or scheduler state machine has a broken invariant rather than a
/// bad network reply. Panicking after a structured log line satisfies
/// "abort the process with a diagnostic" without hiding the cause behind a
/// bare `panic!("...")`.
pub fn fatal(msg: impl Into<String>) -> ! {
    let msg = msg.into();
    tracing::error!(%msg, "fatal invariant violation, aborting");
    panic!("sparrow: fatal invariant violation: {msg}");
}
