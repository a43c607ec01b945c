//! `WorkerTransport` / `JobNotifier`: the two seams that let the scheduler
//! and worker state machines run unmodified whether RPCs travel in-process
//! or over a real socket.
//!
//! `sparrow-sim` implements these as in-process calls with injected
//! virtual delay; `sparrow-net` implements them as real TCP round trips.
//! Neither implementation lives in this crate: this is pure domain logic
//! plus `async fn`s that `.await` an injected transport.

use crate::ids::{JobId, ReservationId, TaskId, WorkerId};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// A worker's advertised queue length (`running + |reservations|`).
/// `u32::MAX` is used by transports to represent "unknown" (malformed
/// reply in the live variant, or a probe that timed out) so that the
/// scheduler's ascending sort naturally deprioritizes that worker without
/// a branch at the call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct QueueLen(pub u32);

impl QueueLen {
    pub const UNKNOWN: QueueLen = QueueLen(u32::MAX);
}

/// Errors a transport call can surface. These never propagate past the
/// scheduler: a `Request`/`Assign`/`AssignRid`/`Cancel` failure is folded
/// into the scheduler's shortfall/fallback handling rather than aborting
/// the job.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("rpc timed out")]
    Timeout,
    #[error("rpc failed: {0}")]
    Failed(String),
}

pub type TransportResult<T> = Result<T, TransportError>;

/// One worker's RPC surface, as seen by a scheduler.
#[async_trait]
pub trait WorkerTransport: Send + Sync {
    fn worker_id(&self) -> WorkerId;

    /// `PROBE`. Never fails: a timeout or malformed reply is folded into
    /// `QueueLen::UNKNOWN` by the transport implementation.
    async fn probe(&self) -> QueueLen;

    /// `REQUEST(jobid, tid, ...)`. `dur_override` is `Some` only in
    /// transports where the scheduler supplies the duration (the socket
    /// wire protocol); `None` means the worker samples its own duration.
    async fn request(
        &self,
        job: JobId,
        task: TaskId,
        dur_override: Option<u64>,
        notifier: Arc<dyn JobNotifier>,
    ) -> TransportResult<ReservationId>;

    /// `ASSIGN(jobid, tid, ...)`. Used by BATCH only.
    async fn assign(
        &self,
        job: JobId,
        task: TaskId,
        dur_override: Option<u64>,
        notifier: Arc<dyn JobNotifier>,
    ) -> TransportResult<()>;

    /// `ASSIGN_RID(rid)`. `Ok(true)` is `STARTED`, `Ok(false)` is `ERR`
    /// (unknown reservation); only a genuine transport failure is `Err`.
    async fn assign_rid(&self, rid: ReservationId) -> TransportResult<bool>;

    /// `CANCEL(rid)`. Idempotent; a transport failure here is logged and
    /// otherwise ignored by callers.
    async fn cancel(&self, rid: ReservationId) -> TransportResult<()>;
}

/// The worker → scheduler completion callback (`DONE <jobid> <taskid>`).
#[async_trait]
pub trait JobNotifier: Send + Sync {
    async fn notify_done(&self, job: JobId, task: TaskId);
}
