//! Transport-agnostic domain engine for a Sparrow-style decentralized
//! cluster task scheduler: the worker reservation/execution state machine,
//! the per-job scheduler placement state machine, the job-size sampler,
//! and the metrics aggregator. No networking and no event loop live here —
//! see `sparrow-sim` for the discrete-event harness and `sparrow-net` for
//! the live TCP variant.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod duration;
pub mod error;
pub mod ids;
pub mod metrics;
pub mod sampler;
pub mod scheduler;
pub mod transport;
pub mod worker;

pub use duration::DurationProfile;
pub use error::{SparrowError, SparrowResult};
pub use ids::{JobId, ReservationId, SchedulerId, TaskId, WorkerId};
pub use metrics::{AggregateMetrics, SchedulerMetrics};
pub use sampler::{
    FixedSampler, JobSizeSampler, JobSizeSpec, MixedSampler, PowerlawSampler, UniformSampler,
};
pub use scheduler::{Mode, Scheduler};
pub use transport::{JobNotifier, QueueLen, TransportError, TransportResult, WorkerTransport};
pub use worker::{TaskRecord, Worker};
