//! The worker-side reservation + execution state machine.
//!
//! A `Worker` is transport-agnostic: `sparrow-sim` drives it directly
//! in-process, `sparrow-net` drives it from a TCP connection handler. Both
//! wrap every call in their own network delay; the worker itself is
//! synchronous with respect to its five handlers (PROBE, REQUEST, ASSIGN,
//! ASSIGN_RID, CANCEL) and only schedules asynchronous work for task
//! execution.

use crate::duration::DurationProfile;
use crate::error::fatal;
use crate::ids::{JobId, ReservationId, TaskId, WorkerId};
use crate::transport::JobNotifier;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

/// An immutable, completed task record — produced once at completion and
/// never mutated thereafter.
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub job: JobId,
    pub task: TaskId,
    pub duration_ms: u64,
    pub start_ms: f64,
    pub end_ms: f64,
    /// `start - assigned_at`
    pub wait_ms: f64,
    /// `end - assigned_at`
    pub response_ms: f64,
}

struct Reservation {
    job: JobId,
    task: TaskId,
    duration_ms: u64,
    notifier: Arc<dyn JobNotifier>,
    created_at_ms: f64,
}

struct WorkerInner {
    running: u32,
    reservations: HashMap<ReservationId, Reservation>,
    busy_time_ms: f64,
    task_metrics: Vec<TaskRecord>,
    rng: StdRng,
}

/// Per-worker state: running count, pending reservations, accumulated
/// busy time and completed task history. Owns a single mutex covering all
/// of the above, since none of it is ever touched without holding it.
pub struct Worker {
    pub id: WorkerId,
    pub network_delay_ms: u64,
    duration_profile: DurationProfile,
    epoch: Instant,
    inner: Mutex<WorkerInner>,
}

impl Worker {
    pub fn new(
        id: WorkerId,
        network_delay_ms: u64,
        duration_profile: DurationProfile,
        seed: u64,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            network_delay_ms,
            duration_profile,
            epoch: Instant::now(),
            inner: Mutex::new(WorkerInner {
                running: 0,
                reservations: HashMap::new(),
                busy_time_ms: 0.0,
                task_metrics: Vec::new(),
                rng: StdRng::seed_from_u64(seed),
            }),
        })
    }

    fn now_ms(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64() * 1000.0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, WorkerInner> {
        self.inner
            .lock()
            .unwrap_or_else(|_| fatal("worker state mutex poisoned"))
    }

    /// Advertised queue length: `R + |reservations|`.
    pub fn queue_len(&self) -> u32 {
        let inner = self.lock();
        inner.running + inner.reservations.len() as u32
    }

    /// `PROBE () -> Q <q>`. Never mutates state.
    pub fn probe(&self) -> u32 {
        self.queue_len()
    }

    /// `REQUEST(jobid, tid, [dur, sched]) -> RID <rid>`.
    pub fn request(
        self: &Arc<Self>,
        job: JobId,
        task: TaskId,
        dur_override: Option<u64>,
        notifier: Arc<dyn JobNotifier>,
    ) -> ReservationId {
        let now = self.now_ms();
        let mut inner = self.lock();
        let dur = dur_override.unwrap_or_else(|| self.duration_profile.sample(&mut inner.rng));
        let rid = ReservationId::generate(&mut inner.rng);
        if inner.reservations.contains_key(&rid) {
            drop(inner);
            fatal(format!("reservation id collision: {rid}"));
        }
        inner.reservations.insert(
            rid.clone(),
            Reservation {
                job,
                task,
                duration_ms: dur,
                notifier,
                created_at_ms: now,
            },
        );
        rid
    }

    /// `ASSIGN(jobid, tid, sched) -> OK`. Used by BATCH only.
    pub fn assign(
        self: &Arc<Self>,
        job: JobId,
        task: TaskId,
        dur_override: Option<u64>,
        notifier: Arc<dyn JobNotifier>,
    ) {
        let assigned_at = self.now_ms();
        let dur = {
            let mut inner = self.lock();
            let dur =
                dur_override.unwrap_or_else(|| self.duration_profile.sample(&mut inner.rng));
            inner.running += 1;
            dur
        };
        tokio::spawn(Self::exec(
            Arc::clone(self),
            job,
            task,
            dur,
            notifier,
            assigned_at,
        ));
    }

    /// `ASSIGN_RID(rid) -> OK | ERR`. Removes and converts the reservation
    /// if present; `false` ("ERR") if it was never valid, already
    /// consumed, or cancelled.
    pub fn assign_rid(self: &Arc<Self>, rid: ReservationId) -> bool {
        let reservation = {
            let mut inner = self.lock();
            match inner.reservations.remove(&rid) {
                Some(r) => {
                    inner.running += 1;
                    Some(r)
                }
                None => None,
            }
        };
        let Some(reservation) = reservation else {
            return false;
        };
        // assigned_at is the reservation's creation time, not "now" —
        // this is intentional: late binding charges wait from reservation
        // moment, not from the assign moment (spec.md §4.1 item 4).
        tokio::spawn(Self::exec(
            Arc::clone(self),
            reservation.job,
            reservation.task,
            reservation.duration_ms,
            reservation.notifier,
            reservation.created_at_ms,
        ));
        true
    }

    /// `CANCEL(rid) -> CANCELLED`. Idempotent on an unknown `rid`.
    pub fn cancel(&self, rid: ReservationId) {
        let mut inner = self.lock();
        inner.reservations.remove(&rid);
    }

    async fn exec(
        self: Arc<Self>,
        job: JobId,
        task: TaskId,
        duration_ms: u64,
        notifier: Arc<dyn JobNotifier>,
        assigned_at_ms: f64,
    ) {
        let start = self.now_ms();
        tokio::time::sleep(tokio::time::Duration::from_millis(duration_ms)).await;
        let end = self.now_ms();

        {
            let mut inner = self.lock();
            if inner.running == 0 {
                drop(inner);
                fatal("worker running count went negative");
            }
            inner.running -= 1;
            inner.busy_time_ms += end - start;
            inner.task_metrics.push(TaskRecord {
                job: job.clone(),
                task: task.clone(),
                duration_ms,
                start_ms: start,
                end_ms: end,
                wait_ms: start - assigned_at_ms,
                response_ms: end - assigned_at_ms,
            });
        }

        tokio::time::sleep(tokio::time::Duration::from_millis(self.network_delay_ms)).await;
        // Best-effort: a failed notification is suppressed here; the
        // scheduler's wait for job completion will simply never observe
        // it (spec.md §4.1 "Execution").
        notifier.notify_done(job, task).await;
    }

    /// Snapshot of completed task records, for the metrics aggregator.
    pub fn task_metrics(&self) -> Vec<TaskRecord> {
        self.lock().task_metrics.clone()
    }

    /// Total accumulated busy time across all completed tasks.
    pub fn busy_time_ms(&self) -> f64 {
        self.lock().busy_time_ms
    }

    /// Outstanding reservation count, for shutdown-time invariant checks.
    pub fn reservation_count(&self) -> usize {
        self.lock().reservations.len()
    }

    /// Currently-executing task count (`R`).
    pub fn running_count(&self) -> u32 {
        self.lock().running
    }
}
