//! Six concrete placement scenarios plus a determinism check, run under a
//! paused virtual clock so the assertions are exact instead of timing-flaky.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use sparrow_core::duration::DurationProfile;
use sparrow_core::ids::{JobId, ReservationId, SchedulerId, TaskId, WorkerId};
use sparrow_core::sampler::{FixedSampler, JobSizeSampler};
use sparrow_core::scheduler::{Mode, Scheduler};
use sparrow_core::transport::{
    JobNotifier, QueueLen, TransportError, TransportResult, WorkerTransport,
};
use sparrow_core::worker::Worker;
use sparrow_sim::driver::{run_sim, SimConfig};
use sparrow_sim::transport::SimTransport;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-6
}

/// Wraps a `SimTransport`, counting every `assign` call per worker — used to
/// observe BATCH's cyclic worker reuse (scenario 5) without depending on
/// which concrete worker the scheduler's RNG happens to sample first.
struct CountingTransport {
    inner: Arc<dyn WorkerTransport>,
    assigns: Arc<AtomicUsize>,
}

#[async_trait]
impl WorkerTransport for CountingTransport {
    fn worker_id(&self) -> WorkerId {
        self.inner.worker_id()
    }
    async fn probe(&self) -> QueueLen {
        self.inner.probe().await
    }
    async fn request(
        &self,
        job: JobId,
        task: TaskId,
        dur_override: Option<u64>,
        notifier: Arc<dyn JobNotifier>,
    ) -> TransportResult<ReservationId> {
        self.inner.request(job, task, dur_override, notifier).await
    }
    async fn assign(
        &self,
        job: JobId,
        task: TaskId,
        dur_override: Option<u64>,
        notifier: Arc<dyn JobNotifier>,
    ) -> TransportResult<()> {
        self.assigns.fetch_add(1, Ordering::SeqCst);
        self.inner.assign(job, task, dur_override, notifier).await
    }
    async fn assign_rid(&self, rid: ReservationId) -> TransportResult<bool> {
        self.inner.assign_rid(rid).await
    }
    async fn cancel(&self, rid: ReservationId) -> TransportResult<()> {
        self.inner.cancel(rid).await
    }
}

/// Wraps a `SimTransport`, always failing `request` — the "every REQUEST
/// times out" fault scenario 4 injects. Every other RPC delegates normally.
struct FlakyRequestTransport(Arc<dyn WorkerTransport>);

#[async_trait]
impl WorkerTransport for FlakyRequestTransport {
    fn worker_id(&self) -> WorkerId {
        self.0.worker_id()
    }
    async fn probe(&self) -> QueueLen {
        self.0.probe().await
    }
    async fn request(
        &self,
        _job: JobId,
        _task: TaskId,
        _dur_override: Option<u64>,
        _notifier: Arc<dyn JobNotifier>,
    ) -> TransportResult<ReservationId> {
        Err(TransportError::Failed("injected fault: REQUEST timed out".into()))
    }
    async fn assign(
        &self,
        job: JobId,
        task: TaskId,
        dur_override: Option<u64>,
        notifier: Arc<dyn JobNotifier>,
    ) -> TransportResult<()> {
        self.0.assign(job, task, dur_override, notifier).await
    }
    async fn assign_rid(&self, rid: ReservationId) -> TransportResult<bool> {
        self.0.assign_rid(rid).await
    }
    async fn cancel(&self, rid: ReservationId) -> TransportResult<()> {
        self.0.cancel(rid).await
    }
}

fn fixed_sampler(k: u32) -> Arc<dyn JobSizeSampler> {
    Arc::new(FixedSampler(k))
}

/// Scenario 1: single worker, single scheduler, BATCH, one job of one task,
/// `d=1`, `nd=1`, a fixed 30ms task. Completion ≈ `4·nd + 30 = 34ms`;
/// `rpc_total = 2` (one probe, one assign).
#[tokio::test(start_paused = true)]
async fn scenario_1_single_worker_batch_exact_timing() {
    let worker = Worker::new(WorkerId(0), 1, DurationProfile::new(30, 30, 0.0), 1);
    let transports: Vec<Arc<dyn WorkerTransport>> =
        vec![SimTransport::new(worker, 1) as Arc<dyn WorkerTransport>];
    let scheduler = Scheduler::new(
        SchedulerId::new("S0"),
        transports,
        Mode::Batch,
        1,
        1,
        fixed_sampler(1),
        1,
    );

    let metrics = scheduler.run().await;
    assert_eq!(metrics.completed_jobs, 1);
    assert!(close(metrics.completion_avg_ms, 34.0), "{}", metrics.completion_avg_ms);
    assert_eq!(metrics.rpc.total, 2);
    assert_eq!(metrics.rpc.probe, 1);
    assert_eq!(metrics.rpc.assign, 1);
    assert_eq!(metrics.rpc.request, 0);
    assert_eq!(metrics.rpc.assign_rid, 0);
    assert_eq!(metrics.rpc.cancel, 0);
}

/// Scenario 2: two workers, BATCH, one job of two tasks, `d=2`, `nd=0`.
/// `sample_n = min(2, max(1, 2*2)) = 2`, so both workers are probed once and
/// both tasks are assigned in parallel — completion collapses to the task
/// duration itself, with no dispatch overhead since `nd=0`.
#[tokio::test(start_paused = true)]
async fn scenario_2_two_worker_batch_parity() {
    let workers: Vec<_> = (0..2)
        .map(|i| Worker::new(WorkerId(i), 0, DurationProfile::new(20, 20, 0.0), i as u64 + 1))
        .collect();
    let transports: Vec<Arc<dyn WorkerTransport>> = workers
        .iter()
        .map(|w| SimTransport::new(Arc::clone(w), 0) as Arc<dyn WorkerTransport>)
        .collect();
    let scheduler = Scheduler::new(
        SchedulerId::new("S0"),
        transports,
        Mode::Batch,
        2,
        1,
        fixed_sampler(2),
        7,
    );

    let metrics = scheduler.run().await;
    assert_eq!(metrics.completed_jobs, 1);
    assert!(close(metrics.completion_avg_ms, 20.0), "{}", metrics.completion_avg_ms);
    assert_eq!(metrics.rpc.probe, 2);
    assert_eq!(metrics.rpc.assign, 2);
}

/// Scenario 3: four workers, LATEPRO, one job of two tasks, `d=3`, `nd=1`.
/// `sample_n = min(4, max(1, 3*2)) = 4`: every worker gets a REQUEST, the
/// first two (in request order) are converted via ASSIGN_RID, the remaining
/// two are proactively CANCELled.
#[tokio::test(start_paused = true)]
async fn scenario_3_four_worker_latepro_exact_counts() {
    let workers: Vec<_> = (0..4)
        .map(|i| Worker::new(WorkerId(i), 1, DurationProfile::default(), i as u64 + 1))
        .collect();
    let transports: Vec<Arc<dyn WorkerTransport>> = workers
        .iter()
        .map(|w| SimTransport::new(Arc::clone(w), 1) as Arc<dyn WorkerTransport>)
        .collect();
    let scheduler = Scheduler::new(
        SchedulerId::new("S0"),
        transports,
        Mode::LatePro,
        3,
        1,
        fixed_sampler(2),
        3,
    );

    let metrics = scheduler.run().await;
    assert_eq!(metrics.completed_jobs, 1);
    assert_eq!(metrics.rpc.request, 4);
    assert_eq!(metrics.rpc.assign_rid, 2);
    assert_eq!(metrics.rpc.cancel, 2);
    assert_eq!(metrics.rpc.probe, 0);
    assert_eq!(metrics.rpc.assign, 0);
    assert_eq!(metrics.reservations.created, 4);
    assert_eq!(metrics.reservations.used, 2);
    assert_eq!(metrics.reservations.wasted, 2);
}

/// Scenario 4: LATE with every REQUEST failing (injected fault). The
/// scheduler's fallback probe round must run and assign all `m_job` tasks
/// directly, and every task must still complete.
#[tokio::test(start_paused = true)]
async fn scenario_4_late_with_every_request_timing_out_falls_back_to_batch() {
    let workers: Vec<_> = (0..5)
        .map(|i| Worker::new(WorkerId(i), 0, DurationProfile::new(5, 5, 0.0), i as u64 + 1))
        .collect();
    let transports: Vec<Arc<dyn WorkerTransport>> = workers
        .iter()
        .map(|w| {
            let sim = SimTransport::new(Arc::clone(w), 0) as Arc<dyn WorkerTransport>;
            Arc::new(FlakyRequestTransport(sim)) as Arc<dyn WorkerTransport>
        })
        .collect();
    let scheduler = Scheduler::new(
        SchedulerId::new("S0"),
        transports,
        Mode::Late,
        2,
        1,
        fixed_sampler(3),
        11,
    );

    let metrics = scheduler.run().await;
    assert_eq!(metrics.completed_jobs, 1, "every task must still complete via fallback");
    // sample_n = min(5, max(1, 2*3)) = 5: every worker is REQUESTed (and fails),
    // then the fallback probes the same 5 and ASSIGNs the 3 needed tasks directly.
    assert_eq!(metrics.rpc.request, 5);
    assert_eq!(metrics.rpc.probe, 5);
    assert_eq!(metrics.rpc.assign, 3);
    assert_eq!(metrics.rpc.assign_rid, 0);
    assert_eq!(metrics.rpc.cancel, 0, "LATE never cancels");
    assert_eq!(metrics.reservations.created, 0);
}

/// Scenario 5: BATCH, `m_job=5`, `sample_n=3` (three workers, `d=1`).
/// Selection must cycle `sorted[0], sorted[1], sorted[2], sorted[0],
/// sorted[1]` — i.e. two workers receive two assigns each and one receives
/// one, independent of which physical worker ends up in which sorted slot.
#[tokio::test(start_paused = true)]
async fn scenario_5_batch_cyclic_reuse_when_m_job_exceeds_sample_n() {
    let workers: Vec<_> = (0..3)
        .map(|i| Worker::new(WorkerId(i), 0, DurationProfile::new(5, 5, 0.0), i as u64 + 1))
        .collect();
    let counters: Vec<Arc<AtomicUsize>> = (0..3).map(|_| Arc::new(AtomicUsize::new(0))).collect();
    let transports: Vec<Arc<dyn WorkerTransport>> = workers
        .iter()
        .zip(counters.iter())
        .map(|(w, c)| {
            let sim = SimTransport::new(Arc::clone(w), 0) as Arc<dyn WorkerTransport>;
            Arc::new(CountingTransport {
                inner: sim,
                assigns: Arc::clone(c),
            }) as Arc<dyn WorkerTransport>
        })
        .collect();
    let scheduler = Scheduler::new(
        SchedulerId::new("S0"),
        transports,
        Mode::Batch,
        1,
        1,
        fixed_sampler(5),
        5,
    );

    let metrics = scheduler.run().await;
    assert_eq!(metrics.completed_jobs, 1);
    assert_eq!(metrics.rpc.assign, 5);
    let mut counts: Vec<usize> = counters.iter().map(|c| c.load(Ordering::SeqCst)).collect();
    counts.sort_unstable();
    assert_eq!(counts, vec![1, 2, 2], "cyclic reuse must split 5 assigns as 2/2/1");
}

/// Scenario 6: LATEPRO stress — 10 workers, 3 schedulers, 200 jobs each,
/// `d=2`, mixed job-size. Every scheduler's reservation ledger must balance
/// exactly, and the aggregate's derived statistics must be well-formed.
#[tokio::test(start_paused = true)]
async fn scenario_6_latepro_stress_determinism_and_reservation_balance() {
    use sparrow_core::sampler::JobSizeSpec;

    let cfg = SimConfig {
        num_workers: 10,
        num_schedulers: 3,
        jobs_per_scheduler: 200,
        probe_ratio: 2,
        network_delay_ms: 2,
        mode: Mode::LatePro,
        jobsize: JobSizeSpec::Mixed { max: 200 },
        seed: 99,
        duration_profile: DurationProfile::default(),
    };

    let metrics = run_sim(&cfg).await.expect("stress config is valid");
    assert_eq!(metrics.per_scheduler.len(), 3);
    for s in &metrics.per_scheduler {
        assert_eq!(s.completed_jobs, 200);
        assert_eq!(
            s.reservations.used + s.reservations.wasted,
            s.reservations.created,
            "every reservation must resolve to exactly one terminal state"
        );
        assert!(s.rpc_per_job > 0.0);
    }
    assert!(metrics.imbalance.is_finite());
    assert!(metrics.avg_rpc_per_job > 0.0);
}

/// Determinism: fixing every input fixes every aggregate metric bit-for-bit.
#[tokio::test(start_paused = true)]
async fn same_config_twice_is_bit_for_bit_identical() {
    use sparrow_core::sampler::JobSizeSpec;

    let cfg = SimConfig {
        num_workers: 6,
        num_schedulers: 2,
        jobs_per_scheduler: 40,
        probe_ratio: 2,
        network_delay_ms: 1,
        mode: Mode::Late,
        jobsize: JobSizeSpec::Uniform { lo: 1, hi: 6 },
        seed: 2024,
        duration_profile: DurationProfile::default(),
    };

    let a = run_sim(&cfg).await.unwrap();
    let b = run_sim(&cfg).await.unwrap();
    assert_eq!(format!("{a:?}"), format!("{b:?}"));
}
