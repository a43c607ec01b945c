//! The per-job placement state machine (spec.md §4.2): probe/request →
//! select → assign → wait-for-completion, in its three flavors.

// ACCEPTABLE: mutex poisoning .expect() is allowed in this module (unrecoverable error)
#![allow(clippy::expect_used)]

use crate::error::fatal;
use crate::ids::{JobId, ReservationId, SchedulerId, TaskId};
use crate::metrics::{self, ReservationCounters, RpcCounters, SchedulerMetrics};
use crate::sampler::JobSizeSampler;
use crate::transport::{JobNotifier, QueueLen, WorkerTransport};
use async_trait::async_trait;
use futures::future::join_all;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tokio::time::Instant;

/// Placement policy. BATCH probes queue lengths and assigns directly;
/// LATE reserves before choosing; LATEPRO additionally cancels reservations
/// it does not convert (spec.md §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Batch,
    Late,
    LatePro,
}

/// `jobinfo[jobid] -> {start, tasks, done?}` (spec.md §3, shape fixed in
/// SPEC_FULL.md §3.1).
#[derive(Debug, Clone)]
struct JobInfo {
    start_ms: f64,
    tasks: u32,
    done_ms: Option<f64>,
}

/// The per-job placement state machine for one scheduler. Seeded
/// independently per spec.md §6: `seed + hash(name)` or equivalent
/// deterministic perturbation, so reruns are reproducible per `(global
/// seed, scheduler id)`.
pub struct Scheduler {
    pub id: SchedulerId,
    workers: Vec<Arc<dyn WorkerTransport>>,
    mode: Mode,
    probe_ratio: u32,
    jobs: u32,
    sampler: Arc<dyn JobSizeSampler>,
    epoch: Instant,
    rng: Mutex<StdRng>,
    rpc: Mutex<RpcCounters>,
    reservations: Mutex<ReservationCounters>,
    jobinfo: Mutex<HashMap<JobId, JobInfo>>,
    wait_events: Mutex<HashMap<(JobId, TaskId), oneshot::Sender<()>>>,
}

impl Scheduler {
    pub fn new(
        id: SchedulerId,
        workers: Vec<Arc<dyn WorkerTransport>>,
        mode: Mode,
        probe_ratio: u32,
        jobs: u32,
        sampler: Arc<dyn JobSizeSampler>,
        seed: u64,
    ) -> Arc<Self> {
        let perturbed = seed.wrapping_add(Self::hash_name(&id.0));
        Arc::new(Self {
            id,
            workers,
            mode,
            probe_ratio: probe_ratio.max(1),
            jobs,
            sampler,
            epoch: Instant::now(),
            rng: Mutex::new(StdRng::seed_from_u64(perturbed)),
            rpc: Mutex::new(RpcCounters::default()),
            reservations: Mutex::new(ReservationCounters::default()),
            jobinfo: Mutex::new(HashMap::new()),
            wait_events: Mutex::new(HashMap::new()),
        })
    }

    fn hash_name(name: &str) -> u64 {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        name.hash(&mut hasher);
        hasher.finish()
    }

    fn now_ms(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64() * 1000.0
    }

    /// Runs every job in this scheduler's `jobs` budget, strictly
    /// sequentially (spec.md §5 "Across jobs in one scheduler"), and
    /// returns the scheduler's summary block (spec.md §4.4).
    pub async fn run(self: &Arc<Self>) -> SchedulerMetrics {
        for j in 0..self.jobs {
            self.run_job(j).await;
        }
        self.results()
    }

    async fn run_job(self: &Arc<Self>, j: u32) {
        let jobid = JobId(format!("{}-J{}", self.id, j));
        let start = self.now_ms();

        let m_job = self.sampler.sample(&mut *self.rng.lock().expect("scheduler state mutex poisoned"));
        self.jobinfo.lock().expect("scheduler state mutex poisoned").insert(
            jobid.clone(),
            JobInfo {
                start_ms: start,
                tasks: m_job,
                done_ms: None,
            },
        );

        let mut receivers = Vec::with_capacity(m_job as usize);
        {
            let mut events = self.wait_events.lock().expect("scheduler state mutex poisoned");
            for t in 0..m_job {
                let (tx, rx) = oneshot::channel();
                events.insert((jobid.clone(), TaskId::new(t)), tx);
                receivers.push(rx);
            }
        }

        match self.mode {
            Mode::Batch => self.run_batch(&jobid, m_job).await,
            Mode::Late => self.run_late(&jobid, m_job).await,
            Mode::LatePro => self.run_latepro(&jobid, m_job).await,
        }

        join_all(receivers).await;

        let end = self.now_ms();
        if let Some(info) = self.jobinfo.lock().expect("scheduler state mutex poisoned").get_mut(&jobid) {
            info.done_ms = Some(end);
        }
        // Cleanup: the task keys for this job are now all fired, drop any
        // stragglers to keep the map from growing unboundedly (spec.md §9
        // design notes).
        let mut events = self.wait_events.lock().expect("scheduler state mutex poisoned");
        for t in 0..m_job {
            events.remove(&(jobid.clone(), TaskId::new(t)));
        }
    }

    fn sample_n_for(&self, m_job: u32) -> usize {
        (self.probe_ratio as usize * m_job as usize)
            .max(1)
            .min(self.workers.len())
    }

    fn choose_sample(&self, n: usize) -> Vec<Arc<dyn WorkerTransport>> {
        let mut rng = self.rng.lock().expect("scheduler state mutex poisoned");
        self.workers
            .choose_multiple(&mut *rng, n)
            .cloned()
            .collect()
    }

    fn count_rpc(&self, f: impl FnOnce(&mut RpcCounters)) {
        let mut c = self.rpc.lock().expect("scheduler state mutex poisoned");
        c.total += 1;
        f(&mut c);
    }

    async fn run_batch(self: &Arc<Self>, jobid: &JobId, m_job: u32) {
        let sample_n = self.sample_n_for(m_job);
        let sampled = self.choose_sample(sample_n);
        let chosen = self.probe_and_select(&sampled, m_job as usize).await;
        self.assign_all(jobid, &chosen).await;
    }

    /// Shared by BATCH and LATE's fallback path: probe every worker in
    /// `sampled`, sort ascending by queue length, and select `m_job`
    /// entries, cycling through the sorted list when `m_job` exceeds
    /// `sample_n` (spec.md §4.2 step 4 — the reuse is deliberate).
    async fn probe_and_select(
        &self,
        sampled: &[Arc<dyn WorkerTransport>],
        m_job: usize,
    ) -> Vec<Arc<dyn WorkerTransport>> {
        let probes = sampled.iter().map(|w| {
            self.count_rpc(|c| c.probe += 1);
            async move { (w.probe().await, Arc::clone(w)) }
        });
        let mut qlist: Vec<(QueueLen, Arc<dyn WorkerTransport>)> = join_all(probes).await;
        qlist.sort_by_key(|(q, _)| *q);

        if qlist.is_empty() {
            return Vec::new();
        }
        (0..m_job).map(|i| Arc::clone(&qlist[i % qlist.len()].1)).collect()
    }

    async fn assign_all(self: &Arc<Self>, jobid: &JobId, chosen: &[Arc<dyn WorkerTransport>]) {
        let notifier: Arc<dyn JobNotifier> = Arc::clone(self) as Arc<dyn JobNotifier>;
        let assigns = chosen.iter().enumerate().map(|(t, w)| {
            self.count_rpc(|c| c.assign += 1);
            let notifier = Arc::clone(&notifier);
            let jobid = jobid.clone();
            async move {
                let _ = w.assign(jobid, TaskId::new(t as u32), None, notifier).await;
            }
        });
        join_all(assigns).await;
    }

    async fn run_late(self: &Arc<Self>, jobid: &JobId, m_job: u32) {
        let (chosen, unused) = self.request_and_choose(jobid, m_job).await;
        self.assign_rid_all(&chosen).await;
        self.fallback_if_short(jobid, m_job, chosen.len()).await;
        drop(unused);
    }

    async fn run_latepro(self: &Arc<Self>, jobid: &JobId, m_job: u32) {
        let (chosen, unused) = self.request_and_choose(jobid, m_job).await;
        self.assign_rid_all(&chosen).await;

        let cancels = unused.iter().map(|(rid, w)| {
            self.count_rpc(|c| c.cancel += 1);
            self.reservations.lock().expect("scheduler state mutex poisoned").wasted += 1;
            let rid = rid.clone();
            async move {
                let _ = w.cancel(rid).await;
            }
        });
        join_all(cancels).await;

        self.fallback_if_short(jobid, m_job, chosen.len()).await;
    }

    /// REQUEST round shared by LATE and LATEPRO: sample `sample_n`
    /// workers, issue REQUEST on all of them in parallel, and split the
    /// successful replies into `chosen` (the first `m_job`, in request
    /// order) and `unused` (the remainder).
    async fn request_and_choose(
        self: &Arc<Self>,
        jobid: &JobId,
        m_job: u32,
    ) -> (
        Vec<(ReservationId, Arc<dyn WorkerTransport>)>,
        Vec<(ReservationId, Arc<dyn WorkerTransport>)>,
    ) {
        let sample_n = self.sample_n_for(m_job);
        let sampled = self.choose_sample(sample_n);
        let notifier: Arc<dyn JobNotifier> = Arc::clone(self) as Arc<dyn JobNotifier>;

        let requests = sampled.iter().enumerate().map(|(i, w)| {
            self.count_rpc(|c| c.request += 1);
            let notifier = Arc::clone(&notifier);
            let jobid = jobid.clone();
            let w = Arc::clone(w);
            async move {
                let result = w
                    .request(jobid, TaskId::new(i as u32), None, notifier)
                    .await;
                result.ok().map(|rid| (rid, w))
            }
        });
        let results: Vec<_> = join_all(requests).await;
        let reservations: Vec<(ReservationId, Arc<dyn WorkerTransport>)> =
            results.into_iter().flatten().collect();
        self.reservations.lock().expect("scheduler state mutex poisoned").created += reservations.len() as u64;

        let split = m_job as usize;
        if reservations.len() <= split {
            (reservations, Vec::new())
        } else {
            let mut reservations = reservations;
            let unused = reservations.split_off(split);
            (reservations, unused)
        }
    }

    async fn assign_rid_all(&self, chosen: &[(ReservationId, Arc<dyn WorkerTransport>)]) {
        let assigns = chosen.iter().map(|(rid, w)| {
            self.count_rpc(|c| c.assign_rid += 1);
            let rid = rid.clone();
            async move { w.assign_rid(rid).await }
        });
        let results = join_all(assigns).await;
        let used = results.into_iter().filter(|r| matches!(r, Ok(true))).count();
        self.reservations.lock().expect("scheduler state mutex poisoned").used += used as u64;
    }

    /// If fewer than `m_job` reservations came back (every worker
    /// declined, or REQUEST timed out for all of them), fall back to a
    /// fresh BATCH-style probe round and fill the shortfall. Shortfall
    /// task ids continue from `T{chosen_len}` (spec.md §4.2 LATE step 5).
    async fn fallback_if_short(self: &Arc<Self>, jobid: &JobId, m_job: u32, chosen_len: usize) {
        if chosen_len >= m_job as usize {
            return;
        }
        let need = m_job as usize - chosen_len;
        let sample_n = self.sample_n_for(m_job);
        let sampled = self.choose_sample(sample_n);
        let selected = self.probe_and_select(&sampled, need).await;

        let notifier: Arc<dyn JobNotifier> = Arc::clone(self) as Arc<dyn JobNotifier>;
        let assigns = selected.iter().enumerate().map(|(t, w)| {
            self.count_rpc(|c| c.assign += 1);
            let notifier = Arc::clone(&notifier);
            let jobid = jobid.clone();
            async move {
                let _ = w
                    .assign(jobid, TaskId::new((chosen_len + t) as u32), None, notifier)
                    .await;
            }
        });
        join_all(assigns).await;
    }

    /// This scheduler's summary block, per spec.md §4.4 and SPEC_FULL.md
    /// §3.1's `tasks_avg` addition.
    pub fn results(&self) -> SchedulerMetrics {
        let jobinfo = self.jobinfo.lock().expect("scheduler state mutex poisoned");
        let completions: Vec<f64> = jobinfo
            .values()
            .filter_map(|info| info.done_ms.map(|done| done - info.start_ms))
            .collect();
        let (p95, p99) = metrics::percentiles(&completions);
        let rpc = self.rpc.lock().expect("scheduler state mutex poisoned").clone();
        let reservations = self.reservations.lock().expect("scheduler state mutex poisoned").clone();
        let tasks_avg = metrics::mean(
            &jobinfo
                .values()
                .map(|info| info.tasks as f64)
                .collect::<Vec<_>>(),
        );

        SchedulerMetrics {
            name: self.id.0.clone(),
            completed_jobs: completions.len() as u64,
            completion_avg_ms: metrics::mean(&completions),
            p95_ms: p95,
            p99_ms: p99,
            rpc_per_job: if completions.is_empty() {
                0.0
            } else {
                rpc.total as f64 / completions.len() as f64
            },
            rpc,
            reservations,
            tasks_avg,
        }
    }
}

#[async_trait]
impl JobNotifier for Scheduler {
    async fn notify_done(&self, job: JobId, task: TaskId) {
        let sender = self.wait_events.lock().expect("scheduler state mutex poisoned").remove(&(job, task));
        if let Some(sender) = sender {
            // A send error means the receiver (the job's `join_all`) was
            // already dropped, which only happens after the job finished;
            // firing an already-fired or abandoned signal is a no-op.
            let _ = sender.send(());
        }
    }
}

/// Checks the fatal invariants spec.md §8 requires to hold at shutdown for
/// a single worker's final queue length; called by drivers after the run
/// completes.
pub fn assert_non_negative(label: &str, value: i64) {
    if value < 0 {
        fatal(format!("{label} went negative: {value}"));
    }
}
