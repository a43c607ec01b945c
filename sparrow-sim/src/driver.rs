//! The simulation boundary entry point: wires `num_workers` workers and
//! `num_schedulers` schedulers, runs every scheduler fully concurrently to
//! completion under a paused virtual clock, and aggregates the result — the
//! Rust equivalent of `Python_codes/simulation.py::run_sim`.

use crate::transport::SimTransport;
use futures::future::join_all;
use sparrow_core::duration::DurationProfile;
use sparrow_core::ids::{SchedulerId, WorkerId};
use sparrow_core::metrics::{self, AggregateMetrics};
use sparrow_core::sampler::JobSizeSpec;
use sparrow_core::scheduler::{Mode, Scheduler};
use sparrow_core::transport::WorkerTransport;
use sparrow_core::worker::Worker;
use sparrow_core::{SparrowError, SparrowResult};
use std::sync::Arc;
use tracing::info;

/// The configuration surface for one simulation run: `workers, schedulers,
/// jobs, probe_ratio d, ndelay, mode, jobsize + params, seed`.
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub num_workers: u32,
    pub num_schedulers: u32,
    pub jobs_per_scheduler: u32,
    pub probe_ratio: u32,
    pub network_delay_ms: u64,
    pub mode: Mode,
    pub jobsize: JobSizeSpec,
    pub seed: u64,
    pub duration_profile: DurationProfile,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            num_workers: 10,
            num_schedulers: 3,
            jobs_per_scheduler: 200,
            probe_ratio: 2,
            network_delay_ms: 1,
            mode: Mode::Batch,
            jobsize: JobSizeSpec::default(),
            seed: 42,
            duration_profile: DurationProfile::default(),
        }
    }
}

/// Runs one simulation to completion and returns its aggregate metrics.
///
/// Must be called from inside a runtime with its clock paused
/// (`tokio::time::pause()` on a `Builder::new_current_thread()` runtime) —
/// see `run_sim_paused` for a ready-made entry point that sets this up.
pub async fn run_sim(cfg: &SimConfig) -> SparrowResult<AggregateMetrics> {
    let sampler = cfg.jobsize.build()?;

    let workers: Vec<Arc<Worker>> = (0..cfg.num_workers)
        .map(|i| {
            Worker::new(
                WorkerId(i),
                cfg.network_delay_ms,
                cfg.duration_profile,
                cfg.seed.wrapping_add(i as u64),
            )
        })
        .collect();

    let transports: Vec<Arc<dyn WorkerTransport>> = workers
        .iter()
        .map(|w| SimTransport::new(Arc::clone(w), cfg.network_delay_ms) as Arc<dyn WorkerTransport>)
        .collect();

    let schedulers: Vec<Arc<Scheduler>> = (0..cfg.num_schedulers)
        .map(|i| {
            Scheduler::new(
                SchedulerId::new(format!("S{i}")),
                transports.clone(),
                cfg.mode,
                cfg.probe_ratio,
                cfg.jobs_per_scheduler,
                Arc::clone(&sampler),
                cfg.seed,
            )
        })
        .collect();

    info!(
        workers = cfg.num_workers,
        schedulers = cfg.num_schedulers,
        jobs = cfg.jobs_per_scheduler,
        mode = ?cfg.mode,
        "starting simulation run"
    );

    let start = tokio::time::Instant::now();
    let per_scheduler = join_all(schedulers.iter().map(|s| {
        let s = Arc::clone(s);
        async move { s.run().await }
    }))
    .await;
    let sim_time_ms = (tokio::time::Instant::now() - start).as_secs_f64() * 1000.0;

    let completion_means: Vec<f64> = per_scheduler.iter().map(|s| s.completion_avg_ms).collect();
    let rpc_means: Vec<f64> = per_scheduler.iter().map(|s| s.rpc_per_job).collect();

    let all_tasks: Vec<_> = workers.iter().flat_map(|w| w.task_metrics()).collect();
    let (task_wait_avg_ms, task_response_avg_ms, task_service_avg_ms) =
        metrics::task_means(&all_tasks);

    let total_busy: f64 = workers.iter().map(|w| w.busy_time_ms()).sum();
    let worker_util_pct =
        metrics::worker_utilization_pct(total_busy, sim_time_ms, workers.len());

    let qlens: Vec<u32> = workers.iter().map(|w| w.queue_len()).collect();
    let imbalance = metrics::imbalance(&qlens);

    Ok(AggregateMetrics {
        avg_completion_ms: metrics::mean(&completion_means),
        avg_rpc_per_job: metrics::mean(&rpc_means),
        task_wait_avg_ms,
        task_response_avg_ms,
        task_service_avg_ms,
        worker_util_pct,
        imbalance,
        sim_time_ms,
        per_scheduler,
    })
}

/// Convenience wrapper that builds a paused, current-thread runtime and runs
/// `run_sim` to completion inside it — the single call a non-async caller
/// (e.g. `sparrow-cli`) needs.
pub fn run_sim_paused(cfg: SimConfig) -> SparrowResult<AggregateMetrics> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .map_err(|e| SparrowError::config(format!("failed to build simulation runtime: {e}")))?;
    rt.block_on(async {
        tokio::time::pause();
        run_sim(&cfg).await
    })
}
