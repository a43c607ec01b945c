//! Metrics aggregation: per-job completion percentiles, per-task
//! wait/response/service, per-worker utilization/imbalance, RPC counters,
//! reservation created/used/wasted.

// ACCEPTABLE: these .expect() calls guard invariants (non-NaN floats,
// non-empty slices already checked by the caller), not fallible I/O.
#![allow(clippy::expect_used)]

use crate::worker::TaskRecord;

/// Per-scheduler RPC and reservation counters, incremented exactly once
/// per call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RpcCounters {
    pub total: u64,
    pub probe: u64,
    pub assign: u64,
    pub request: u64,
    pub assign_rid: u64,
    pub cancel: u64,
}

#[derive(Debug, Clone, Default)]
pub struct ReservationCounters {
    pub created: u64,
    pub used: u64,
    pub wasted: u64,
}

/// One scheduler's summary block, mirroring `BatchScheduler.results()` /
/// `LateProScheduler.results()` in `Python_codes/batch.py`, plus
/// `tasks_avg`.
#[derive(Debug, Clone)]
pub struct SchedulerMetrics {
    pub name: String,
    pub completed_jobs: u64,
    pub completion_avg_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub rpc_per_job: f64,
    pub rpc: RpcCounters,
    pub reservations: ReservationCounters,
    pub tasks_avg: f64,
}

/// The cross-run aggregate returned by the simulation boundary entry point.
#[derive(Debug, Clone)]
pub struct AggregateMetrics {
    pub avg_completion_ms: f64,
    pub avg_rpc_per_job: f64,
    pub task_wait_avg_ms: f64,
    pub task_response_avg_ms: f64,
    pub task_service_avg_ms: f64,
    pub worker_util_pct: f64,
    pub imbalance: f64,
    pub sim_time_ms: f64,
    pub per_scheduler: Vec<SchedulerMetrics>,
}

/// Arithmetic mean, `0.0` for an empty slice (matches
/// `statistics.mean` being guarded by `if comps else 0.0` throughout
/// `Python_codes/batch.py`).
pub fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        0.0
    } else {
        xs.iter().sum::<f64>() / xs.len() as f64
    }
}

/// Python's `statistics.quantiles(data, n=100, method='exclusive')`,
/// returning the 99 cut points. `data` must already be sorted ascending.
/// For fewer than two points, every cut point collapses to the single
/// available value (or `0.0` if there is none).
fn quantiles_exclusive_100(sorted: &[f64]) -> Vec<f64> {
    const N: i64 = 100;
    let ld = sorted.len() as i64;
    if ld < 2 {
        let v = sorted.first().copied().unwrap_or(0.0);
        return vec![v; (N - 1) as usize];
    }
    let m = ld + 1;
    (1..N)
        .map(|i| {
            let mut j = i * m / N;
            j = j.clamp(1, ld - 1);
            let delta = i * m - j * N;
            (sorted[(j - 1) as usize] * (N - delta) as f64 + sorted[j as usize] * delta as f64)
                / N as f64
        })
        .collect()
}

/// p95/p99 over per-job completion times: linear interpolated quantiles
/// over the 100-quantile grid, with the lookup index clamped to
/// `min(94|98, n-1)` when there are fewer than 100 jobs.
pub fn percentiles(completions_ms: &[f64]) -> (f64, f64) {
    if completions_ms.is_empty() {
        return (0.0, 0.0);
    }
    let mut sorted = completions_ms.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).expect("completion times are never NaN"));
    let q = quantiles_exclusive_100(&sorted);
    let n = sorted.len();
    let p95_idx = 94usize.min(n - 1);
    let p99_idx = 98usize.min(n - 1);
    (q[p95_idx], q[p99_idx])
}

/// `util = sum(busy_time) / (sim_end * |workers|) * 100`.
pub fn worker_utilization_pct(total_busy_ms: f64, sim_end_ms: f64, worker_count: usize) -> f64 {
    if sim_end_ms <= 0.0 || worker_count == 0 {
        return 0.0;
    }
    (total_busy_ms / (sim_end_ms * worker_count as f64)) * 100.0
}

/// `imbalance = (max_q + 1) / (min_q + 1)`.
pub fn imbalance(queue_lengths: &[u32]) -> f64 {
    if queue_lengths.is_empty() {
        return 1.0;
    }
    let max_q = *queue_lengths.iter().max().expect("non-empty");
    let min_q = *queue_lengths.iter().min().expect("non-empty");
    (max_q as f64 + 1.0) / (min_q as f64 + 1.0)
}

/// Reduces per-worker task records into the three cross-run task means.
pub fn task_means(all_tasks: &[TaskRecord]) -> (f64, f64, f64) {
    let wait: Vec<f64> = all_tasks.iter().map(|t| t.wait_ms).collect();
    let resp: Vec<f64> = all_tasks.iter().map(|t| t.response_ms).collect();
    let svc: Vec<f64> = all_tasks.iter().map(|t| t.duration_ms as f64).collect();
    (mean(&wait), mean(&resp), mean(&svc))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn mean_of_empty_is_zero() {
        assert_eq!(mean(&[]), 0.0);
    }

    #[test]
    fn percentiles_of_empty_are_zero() {
        assert_eq!(percentiles(&[]), (0.0, 0.0));
    }

    #[test]
    fn percentiles_of_single_value_collapse_to_it() {
        let (p95, p99) = percentiles(&[42.0]);
        assert_eq!(p95, 42.0);
        assert_eq!(p99, 42.0);
    }

    #[test]
    fn percentiles_of_uniform_100_run_match_expected_order() {
        let data: Vec<f64> = (1..=200).map(|i| i as f64).collect();
        let (p95, p99) = percentiles(&data);
        assert!(p95 < p99);
        assert!(p95 > 150.0 && p95 < 200.0);
        assert!(p99 > p95 && p99 <= 200.0);
    }

    #[test]
    fn imbalance_of_equal_queues_is_one() {
        assert_eq!(imbalance(&[3, 3, 3]), 1.0);
    }

    #[test]
    fn imbalance_reflects_spread() {
        // (5+1)/(0+1) = 6.0
        assert_eq!(imbalance(&[0, 2, 5]), 6.0);
    }

    #[test]
    fn utilization_is_zero_with_no_elapsed_time() {
        assert_eq!(worker_utilization_pct(100.0, 0.0, 4), 0.0);
    }
}
