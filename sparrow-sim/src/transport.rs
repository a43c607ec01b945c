//! In-process `WorkerTransport` for the simulation variant: every RPC is a
//! direct call into a same-process `Worker`, bracketed by the configured
//! network delay on both legs — mirroring `rpc_probe`/`rpc_assign`/... in
//! `Python_codes/batch.py` and `Python_codes/latepro.py`, which each wrap
//! their `handle_*` call in `yield env.timeout(ms(nd))` before and after.

use async_trait::async_trait;
use sparrow_core::ids::{JobId, ReservationId, TaskId, WorkerId};
use sparrow_core::transport::{JobNotifier, QueueLen, TransportResult, WorkerTransport};
use sparrow_core::worker::Worker;
use std::sync::Arc;
use tokio::time::Duration;

/// Wraps one `Arc<Worker>` with the scheduler-side network delay.
pub struct SimTransport {
    worker: Arc<Worker>,
    network_delay_ms: u64,
}

impl SimTransport {
    pub fn new(worker: Arc<Worker>, network_delay_ms: u64) -> Arc<Self> {
        Arc::new(Self {
            worker,
            network_delay_ms,
        })
    }

    async fn delay(&self) {
        if self.network_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.network_delay_ms)).await;
        }
    }
}

#[async_trait]
impl WorkerTransport for SimTransport {
    fn worker_id(&self) -> WorkerId {
        self.worker.id
    }

    async fn probe(&self) -> QueueLen {
        self.delay().await;
        let q = self.worker.probe();
        self.delay().await;
        QueueLen(q)
    }

    async fn request(
        &self,
        job: JobId,
        task: TaskId,
        dur_override: Option<u64>,
        notifier: Arc<dyn JobNotifier>,
    ) -> TransportResult<ReservationId> {
        self.delay().await;
        let rid = self.worker.request(job, task, dur_override, notifier);
        self.delay().await;
        Ok(rid)
    }

    async fn assign(
        &self,
        job: JobId,
        task: TaskId,
        dur_override: Option<u64>,
        notifier: Arc<dyn JobNotifier>,
    ) -> TransportResult<()> {
        self.delay().await;
        self.worker.assign(job, task, dur_override, notifier);
        self.delay().await;
        Ok(())
    }

    async fn assign_rid(&self, rid: ReservationId) -> TransportResult<bool> {
        self.delay().await;
        let started = self.worker.assign_rid(rid);
        self.delay().await;
        Ok(started)
    }

    async fn cancel(&self, rid: ReservationId) -> TransportResult<()> {
        self.delay().await;
        self.worker.cancel(rid);
        self.delay().await;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use sparrow_core::duration::DurationProfile;
    use sparrow_core::ids::TaskId as Tid;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NullNotifier(Arc<AtomicUsize>);

    #[async_trait]
    impl JobNotifier for NullNotifier {
        async fn notify_done(&self, _job: JobId, _task: TaskId) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn probe_round_trip_charges_two_legs_of_delay() {
        let w = Worker::new(WorkerId(0), 5, DurationProfile::default(), 1);
        let t = SimTransport::new(w, 10);
        let start = tokio::time::Instant::now();
        let q = t.probe().await;
        assert_eq!(q, QueueLen(0));
        assert_eq!(tokio::time::Instant::now() - start, Duration::from_millis(20));
    }

    #[tokio::test(start_paused = true)]
    async fn assign_runs_the_task_and_notifies() {
        let w = Worker::new(WorkerId(0), 0, DurationProfile::new(10, 10, 0.0), 1);
        let t = SimTransport::new(w, 0);
        let count = Arc::new(AtomicUsize::new(0));
        let notifier: Arc<dyn JobNotifier> = Arc::new(NullNotifier(Arc::clone(&count)));
        t.assign(JobId("S0-J0".into()), Tid::new(0), None, notifier)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(11)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
