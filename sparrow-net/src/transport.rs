//! `NetWorkerTransport`: the scheduler-side `WorkerTransport` for the live
//! variant. Opens one TCP connection per RPC, writes one request line,
//! reads one reply line, and closes — one request, one reply, per
//! connection — under a 1s connect/read budget.
//!
//! Completion notification does not flow through the `notifier` argument
//! here the way it does in `sparrow-sim`: the remote worker dials the
//! scheduler's DONE port directly once a task finishes (`NetJobNotifier`),
//! entirely out of band from this call. `notifier` is accepted to satisfy
//! `WorkerTransport` and is otherwise unused by this implementation — the
//! scheduler's own `done_listener` is what actually fires the wait signal.

use crate::error::NetError;
use crate::wire::{Reply, Request};
use crate::RPC_TIMEOUT;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;
use sparrow_core::duration::DurationProfile;
use sparrow_core::ids::{JobId, ReservationId, TaskId, WorkerId};
use sparrow_core::transport::{JobNotifier, QueueLen, TransportError, TransportResult, WorkerTransport};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

pub struct NetWorkerTransport {
    worker_id: WorkerId,
    worker_addr: String,
    /// This scheduler's own address, sent as `sched_ip` on REQUEST/ASSIGN
    /// so the remote worker knows where to dial its DONE callback.
    sched_ip: String,
    duration_profile: DurationProfile,
    rng: Mutex<StdRng>,
}

impl NetWorkerTransport {
    pub fn new(
        worker_id: WorkerId,
        worker_addr: impl Into<String>,
        sched_ip: impl Into<String>,
        duration_profile: DurationProfile,
        seed: u64,
    ) -> Arc<Self> {
        Arc::new(Self {
            worker_id,
            worker_addr: worker_addr.into(),
            sched_ip: sched_ip.into(),
            duration_profile,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        })
    }

    fn sample_dur(&self) -> u64 {
        let mut rng = self
            .rng
            .lock()
            .unwrap_or_else(|_| sparrow_core::error::fatal("transport rng mutex poisoned"));
        self.duration_profile.sample(&mut *rng)
    }

    /// One request line, one reply line, under the shared 1s RPC budget.
    async fn roundtrip(&self, line: &str) -> Result<String, NetError> {
        timeout(RPC_TIMEOUT, self.roundtrip_inner(line))
            .await
            .map_err(|_| NetError::Timeout)?
    }

    async fn roundtrip_inner(&self, line: &str) -> Result<String, NetError> {
        let mut stream = TcpStream::connect(&self.worker_addr)
            .await
            .map_err(|e| NetError::Connect(e.to_string()))?;
        stream.write_all(line.as_bytes()).await?;
        stream.write_all(b"\n").await?;
        stream.flush().await?;

        let mut reader = BufReader::new(&mut stream);
        let mut reply = String::new();
        reader.read_line(&mut reply).await?;
        Ok(reply)
    }
}

#[async_trait]
impl WorkerTransport for NetWorkerTransport {
    fn worker_id(&self) -> WorkerId {
        self.worker_id
    }

    async fn probe(&self) -> QueueLen {
        match self.roundtrip(&Request::Probe.encode()).await {
            Ok(reply) => Reply::parse_queue_len(&reply)
                .map(QueueLen)
                .unwrap_or(QueueLen::UNKNOWN),
            Err(_) => QueueLen::UNKNOWN,
        }
    }

    async fn request(
        &self,
        job: JobId,
        task: TaskId,
        dur_override: Option<u64>,
        _notifier: Arc<dyn JobNotifier>,
    ) -> TransportResult<ReservationId> {
        let dur_ms = dur_override.unwrap_or_else(|| self.sample_dur());
        let line = Request::Request {
            job,
            task,
            dur_ms,
            sched_ip: self.sched_ip.clone(),
        }
        .encode();
        let reply = self.roundtrip(&line).await?;
        Reply::parse_rid(&reply).map_err(TransportError::from)
    }

    async fn assign(
        &self,
        job: JobId,
        task: TaskId,
        dur_override: Option<u64>,
        _notifier: Arc<dyn JobNotifier>,
    ) -> TransportResult<()> {
        let dur_ms = dur_override.unwrap_or_else(|| self.sample_dur());
        let line = Request::Assign {
            job,
            task,
            dur_ms,
            sched_ip: self.sched_ip.clone(),
        }
        .encode();
        let reply = self.roundtrip(&line).await?;
        match reply.trim() {
            "STARTED" => Ok(()),
            other => Err(TransportError::Failed(format!("unexpected ASSIGN reply: {other:?}"))),
        }
    }

    async fn assign_rid(&self, rid: ReservationId) -> TransportResult<bool> {
        let line = Request::AssignRid { rid }.encode();
        let reply = self.roundtrip(&line).await?;
        Reply::parse_started_or_err(&reply).map_err(TransportError::from)
    }

    async fn cancel(&self, rid: ReservationId) -> TransportResult<()> {
        let line = Request::Cancel { rid }.encode();
        let reply = self.roundtrip(&line).await?;
        Reply::parse_cancelled(&reply).map_err(TransportError::from)
    }
}
