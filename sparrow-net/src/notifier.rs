//! `NetJobNotifier`: the worker-side `JobNotifier` for the live variant.
//! Dials the scheduler's DONE port over a separate TCP connection and
//! writes one `DONE <jobid> <taskid>` line.

use crate::wire::Done;
use async_trait::async_trait;
use sparrow_core::ids::{JobId, TaskId};
use sparrow_core::transport::JobNotifier;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::warn;

/// Addressed at construction time from the `sched_ip` field carried on the
/// originating REQUEST/ASSIGN line, paired with the scheduler's DONE port.
pub struct NetJobNotifier {
    addr: String,
}

impl NetJobNotifier {
    pub fn new(sched_ip: impl Into<String>, done_port: u16) -> Self {
        Self {
            addr: format!("{}:{done_port}", sched_ip.into()),
        }
    }
}

#[async_trait]
impl JobNotifier for NetJobNotifier {
    /// Best-effort: any failure to connect or write is logged and
    /// swallowed, never surfaced to the worker's execution loop.
    async fn notify_done(&self, job: JobId, task: TaskId) {
        let line = Done { job, task }.encode();
        let result = async {
            let mut stream = TcpStream::connect(&self.addr).await?;
            stream.write_all(line.as_bytes()).await?;
            stream.write_all(b"\n").await?;
            stream.shutdown().await
        }
        .await;
        if let Err(err) = result {
            warn!(addr = %self.addr, %err, "failed to deliver DONE callback");
        }
    }
}
