//! The worker-side TCP listener: accepts one connection per RPC, reads one
//! line, dispatches into a same-process `sparrow_core::Worker`, writes one
//! reply line, and closes.
//!
//! One worker instance per process, one `sparrow_core::Worker` behind its
//! own mutex: the global mutable module-scope state the original live
//! worker kept is replaced here with a single struct instance and its own
//! lock.

use crate::error::NetResult;
use crate::notifier::NetJobNotifier;
use crate::wire::{Reply, Request};
use crate::DEFAULT_DONE_PORT;
use sparrow_core::worker::Worker;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_stream::wrappers::TcpListenerStream;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

/// Binds `bind_addr` and runs the accept loop, forever. A thin convenience
/// over [`serve_worker`] for callers (the CLI) that don't need the bound
/// address back before the loop starts.
pub async fn bind_and_serve_worker(worker: Arc<Worker>, bind_addr: SocketAddr) -> NetResult<()> {
    let listener = TcpListener::bind(bind_addr).await?;
    serve_worker(worker, listener).await
}

/// Runs the accept loop for one worker over an already-bound listener,
/// forever (or until the listener is dropped). Each accepted connection is
/// handled on its own Tokio task, so RPCs from distinct schedulers never
/// block on one another.
pub async fn serve_worker(worker: Arc<Worker>, listener: TcpListener) -> NetResult<()> {
    info!(addr = ?listener.local_addr(), worker = %worker.id, "worker listening");
    let mut incoming = TcpListenerStream::new(listener);

    while let Some(conn) = incoming.next().await {
        let stream = match conn {
            Ok(s) => s,
            Err(err) => {
                warn!(%err, "failed to accept worker connection");
                continue;
            }
        };
        let worker = Arc::clone(&worker);
        tokio::spawn(async move {
            if let Err(err) = handle_connection(worker, stream).await {
                debug!(%err, "worker connection ended with an error");
            }
        });
    }
    Ok(())
}

async fn handle_connection(worker: Arc<Worker>, mut stream: TcpStream) -> NetResult<()> {
    let (read_half, mut write_half) = stream.split();
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();
    let n = reader.read_line(&mut line).await?;
    if n == 0 {
        return Ok(()); // peer closed without sending a request
    }

    let request = Request::parse(&line)?;
    let reply = dispatch(&worker, request);

    write_half.write_all(reply.encode().as_bytes()).await?;
    write_half.write_all(b"\n").await?;
    write_half.flush().await?;
    Ok(())
}

fn dispatch(worker: &Arc<Worker>, request: Request) -> Reply {
    match request {
        Request::Probe => Reply::Queue(worker.probe()),
        Request::Request {
            job,
            task,
            dur_ms,
            sched_ip,
        } => {
            let notifier = Arc::new(NetJobNotifier::new(sched_ip, DEFAULT_DONE_PORT));
            let rid = worker.request(job, task, Some(dur_ms), notifier);
            Reply::Rid(rid)
        }
        Request::Assign {
            job,
            task,
            dur_ms,
            sched_ip,
        } => {
            let notifier = Arc::new(NetJobNotifier::new(sched_ip, DEFAULT_DONE_PORT));
            worker.assign(job, task, Some(dur_ms), notifier);
            Reply::Started
        }
        Request::AssignRid { rid } => {
            if worker.assign_rid(rid) {
                Reply::Started
            } else {
                Reply::Err
            }
        }
        Request::Cancel { rid } => {
            worker.cancel(rid);
            Reply::Cancelled
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use sparrow_core::duration::DurationProfile;
    use sparrow_core::ids::WorkerId;

    #[tokio::test]
    async fn probe_round_trips_over_a_real_socket() {
        let worker = Worker::new(WorkerId(0), 0, DurationProfile::default(), 1);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            handle_connection(worker, stream).await.unwrap();
        });

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"PROBE\n").await.unwrap();
        let mut reader = BufReader::new(client);
        let mut reply = String::new();
        reader.read_line(&mut reply).await.unwrap();
        assert_eq!(reply.trim(), "Q 0");
    }

    #[tokio::test]
    async fn assign_rid_on_unknown_rid_replies_err_over_a_real_socket() {
        let worker = Worker::new(WorkerId(1), 0, DurationProfile::default(), 1);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            handle_connection(worker, stream).await.unwrap();
        });

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"ASSIGN_RID deadbeef\n").await.unwrap();
        let mut reader = BufReader::new(client);
        let mut reply = String::new();
        reader.read_line(&mut reply).await.unwrap();
        assert_eq!(reply.trim(), "ERR");
    }
}
