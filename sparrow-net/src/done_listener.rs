//! The scheduler-side DONE callback listener: accepts a connection per
//! completion notification, reads one `DONE <jobid> <taskid>` line, and
//! forwards it to whichever `JobNotifier` actually owns the wait signal —
//! in practice a `sparrow_core::Scheduler`, since that type already
//! implements `JobNotifier` for the simulation variant and needs no change
//! here.
//!
//! Grounded in `sparrow_core::scheduler::Scheduler`'s own dispatch (a
//! `HashMap` of one-shot senders behind a mutex); this listener is simply
//! the live transport's front door onto that same map, run on a dedicated
//! task that dispatches each callback to the shared wait-signal map under
//! a mutex.

use crate::error::NetResult;
use crate::wire::Done;
use sparrow_core::transport::JobNotifier;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

pub async fn serve_done_callbacks(
    notifier: Arc<dyn JobNotifier>,
    bind_addr: SocketAddr,
) -> NetResult<()> {
    let listener = TcpListener::bind(bind_addr).await?;
    info!(%bind_addr, "DONE callback listener up");
    let mut incoming = TcpListenerStream::new(listener);

    while let Some(conn) = incoming.next().await {
        let stream = match conn {
            Ok(s) => s,
            Err(err) => {
                warn!(%err, "failed to accept DONE callback connection");
                continue;
            }
        };
        let notifier = Arc::clone(&notifier);
        tokio::spawn(async move {
            let mut reader = BufReader::new(stream);
            let mut line = String::new();
            match reader.read_line(&mut line).await {
                Ok(0) => {} // peer closed without sending anything
                Ok(_) => match Done::parse(&line) {
                    Ok(done) => notifier.notify_done(done.job, done.task).await,
                    Err(err) => {
                        // DONE for an unknown (jobid, tid), and a malformed
                        // line, are both logged and dropped rather than
                        // treated as fatal.
                        debug!(%err, "dropped malformed DONE callback");
                    }
                },
                Err(err) => warn!(%err, "failed to read DONE callback"),
            }
        });
    }
    Ok(())
}
