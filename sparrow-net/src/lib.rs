//! The live TCP socket variant of the Sparrow-style cluster scheduler:
//! newline-terminated ASCII over TCP, one request and one reply per
//! connection, plus a dedicated DONE callback listener.
//!
//! `sparrow-core`'s `Worker` and `Scheduler` state machines run here
//! unmodified — this crate only supplies the `WorkerTransport` /
//! `JobNotifier` realizations that move bytes over real sockets instead of
//! an in-process call wrapped in virtual delay (that's `sparrow-sim`).

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod config;
pub mod done_listener;
pub mod error;
pub mod notifier;
pub mod transport;
pub mod wire;
pub mod worker_server;

pub use config::NetConfig;
pub use error::{NetError, NetResult};
pub use notifier::NetJobNotifier;
pub use transport::NetWorkerTransport;
pub use wire::{Reply, Request};

/// Default port a scheduler listens on for worker `DONE` callbacks.
pub const DEFAULT_DONE_PORT: u16 = 9200;

/// Connect/read timeout for live RPCs.
pub const RPC_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(1);
