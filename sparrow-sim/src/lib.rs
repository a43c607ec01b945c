//! Discrete-event simulation harness for the Sparrow-style cluster
//! scheduler: an in-process `WorkerTransport` with injected virtual delay,
//! and the simulation boundary entry point that wires workers and
//! schedulers under a paused Tokio clock.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod driver;
pub mod transport;

pub use driver::{run_sim, run_sim_paused, SimConfig};
pub use transport::SimTransport;
