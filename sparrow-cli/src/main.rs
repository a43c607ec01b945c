//! Command-line entry point for the Sparrow-style cluster scheduler.
//!
//! `sim` runs the discrete-event harness to completion and prints its
//! aggregate metrics; `worker` and `live-run` drive the real TCP variant,
//! binding a worker listener or dialing a fixed fleet of worker addresses
//! from a single live scheduler. Argument parsing follows
//! `knhk-workflow-engine/src/bin/knhk-workflow.rs`'s `#[derive(Parser)]` /
//! `Subcommand` shape.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

use clap::{Parser, Subcommand, ValueEnum};
use sparrow_core::duration::DurationProfile;
use sparrow_core::ids::{SchedulerId, WorkerId};
use sparrow_core::sampler::JobSizeSpec;
use sparrow_core::scheduler::{Mode as CoreMode, Scheduler};
use sparrow_core::transport::{JobNotifier, WorkerTransport};
use sparrow_core::worker::Worker;
use sparrow_net::done_listener::serve_done_callbacks;
use sparrow_net::transport::NetWorkerTransport;
use sparrow_net::worker_server::bind_and_serve_worker;
use sparrow_sim::driver::SimConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "sparrow")]
#[command(about = "Sparrow-style decentralized cluster task scheduler")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PlacementMode {
    Batch,
    Late,
    Latepro,
}

impl From<PlacementMode> for CoreMode {
    fn from(mode: PlacementMode) -> Self {
        match mode {
            PlacementMode::Batch => CoreMode::Batch,
            PlacementMode::Late => CoreMode::Late,
            PlacementMode::Latepro => CoreMode::LatePro,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum JobsizeKind {
    Fixed,
    Uniform,
    Powerlaw,
    Mixed,
}

#[derive(clap::Args, Debug, Clone)]
struct JobsizeArgs {
    /// tasks-per-job distribution
    #[arg(long, value_enum, default_value = "mixed")]
    jobsize: JobsizeKind,
    /// upper bound used by `mixed` and as the default `powerlaw` ceiling
    #[arg(long, default_value_t = 200)]
    jobsize_max: u32,
    /// `fixed`'s constant size
    #[arg(long, default_value_t = 3)]
    jobsize_fixed: u32,
    /// `uniform`'s lower bound
    #[arg(long, default_value_t = 1)]
    jobsize_lo: u32,
    /// `uniform`'s upper bound
    #[arg(long, default_value_t = 8)]
    jobsize_hi: u32,
}

impl JobsizeArgs {
    fn build(&self) -> JobSizeSpec {
        match self.jobsize {
            JobsizeKind::Fixed => JobSizeSpec::Fixed(self.jobsize_fixed),
            JobsizeKind::Uniform => JobSizeSpec::Uniform {
                lo: self.jobsize_lo,
                hi: self.jobsize_hi,
            },
            JobsizeKind::Powerlaw => JobSizeSpec::Powerlaw {
                choices: vec![1, 2, 3, 4, 8, 16, 32, 64, 128],
                weights: None,
            },
            JobsizeKind::Mixed => JobSizeSpec::Mixed {
                max: self.jobsize_max,
            },
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the discrete-event simulation harness to completion and print
    /// its aggregate metrics.
    Sim {
        #[arg(long, default_value_t = 10)]
        workers: u32,
        #[arg(long, default_value_t = 3)]
        schedulers: u32,
        #[arg(long, default_value_t = 200)]
        jobs: u32,
        #[arg(long, default_value_t = 2)]
        probe: u32,
        #[arg(long, default_value_t = 1)]
        ndelay: u64,
        #[arg(long, value_enum, default_value = "batch")]
        mode: PlacementMode,
        #[command(flatten)]
        jobsize: JobsizeArgs,
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },

    /// Start a live worker: bind a TCP listener and serve PROBE / REQUEST /
    /// ASSIGN / ASSIGN_RID / CANCEL forever.
    Worker {
        #[arg(long, default_value = "0.0.0.0:7000")]
        listen_addr: SocketAddr,
        #[arg(long, default_value_t = 0)]
        wid: u32,
        #[arg(long, default_value_t = 1)]
        ndelay: u64,
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },

    /// Drive one live scheduler over real TCP connections against a fixed
    /// set of worker addresses, then print its summary block.
    LiveRun {
        /// Comma-separated `host:port` list of already-running workers.
        #[arg(long, value_delimiter = ',')]
        worker_addrs: Vec<SocketAddr>,
        /// This scheduler's own IP, advertised to workers for DONE
        /// callbacks.
        #[arg(long, default_value = "127.0.0.1")]
        own_ip: String,
        #[arg(long, default_value_t = sparrow_net::DEFAULT_DONE_PORT)]
        done_port: u16,
        #[arg(long, default_value_t = 3)]
        jobs: u32,
        #[arg(long, default_value_t = 2)]
        probe: u32,
        #[arg(long, value_enum, default_value = "batch")]
        mode: PlacementMode,
        #[command(flatten)]
        jobsize: JobsizeArgs,
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Sim {
            workers,
            schedulers,
            jobs,
            probe,
            ndelay,
            mode,
            jobsize,
            seed,
        } => run_sim_command(workers, schedulers, jobs, probe, ndelay, mode, jobsize, seed).await,
        Commands::Worker {
            listen_addr,
            wid,
            ndelay,
            seed,
        } => run_worker_command(listen_addr, wid, ndelay, seed).await,
        Commands::LiveRun {
            worker_addrs,
            own_ip,
            done_port,
            jobs,
            probe,
            mode,
            jobsize,
            seed,
        } => {
            run_live_command(
                worker_addrs,
                own_ip,
                done_port,
                jobs,
                probe,
                mode,
                jobsize,
                seed,
            )
            .await
        }
    }
}

async fn run_sim_command(
    workers: u32,
    schedulers: u32,
    jobs: u32,
    probe: u32,
    ndelay: u64,
    mode: PlacementMode,
    jobsize: JobsizeArgs,
    seed: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let cfg = SimConfig {
        num_workers: workers,
        num_schedulers: schedulers,
        jobs_per_scheduler: jobs,
        probe_ratio: probe,
        network_delay_ms: ndelay,
        mode: mode.into(),
        jobsize: jobsize.build(),
        seed,
        duration_profile: DurationProfile::default(),
    };

    info!(?cfg.num_workers, ?cfg.num_schedulers, ?cfg.jobs_per_scheduler, "starting simulation run");

    // Build the paused runtime by hand here (rather than `run_sim_paused`)
    // since we're already inside a `#[tokio::main]` multi-threaded runtime
    // and need a nested current-thread one with its own virtual clock.
    let metrics = tokio::task::spawn_blocking(move || sparrow_sim::run_sim_paused(cfg)).await??;

    println!("\n=== RESULTS ===");
    println!("Avg completion: {:.2} ms", metrics.avg_completion_ms);
    println!("Avg RPC/job:    {:.2}", metrics.avg_rpc_per_job);
    println!("Task wait (avg): {:.2} ms", metrics.task_wait_avg_ms);
    println!("Task resp (avg): {:.2} ms", metrics.task_response_avg_ms);
    println!("Task service (avg): {:.2} ms", metrics.task_service_avg_ms);
    println!(
        "Worker util: {:.2}%  imbalance: {:.2}",
        metrics.worker_util_pct, metrics.imbalance
    );
    for s in &metrics.per_scheduler {
        println!(
            "  [{}] completed={} avg={:.2}ms p95={:.2}ms p99={:.2}ms rpc/job={:.2}",
            s.name, s.completed_jobs, s.completion_avg_ms, s.p95_ms, s.p99_ms, s.rpc_per_job
        );
    }
    Ok(())
}

async fn run_worker_command(
    listen_addr: SocketAddr,
    wid: u32,
    ndelay: u64,
    seed: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let worker = Worker::new(WorkerId(wid), ndelay, DurationProfile::default(), seed);
    info!(%listen_addr, wid, "starting live worker");
    bind_and_serve_worker(worker, listen_addr).await?;
    Ok(())
}

async fn run_live_command(
    worker_addrs: Vec<SocketAddr>,
    own_ip: String,
    done_port: u16,
    jobs: u32,
    probe: u32,
    mode: PlacementMode,
    jobsize: JobsizeArgs,
    seed: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let sampler = jobsize.build().build()?;
    let transports: Vec<Arc<dyn WorkerTransport>> = worker_addrs
        .iter()
        .enumerate()
        .map(|(i, addr)| {
            NetWorkerTransport::new(
                WorkerId(i as u32),
                addr.to_string(),
                own_ip.clone(),
                DurationProfile::default(),
                seed.wrapping_add(i as u64),
            ) as Arc<dyn WorkerTransport>
        })
        .collect();

    let scheduler = Scheduler::new(
        SchedulerId::new("S0"),
        transports,
        mode.into(),
        probe,
        jobs,
        sampler,
        seed,
    );

    let done_addr: SocketAddr = format!("{own_ip}:{done_port}").parse()?;
    let done_notifier = Arc::clone(&scheduler) as Arc<dyn JobNotifier>;
    tokio::spawn(async move {
        if let Err(err) = serve_done_callbacks(done_notifier, done_addr).await {
            tracing::error!(%err, "DONE callback listener exited");
        }
    });

    info!(%done_addr, workers = worker_addrs.len(), "driving live scheduler");
    let metrics = scheduler.run().await;
    println!(
        "[{}] completed={} avg={:.2}ms p95={:.2}ms p99={:.2}ms rpc/job={:.2}",
        metrics.name,
        metrics.completed_jobs,
        metrics.completion_avg_ms,
        metrics.p95_ms,
        metrics.p99_ms,
        metrics.rpc_per_job
    );
    Ok(())
}
