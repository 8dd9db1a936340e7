//! naju-thr command-line driver
//!
//! Boots a dispatcher on the main thread, pushes a synthetic workload through
//! every submission path from a driver thread, then prints the dispatcher's
//! statistics.

mod workload;

use anyhow::Context;
use clap::{Parser, Subcommand};
use naju_thr::{hardware_concurrency, Scheduler, SchedulerConfig, ThrError};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "naju-thr")]
#[command(about = "Task dispatcher driver", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a synthetic workload and report statistics
    Run {
        /// Pool workers to spawn (0 = hardware concurrency - 1)
        #[arg(short, long, env = "NAJU_THR_WORKERS", default_value_t = 0)]
        workers: usize,
        /// Fire-and-forget tasks to submit
        #[arg(short, long, default_value_t = 10_000)]
        tasks: usize,
        /// Blocking calls to make from the driver thread
        #[arg(short, long, default_value_t = 100)]
        blocking: usize,
        /// Every n-th task also touches the privileged resource
        #[arg(long, default_value_t = 16)]
        privileged_every: usize,
        /// Print statistics as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show detected hardware and default configuration
    Info,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            workers,
            tasks,
            blocking,
            privileged_every,
            json,
        } => {
            let workload = workload::Workload {
                tasks,
                blocking,
                privileged_every: privileged_every.max(1),
            };
            let report = run(workers, workload)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report.stats)?);
            } else {
                report.print();
            }
        }

        Commands::Info => {
            let cpus = hardware_concurrency()?;
            let config = SchedulerConfig::default();
            println!("hardware concurrency: {}", cpus);
            println!("default workers:      {}", cpus.saturating_sub(1));
            println!("queue capacity:       {}", config.queue_capacity);
            println!("thread name prefix:   {}", config.thread_name_prefix);
        }
    }

    Ok(())
}

fn run(workers: usize, workload: workload::Workload) -> anyhow::Result<workload::Report> {
    let workers = match workers {
        0 => hardware_concurrency()?.saturating_sub(1).max(1),
        n => n,
    };
    let capacity = workers.checked_add(1).ok_or(ThrError::CapacityExceeded {
        requested: usize::MAX,
        capacity: workers,
    })?;
    let config = SchedulerConfig::default().thread_capacity(capacity);
    let scheduler = Scheduler::new(config)?;
    scheduler.init()?;

    let driver = workload::spawn_driver(scheduler.clone(), workload)?;
    if let Err(e) = scheduler.run_main_loop(workers) {
        // Release the driver before reporting
        scheduler.shutdown();
        let _ = driver.join();
        return Err(e).context("main loop failed");
    }

    driver
        .join()
        .map_err(|_| anyhow::anyhow!("driver thread panicked"))?
}
