//! Synthetic workload exercising every submission path

use anyhow::Context;
use naju_thr::{Scheduler, SchedulerStats};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Workload shape
#[derive(Debug, Clone, Copy)]
pub struct Workload {
    pub tasks: usize,
    pub blocking: usize,
    pub privileged_every: usize,
}

/// Outcome of one workload run
#[derive(Debug)]
pub struct Report {
    pub stats: SchedulerStats,
    pub elapsed: Duration,
    pub checksum: u64,
    pub frames: u64,
}

impl Report {
    pub fn print(&self) {
        println!("elapsed:            {:.2?}", self.elapsed);
        println!("checksum:           {:#018x}", self.checksum);
        println!("privileged frames:  {}", self.frames);
        println!("tasks executed:     {}", self.stats.tasks_executed);
        println!("tasks panicked:     {}", self.stats.tasks_panicked);
        println!("workers spawned:    {}", self.stats.workers_spawned);
        println!(
            "threads:            {} active, {} sleeping, {} waiting",
            self.stats.active_threads, self.stats.sleeping_threads, self.stats.waiting_threads
        );
    }
}

/// Run the workload from a thread outside the pool, shutting the dispatcher
/// down once it is done so the main loop returns.
pub fn spawn_driver(
    scheduler: Scheduler,
    workload: Workload,
) -> anyhow::Result<JoinHandle<anyhow::Result<Report>>> {
    thread::Builder::new()
        .name("naju-driver".to_string())
        .spawn(move || {
            let report = drive(&scheduler, workload);
            scheduler.shutdown();
            report
        })
        .context("failed to spawn driver thread")
}

fn mix(value: u64) -> u64 {
    let mut x = value.wrapping_add(0x9e37_79b9_7f4a_7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}

fn drive(scheduler: &Scheduler, workload: Workload) -> anyhow::Result<Report> {
    let start = Instant::now();
    let checksum = Arc::new(AtomicU64::new(0));
    let frames = Arc::new(AtomicU64::new(0));

    for i in 0..workload.tasks {
        let handle = scheduler.clone();
        let checksum = checksum.clone();
        let frames = frames.clone();
        let touches_resource = i % workload.privileged_every == 0;

        scheduler.submit(move || {
            checksum.fetch_add(mix(i as u64), Ordering::Relaxed);
            if touches_resource {
                handle.submit_privileged(move || {
                    frames.fetch_add(1, Ordering::Relaxed);
                });
            }
        });
    }
    scheduler.barrier().context("barrier after fire-and-forget tasks")?;
    tracing::debug!(tasks = workload.tasks, "fire-and-forget tasks drained");

    for i in 0..workload.blocking {
        let checksum = checksum.clone();
        scheduler
            .run_and_wait(move || {
                checksum.fetch_add(mix(i as u64), Ordering::Relaxed);
            })
            .context("promised task")?;

        let frames = frames.clone();
        scheduler
            .run_privileged_and_wait(move || {
                frames.fetch_add(1, Ordering::Relaxed);
            })
            .context("privileged task")?;
    }

    // Privileged work is FIFO, so this waits for everything queued before it
    scheduler
        .run_privileged_and_wait(|| {})
        .context("privileged flush")?;

    Ok(Report {
        stats: scheduler.stats(),
        elapsed: start.elapsed(),
        checksum: checksum.load(Ordering::Relaxed),
        frames: frames.load(Ordering::Relaxed),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use naju_thr::SchedulerConfig;

    #[test]
    fn test_workload_runs_every_path() {
        let scheduler = Scheduler::new(SchedulerConfig::default().thread_capacity(3)).unwrap();
        scheduler.init().unwrap();

        let workload = Workload {
            tasks: 64,
            blocking: 4,
            privileged_every: 8,
        };
        let driver = spawn_driver(scheduler.clone(), workload).unwrap();
        scheduler.run_main_loop(2).unwrap();

        let report = driver.join().unwrap().unwrap();
        assert_eq!(report.frames, 64 / 8 + 4);
        assert_eq!(
            report.checksum,
            (0..64u64)
                .chain(0..4u64)
                .map(mix)
                .fold(0u64, u64::wrapping_add)
        );
        assert_eq!(report.stats.tasks_panicked, 0);
        assert_eq!(report.stats.workers_spawned, 2);
    }
}
