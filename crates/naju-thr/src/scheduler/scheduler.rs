//! Public scheduler handle

use crate::config::{hardware_concurrency, SchedulerConfig};
use crate::scheduler::shared::{Shared, Tier};
use crate::scheduler::state::{Caller, PrivilegedJob, State};
use crate::task::{self, Task};
use crate::thread_set::PoolKind;
use crate::worker::WorkerTable;
use crate::{ThrError, ThrResult};
use once_cell::sync::OnceCell;
use std::sync::Arc;
use std::thread;

/// Snapshot of scheduler counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SchedulerStats {
    /// Jobs waiting for the privileged thread
    pub pending_privileged: usize,

    /// Promised jobs waiting for any thread
    pub pending_important: usize,

    /// Normal jobs waiting for any thread
    pub pending_normal: usize,

    /// Tasks run to completion or panic
    pub tasks_executed: u64,

    /// Tasks that panicked
    pub tasks_panicked: u64,

    /// Pool workers spawned over the scheduler's lifetime
    pub workers_spawned: usize,

    /// Threads currently in the active set
    pub active_threads: usize,

    /// Threads currently parked idle
    pub sleeping_threads: usize,

    /// Threads currently parked at a collection point
    pub waiting_threads: usize,

    /// Whether shutdown has been requested
    pub shutting_down: bool,
}

/// Task dispatcher handle.
///
/// Cloning is cheap; all clones drive the same dispatcher. Worker threads hold
/// their own reference, so the dispatcher lives until `run_main_loop` has
/// joined them and the last handle is dropped.
#[derive(Clone)]
pub struct Scheduler {
    shared: Arc<Shared>,
}

impl Scheduler {
    /// Create a dispatcher. No thread is claimed or spawned yet.
    pub fn new(config: SchedulerConfig) -> ThrResult<Self> {
        Ok(Self {
            shared: Arc::new(Shared::new(config)?),
        })
    }

    /// Configuration the dispatcher was built with
    pub fn config(&self) -> &SchedulerConfig {
        &self.shared.config
    }

    /// Claim the calling thread as the privileged thread.
    ///
    /// Fails with `AlreadyInitialized` on a second call, from any thread.
    pub fn init(&self) -> ThrResult<()> {
        let mut guard = self.shared.lock();
        if guard.shutting_down {
            return Err(ThrError::ShutDown);
        }
        guard.claim_privileged()?;
        tracing::info!(thread = ?thread::current().id(), "claimed privileged thread");
        Ok(())
    }

    /// Check if a privileged thread has been claimed
    pub fn is_initialized(&self) -> bool {
        !self
            .shared
            .lock()
            .worker(State::privileged_id())
            .is_unclaimed()
    }

    /// Resolve the calling thread's role
    pub fn caller(&self) -> Caller {
        self.shared.lock().identify(thread::current().id())
    }

    /// Spawn `workers` pool threads and run the privileged loop on the calling
    /// thread until [`shutdown`](Self::shutdown) is requested.
    ///
    /// `workers == 0` means one less than the hardware concurrency. Claims the
    /// calling thread first if `init` was never called. All spawned workers
    /// have been joined when this returns.
    pub fn run_main_loop(&self, workers: usize) -> ThrResult<()> {
        let me = thread::current().id();
        let mut guard = self.shared.lock();

        if guard.shutting_down {
            return Err(ThrError::ShutDown);
        }
        if guard.worker(State::privileged_id()).is_unclaimed() {
            guard.claim_privileged()?;
            tracing::debug!("main loop claimed the calling thread");
        }
        if guard.identify(me) != Caller::Primary {
            return Err(ThrError::NotPrivilegedThread);
        }
        if guard.main_loop_running {
            return Err(ThrError::MainLoopActive);
        }

        let workers = match workers {
            0 => hardware_concurrency()?.saturating_sub(1),
            n => n,
        };
        let capacity = guard.pools.capacity();
        let requested = workers.saturating_add(1);
        if requested > capacity {
            return Err(ThrError::CapacityExceeded {
                requested,
                capacity,
            });
        }

        guard.main_loop_running = true;

        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            match self.shared.spawn_worker(&mut guard) {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    tracing::error!(error = %e, "failed to start worker pool");
                    let discarded = self.shared.begin_shutdown(&mut guard);
                    guard.main_loop_running = false;
                    drop(guard);
                    drop(discarded);
                    join_workers(handles);
                    self.forget_workers();
                    return Err(e);
                }
            }
        }

        tracing::info!(workers, "entering main loop");
        self.shared.privileged_loop(&mut guard);
        drop(guard);

        join_workers(handles);
        self.forget_workers();
        tracing::info!("main loop exited");
        Ok(())
    }

    fn forget_workers(&self) {
        let mut guard = self.shared.lock();
        guard.pool_threads.clear();
        guard.workers.truncate(1);
        guard.main_loop_running = false;
    }

    /// Stop the dispatcher.
    ///
    /// Parked threads are woken and exit their loops, blocked callers are
    /// released with `Abandoned`, and every queued task is dropped unexecuted.
    /// Calling it again is a no-op.
    pub fn shutdown(&self) {
        let mut guard = self.shared.lock();
        if guard.shutting_down {
            return;
        }
        let discarded = self.shared.begin_shutdown(&mut guard);
        drop(guard);

        let (privileged, important, normal) = discarded.count();
        tracing::info!(privileged, important, normal, "shutdown discarded pending work");
    }

    /// Check if shutdown has been requested
    pub fn is_shutting_down(&self) -> bool {
        self.shared.lock().shutting_down
    }

    /// Queue `f` for any thread. Never blocks.
    pub fn submit<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let task = task::boxed(f);
        let mut guard = self.shared.lock();
        if guard.shutting_down {
            drop(guard);
            tracing::warn!("task submitted after shutdown was discarded");
            return;
        }
        guard.normal.put(task);
        self.shared.wake_one(&mut guard);
    }

    /// Queue `f` for the privileged thread.
    ///
    /// On the privileged thread itself, already-queued privileged work runs
    /// first and then `f` runs before this returns.
    pub fn submit_privileged<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let task = task::boxed(f);
        let mut guard = self.shared.lock();
        if guard.shutting_down {
            drop(guard);
            tracing::warn!("privileged task submitted after shutdown was discarded");
            return;
        }

        match guard.identify(thread::current().id()) {
            Caller::Primary => {
                // Errors were already logged and counted by the runner
                let _ = self
                    .shared
                    .drain_then_run(&mut guard, Tier::Privileged, task);
            }
            _ => self.shared.enqueue_privileged(
                &mut guard,
                PrivilegedJob {
                    task,
                    completion: None,
                },
            ),
        }
    }

    /// Run `f` on the privileged thread and wait for it to finish.
    ///
    /// Fails with `NotInitialized` if no privileged thread has been claimed
    /// yet, since nothing could ever run the task.
    pub fn run_privileged_and_wait<F>(&self, f: F) -> ThrResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let task = task::boxed(f);
        let mut guard = self.shared.lock();
        if guard.shutting_down {
            return Err(ThrError::Abandoned);
        }

        let caller = guard.identify(thread::current().id());
        if caller == Caller::Primary {
            return self
                .shared
                .drain_then_run(&mut guard, Tier::Privileged, task);
        }

        if guard.worker(State::privileged_id()).is_unclaimed() {
            return Err(ThrError::NotInitialized);
        }

        tracing::trace!(caller = %caller, "waiting on privileged thread");
        let completion = Arc::new(OnceCell::new());
        self.shared.enqueue_privileged(
            &mut guard,
            PrivilegedJob {
                task,
                completion: Some(Arc::clone(&completion)),
            },
        );
        self.shared.wait_privileged(&mut guard, &completion)
    }

    /// Run `f` to completion before returning, from any thread, without
    /// deadlocking.
    ///
    /// The privileged thread and pool workers run it themselves after draining
    /// queued work of the same tier. Other threads hand it to the pool as a
    /// promise and sleep until it has run.
    pub fn run_and_wait<F>(&self, f: F) -> ThrResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let task: Task = task::boxed(f);
        let mut guard = self.shared.lock();
        if guard.shutting_down {
            return Err(ThrError::Abandoned);
        }

        match guard.identify(thread::current().id()) {
            Caller::Primary => self
                .shared
                .drain_then_run(&mut guard, Tier::Privileged, task),
            Caller::PoolWorker(_) => self
                .shared
                .drain_then_run(&mut guard, Tier::Important, task),
            Caller::External => self.shared.run_promised(&mut guard, task),
        }
    }

    /// Block until all normal work submitted so far has run.
    ///
    /// Pool members help drain the queues while they wait.
    pub fn barrier(&self) -> ThrResult<()> {
        let mut guard = self.shared.lock();
        let caller = guard.identify(thread::current().id());
        tracing::trace!(caller = %caller, "entering barrier");

        match caller {
            Caller::Primary => self
                .shared
                .collect(&mut guard, State::privileged_id(), true),
            Caller::PoolWorker(id) => self.shared.collect(&mut guard, id, false),
            Caller::External => self.shared.wait_drained(&mut guard),
        }
    }

    /// Snapshot of the dispatcher counters
    pub fn stats(&self) -> SchedulerStats {
        let guard = self.shared.lock();
        SchedulerStats {
            pending_privileged: guard.privileged.len(),
            pending_important: guard.important.len(),
            pending_normal: guard.normal.len(),
            tasks_executed: guard.tasks_executed,
            tasks_panicked: guard.tasks_panicked,
            workers_spawned: guard.workers_spawned,
            active_threads: guard.pools.get(PoolKind::Active).len(),
            sleeping_threads: guard.pools.get(PoolKind::Sleeping).len(),
            waiting_threads: guard.pools.get(PoolKind::Waiting).len(),
            shutting_down: guard.shutting_down,
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}

fn join_workers(handles: Vec<thread::JoinHandle<()>>) {
    for handle in handles {
        let name = handle.thread().name().map(str::to_owned);
        if handle.join().is_err() {
            tracing::warn!(thread = ?name, "worker thread panicked");
        }
    }
}
