//! Scheduler internals shared between the public handle and worker threads.
//!
//! Every method that takes a `&mut Held<'_>` must be called with the
//! scheduler lock held; task bodies always run with the lock released.

use crate::config::SchedulerConfig;
use crate::defaults::MIN_QUEUE_CAPACITY;
use crate::promise::Promise;
use crate::ring::RingQueue;
use crate::scheduler::state::{Placement, PrivilegedJob, State};
use crate::signal_pool::SignalPool;
use crate::task::{self, Task};
use crate::thread_set::PoolKind;
use crate::worker::{self, WorkerHandle, WorkerId, WorkerTable};
use crate::{ThrError, ThrResult};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::mem;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Proof that the scheduler lock is held
pub(crate) type Held<'a> = MutexGuard<'a, State>;

/// Queue a re-entrant caller drains before running its own task
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Tier {
    Privileged,
    Important,
}

/// Queue contents discarded by shutdown, dropped once the lock is released
pub(crate) struct Discarded {
    privileged: RingQueue<PrivilegedJob>,
    normal: RingQueue<Task>,
    important: Vec<Task>,
}

impl Discarded {
    pub fn count(&self) -> (usize, usize, usize) {
        (self.privileged.len(), self.important.len(), self.normal.len())
    }
}

pub(crate) struct Shared {
    state: Mutex<State>,

    /// Raised whenever the last active thread finds no work
    normal_drained: Condvar,

    /// Raised whenever the privileged thread finds its queue empty
    privileged_drained: Condvar,

    pub signals: SignalPool,

    pub config: SchedulerConfig,
}

impl Shared {
    pub fn new(config: SchedulerConfig) -> ThrResult<Self> {
        let capacity = config.resolved_thread_capacity()?;
        let signal_pool_size = config.resolved_signal_pool_size()?;

        Ok(Self {
            state: Mutex::new(State::new(capacity, config.queue_capacity)),
            normal_drained: Condvar::new(),
            privileged_drained: Condvar::new(),
            signals: SignalPool::new(signal_pool_size),
            config,
        })
    }

    pub fn lock(&self) -> Held<'_> {
        self.state.lock()
    }

    /// Run a task with the lock released and account for it
    fn run_unlocked(&self, guard: &mut Held<'_>, task: Task) -> ThrResult<()> {
        let outcome = MutexGuard::unlocked(guard, || task::run_guarded(task));
        guard.record(&outcome);
        outcome
    }

    /// Run one privileged job. Only the privileged thread may call this.
    ///
    /// Finding the queue empty raises the privileged-drained signal.
    pub fn run_privileged_one(&self, guard: &mut Held<'_>) -> bool {
        let Ok(job) = guard.privileged.get() else {
            self.privileged_drained.notify_all();
            return false;
        };
        let outcome = self.run_unlocked(guard, job.task);
        if let Some(completion) = job.completion {
            let _ = completion.set(outcome);
        }
        true
    }

    /// Run one promised job
    pub fn run_important_one(&self, guard: &mut Held<'_>) -> bool {
        let Ok(promise) = guard.important.get() else {
            return false;
        };
        promise.run(guard);
        if let Some(outcome) = promise.outcome() {
            guard.record(outcome);
        }
        true
    }

    /// Run one normal job
    pub fn run_normal_one(&self, guard: &mut Held<'_>) -> bool {
        let Ok(task) = guard.normal.get() else {
            return false;
        };
        let _ = self.run_unlocked(guard, task);
        true
    }

    /// Empty a tier's queue, then run `task` directly.
    ///
    /// Keeps a re-entrant caller from queueing work behind itself.
    pub fn drain_then_run(&self, guard: &mut Held<'_>, tier: Tier, task: Task) -> ThrResult<()> {
        match tier {
            Tier::Privileged => while self.run_privileged_one(guard) {},
            Tier::Important => while self.run_important_one(guard) {},
        }
        self.run_unlocked(guard, task)
    }

    /// Wake one parked worker, preferring those at a collection point.
    ///
    /// A thread waiting at a collection point is more eager: it can take the
    /// new work and still evaluate the collection condition afterwards.
    pub fn wake_one(&self, guard: &mut Held<'_>) {
        if let Some(id) = guard.pools.get(PoolKind::Waiting).last() {
            guard.relocate(id, PoolKind::Active, Placement::Last);
            guard.worker_mut(id).notify_with(true);
            tracing::debug!(worker = %id, "woke waiting worker");
            return;
        }

        if let Some(id) = guard.pools.get(PoolKind::Sleeping).last() {
            guard.relocate(id, PoolKind::Active, Placement::Last);
            guard.worker_mut(id).notify();
            tracing::debug!(worker = %id, "woke sleeping worker");
        }
    }

    /// Wake the privileged thread if it is parked
    pub fn wake_privileged(&self, guard: &mut Held<'_>) {
        let id = State::privileged_id();
        if guard.worker(id).is_sleeping() {
            guard.relocate(id, PoolKind::Active, Placement::Last);
            guard.worker_mut(id).notify_with(true);
        }
    }

    /// Release everyone at a collection point if the caller is the only
    /// active thread. The caller must have found the queues empty and must be
    /// in the active set.
    pub fn wake_drained(&self, guard: &mut Held<'_>) -> bool {
        if guard.pools.get(PoolKind::Active).len() != 1 {
            return false;
        }
        guard.release_all(PoolKind::Waiting);
        guard.drained_epoch += 1;
        self.normal_drained.notify_all();
        true
    }

    /// Service queues until the collection point is reached.
    ///
    /// Used by the privileged thread (which also services privileged work)
    /// and pool workers.
    pub fn collect(&self, guard: &mut Held<'_>, id: WorkerId, privileged: bool) -> ThrResult<()> {
        loop {
            if guard.shutting_down {
                return Err(ThrError::Abandoned);
            }
            if privileged && self.run_privileged_one(guard) {
                continue;
            }
            if self.run_important_one(guard) {
                continue;
            }
            if self.run_normal_one(guard) {
                continue;
            }
            if self.wake_drained(guard) {
                return Ok(());
            }

            let placement = if privileged {
                Placement::First
            } else {
                Placement::Last
            };
            guard.relocate(id, PoolKind::Waiting, placement);
            tracing::debug!(worker = %id, "parked at collection point");
            if !worker::wait_at_barrier(guard, id) {
                return if guard.shutting_down {
                    Err(ThrError::Abandoned)
                } else {
                    Ok(())
                };
            }
        }
    }

    /// Block a thread outside the pool until the normal queue drains
    pub fn wait_drained(&self, guard: &mut Held<'_>) -> ThrResult<()> {
        if guard.shutting_down {
            return Err(ThrError::Abandoned);
        }
        if guard.normal.is_empty() && guard.pools.get(PoolKind::Active).is_empty() {
            return Ok(());
        }

        let epoch = guard.drained_epoch;
        while guard.drained_epoch == epoch {
            self.normal_drained.wait(guard);
        }

        if guard.shutting_down {
            Err(ThrError::Abandoned)
        } else {
            Ok(())
        }
    }

    /// Queue a privileged job and wake the privileged thread
    pub fn enqueue_privileged(&self, guard: &mut Held<'_>, job: PrivilegedJob) {
        guard.privileged.put(job);
        self.wake_privileged(guard);
    }

    /// Block until a queued privileged job has run
    pub fn wait_privileged(
        &self,
        guard: &mut Held<'_>,
        completion: &once_cell::sync::OnceCell<ThrResult<()>>,
    ) -> ThrResult<()> {
        loop {
            if let Some(outcome) = completion.get() {
                return outcome.clone();
            }
            if guard.shutting_down {
                return Err(ThrError::Abandoned);
            }
            self.privileged_drained.wait(guard);
        }
    }

    /// Queue a promise and wait for a worker to fulfill it
    pub fn run_promised(&self, guard: &mut Held<'_>, task: Task) -> ThrResult<()> {
        let signal = self.signals.acquire();
        let promise = Arc::new(Promise::new(task, signal.share()));
        guard.important.put(Arc::clone(&promise));
        self.wake_one(guard);
        promise.wait(guard)
    }

    /// Mark shutdown, wake everyone and empty the queues.
    ///
    /// Queued promises are fulfilled as abandoned so their waiters return.
    pub fn begin_shutdown(&self, guard: &mut Held<'_>) -> Discarded {
        guard.shutting_down = true;

        guard.release_all(PoolKind::Waiting);
        guard.release_all(PoolKind::Sleeping);

        guard.drained_epoch += 1;
        self.normal_drained.notify_all();
        self.privileged_drained.notify_all();

        let queue_capacity = self.config.queue_capacity.max(MIN_QUEUE_CAPACITY);
        let mut important = Vec::new();
        while let Ok(promise) = guard.important.get() {
            important.extend(promise.abandon());
        }

        Discarded {
            privileged: mem::replace(
                &mut guard.privileged,
                RingQueue::with_capacity(queue_capacity),
            ),
            normal: mem::replace(&mut guard.normal, RingQueue::with_capacity(queue_capacity)),
            important,
        }
    }

    /// Spawn a pool worker and register it in the active set
    pub fn spawn_worker(self: &Arc<Self>, guard: &mut Held<'_>) -> ThrResult<JoinHandle<()>> {
        let id = WorkerId::new(guard.workers.len());

        let mut builder =
            thread::Builder::new().name(format!("{}-{}", self.config.thread_name_prefix, id));
        if let Some(size) = self.config.stack_size {
            builder = builder.stack_size(size);
        }

        let shared = Arc::clone(self);
        let handle = builder
            .spawn(move || shared.worker_loop(id))
            .map_err(|e| ThrError::Spawn(e.to_string()))?;

        // The new thread blocks on the lock until it is registered here
        let thread = handle.thread().id();
        guard.workers.push(WorkerHandle::for_thread(id, thread));
        guard.pool_threads.insert(thread, id);
        guard.relocate(id, PoolKind::Active, Placement::Last);
        guard.workers_spawned += 1;

        tracing::debug!(worker = %id, "spawned worker thread");
        Ok(handle)
    }

    /// Pool worker main loop: important work, then normal work, then sleep
    fn worker_loop(&self, id: WorkerId) {
        let mut guard = self.lock();

        while !guard.shutting_down {
            if self.run_important_one(&mut guard) {
                continue;
            }
            if self.run_normal_one(&mut guard) {
                continue;
            }

            self.wake_drained(&mut guard);
            guard.relocate(id, PoolKind::Sleeping, Placement::Last);
            worker::suspend(&mut guard, id);
        }

        guard.detach(id);
        tracing::debug!(worker = %id, "worker thread exiting");
    }

    /// Privileged thread main loop. Returns once shutdown is requested.
    pub fn privileged_loop(&self, guard: &mut Held<'_>) {
        let id = State::privileged_id();

        while !guard.shutting_down {
            if self.run_privileged_one(guard) {
                continue;
            }
            if self.run_important_one(guard) {
                continue;
            }
            if self.run_normal_one(guard) {
                continue;
            }

            // Nothing to do, perform potential wakeup for collection point
            self.wake_drained(guard);
            guard.relocate(id, PoolKind::Sleeping, Placement::First);
            worker::suspend(guard, id);
        }
    }
}
