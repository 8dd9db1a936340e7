//! Lock-protected dispatcher state

use crate::defaults::{MIN_QUEUE_CAPACITY, PRIVILEGED_WORKER};
use crate::promise::Promise;
use crate::ring::RingQueue;
use crate::task::Task;
use crate::thread_set::{PoolKind, ThreadSet};
use crate::worker::{WorkerHandle, WorkerId, WorkerTable};
use crate::{ThrError, ThrResult};
use once_cell::sync::OnceCell;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;
use std::thread::ThreadId;

/// Who is calling into the scheduler, resolved once per entry point
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Caller {
    /// The privileged thread claimed at init
    Primary,
    /// A spawned pool worker
    PoolWorker(WorkerId),
    /// Any other thread
    External,
}

impl fmt::Display for Caller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Caller::Primary => write!(f, "privileged thread"),
            Caller::PoolWorker(id) => write!(f, "worker thread {}", id),
            Caller::External => write!(f, "thread"),
        }
    }
}

/// Where to insert a handle in its new set
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Placement {
    First,
    Last,
}

/// Completion slot for a privileged job someone is blocked on
pub(crate) type Completion = Arc<OnceCell<ThrResult<()>>>;

/// Entry in the privileged queue
pub(crate) struct PrivilegedJob {
    pub task: Task,
    pub completion: Option<Completion>,
}

/// The three worker pools
pub(crate) struct Pools {
    sets: [ThreadSet; 3],
}

impl Pools {
    fn new(capacity: usize) -> Self {
        Self {
            sets: [
                ThreadSet::new(PoolKind::Active, capacity),
                ThreadSet::new(PoolKind::Sleeping, capacity),
                ThreadSet::new(PoolKind::Waiting, capacity),
            ],
        }
    }

    fn index(kind: PoolKind) -> usize {
        match kind {
            PoolKind::Active => 0,
            PoolKind::Sleeping => 1,
            PoolKind::Waiting => 2,
        }
    }

    pub fn get(&self, kind: PoolKind) -> &ThreadSet {
        &self.sets[Self::index(kind)]
    }

    pub fn get_mut(&mut self, kind: PoolKind) -> &mut ThreadSet {
        &mut self.sets[Self::index(kind)]
    }

    /// Borrow two distinct sets at once
    pub fn pair_mut(&mut self, a: PoolKind, b: PoolKind) -> (&mut ThreadSet, &mut ThreadSet) {
        let (a, b) = (Self::index(a), Self::index(b));
        assert_ne!(a, b, "cannot borrow the same thread set twice");
        if a < b {
            let (lo, hi) = self.sets.split_at_mut(b);
            (&mut lo[a], &mut hi[0])
        } else {
            let (lo, hi) = self.sets.split_at_mut(a);
            (&mut hi[0], &mut lo[b])
        }
    }

    pub fn capacity(&self) -> usize {
        self.sets[0].capacity()
    }
}

/// Everything guarded by the scheduler lock
pub(crate) struct State {
    /// All handles; index 0 is the privileged thread
    pub workers: Vec<WorkerHandle>,

    /// Native identity of every spawned pool worker
    pub pool_threads: FxHashMap<ThreadId, WorkerId>,

    /// Active, sleeping and barrier-waiting sets
    pub pools: Pools,

    /// Jobs only the privileged thread may run
    pub privileged: RingQueue<PrivilegedJob>,

    /// Promised jobs from threads outside the pool
    pub important: RingQueue<Arc<Promise>>,

    /// Jobs anyone may run
    pub normal: RingQueue<Task>,

    /// Set once by shutdown
    pub shutting_down: bool,

    /// True while the privileged thread is inside the main loop
    pub main_loop_running: bool,

    /// Bumped whenever the normal queue is observed drained
    pub drained_epoch: u64,

    pub tasks_executed: u64,
    pub tasks_panicked: u64,
    pub workers_spawned: usize,
}

impl State {
    pub fn new(thread_capacity: usize, queue_capacity: usize) -> Self {
        let queue_capacity = queue_capacity.max(MIN_QUEUE_CAPACITY);
        Self {
            workers: vec![WorkerHandle::new(Self::privileged_id())],
            pool_threads: FxHashMap::default(),
            pools: Pools::new(thread_capacity),
            privileged: RingQueue::with_capacity(queue_capacity),
            important: RingQueue::with_capacity(queue_capacity),
            normal: RingQueue::with_capacity(queue_capacity),
            shutting_down: false,
            main_loop_running: false,
            drained_epoch: 0,
            tasks_executed: 0,
            tasks_panicked: 0,
            workers_spawned: 0,
        }
    }

    pub fn privileged_id() -> WorkerId {
        WorkerId::new(PRIVILEGED_WORKER)
    }

    pub fn identify(&self, thread: ThreadId) -> Caller {
        if self.workers[PRIVILEGED_WORKER].thread() == Some(thread) {
            return Caller::Primary;
        }
        match self.pool_threads.get(&thread) {
            Some(&id) => Caller::PoolWorker(id),
            None => Caller::External,
        }
    }

    /// Take a handle out of its current set, if any
    pub fn detach(&mut self, id: WorkerId) {
        if let Some(membership) = self.workers.worker(id).membership() {
            self.pools
                .get_mut(membership.pool)
                .remove(&mut self.workers, id);
        }
    }

    /// Move a handle into `to`, leaving whatever set it was in
    pub fn relocate(&mut self, id: WorkerId, to: PoolKind, placement: Placement) {
        self.detach(id);
        let set = self.pools.get_mut(to);
        match placement {
            Placement::First => set.add_first(&mut self.workers, id),
            Placement::Last => set.add_last(&mut self.workers, id),
        }
    }

    /// Wake every member of `from`, moving them to the active set
    pub fn release_all(&mut self, from: PoolKind) {
        let (from, active) = self.pools.pair_mut(from, PoolKind::Active);
        from.notify_all(active, &mut self.workers);
    }

    pub fn claim_privileged(&mut self) -> ThrResult<()> {
        let id = Self::privileged_id();
        if !self.workers.worker(id).is_unclaimed() {
            return Err(ThrError::AlreadyInitialized);
        }
        self.workers.worker_mut(id).claim();
        self.relocate(id, PoolKind::Active, Placement::Last);
        Ok(())
    }

    pub fn record(&mut self, outcome: &ThrResult<()>) {
        self.tasks_executed += 1;
        if let Err(ThrError::TaskPanicked(_)) = outcome {
            self.tasks_panicked += 1;
        }
    }
}

impl WorkerTable for State {
    fn worker(&self, id: WorkerId) -> &WorkerHandle {
        self.workers.worker(id)
    }

    fn worker_mut(&mut self, id: WorkerId) -> &mut WorkerHandle {
        self.workers.worker_mut(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_identify() {
        let mut state = State::new(4, 2);
        let me = thread::current().id();
        assert_eq!(state.identify(me), Caller::External);

        state.claim_privileged().unwrap();
        assert_eq!(state.identify(me), Caller::Primary);
        assert_eq!(state.claim_privileged(), Err(ThrError::AlreadyInitialized));

        let other = thread::spawn(|| thread::current().id()).join().unwrap();
        state.pool_threads.insert(other, WorkerId::new(1));
        assert_eq!(state.identify(other), Caller::PoolWorker(WorkerId::new(1)));
    }

    #[test]
    fn test_relocate_between_pools() {
        let mut state = State::new(4, 2);
        state.claim_privileged().unwrap();
        let id = State::privileged_id();
        assert!(state.pools.get(PoolKind::Active).contains(&state, id));

        state.relocate(id, PoolKind::Sleeping, Placement::First);
        assert!(state.pools.get(PoolKind::Active).is_empty());
        assert_eq!(state.pools.get(PoolKind::Sleeping).last(), Some(id));

        state.release_all(PoolKind::Sleeping);
        assert!(state.pools.get(PoolKind::Sleeping).is_empty());
        assert_eq!(state.pools.get(PoolKind::Active).members(), &[id]);

        state.detach(id);
        assert!(state.worker(id).membership().is_none());
    }

    #[test]
    fn test_pair_mut_either_order() {
        let mut pools = Pools::new(2);
        let (a, b) = pools.pair_mut(PoolKind::Waiting, PoolKind::Active);
        assert_eq!(a.kind(), PoolKind::Waiting);
        assert_eq!(b.kind(), PoolKind::Active);
        let (a, b) = pools.pair_mut(PoolKind::Active, PoolKind::Sleeping);
        assert_eq!(a.kind(), PoolKind::Active);
        assert_eq!(b.kind(), PoolKind::Sleeping);
    }

    #[test]
    fn test_caller_display() {
        assert_eq!(Caller::Primary.to_string(), "privileged thread");
        assert_eq!(
            Caller::PoolWorker(WorkerId::new(2)).to_string(),
            "worker thread 2"
        );
        assert_eq!(Caller::External.to_string(), "thread");
    }
}
