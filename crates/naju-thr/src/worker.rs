//! Parkable thread identity with private synchronization
//!
//! A `WorkerHandle` is the scheduler's view of one thread: the privileged
//! thread (claimed at init, never spawned) or a pool worker. All handle state
//! is only touched while holding the scheduler lock; parking releases that
//! lock for the duration of the sleep.

use crate::thread_set::Membership;
use parking_lot::{Condvar, MutexGuard};
use std::fmt;
use std::sync::Arc;
use std::thread::{self, ThreadId};

/// Index of a handle in its owning table
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(usize);

impl WorkerId {
    /// Create a WorkerId from a table index
    pub fn new(index: usize) -> Self {
        WorkerId(index)
    }

    /// Get the table index
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Wake state of a worker
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WakeState {
    /// Woken up, but not requested to do anything
    Active,
    /// Woken up, and requested to check for work
    Required,
    /// Parked on its wake signal
    Sleeping,
}

/// Thread construct with private synchronization
pub struct WorkerHandle {
    /// Index in the owning table
    id: WorkerId,

    /// Native thread identity (None until claimed)
    thread: Option<ThreadId>,

    /// Private wake signal
    wake: Arc<Condvar>,

    /// Current thread set and slot, if any
    membership: Option<Membership>,

    /// Wake state
    state: WakeState,
}

impl WorkerHandle {
    /// Create an unclaimed handle
    pub fn new(id: WorkerId) -> Self {
        Self {
            id,
            thread: None,
            wake: Arc::new(Condvar::new()),
            membership: None,
            state: WakeState::Active,
        }
    }

    /// Create a handle bound to an existing thread
    pub fn for_thread(id: WorkerId, thread: ThreadId) -> Self {
        let mut handle = Self::new(id);
        handle.thread = Some(thread);
        handle
    }

    /// Get the handle id
    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Get the native thread identity, if claimed
    pub fn thread(&self) -> Option<ThreadId> {
        self.thread
    }

    /// Check if no thread has claimed this handle yet
    pub fn is_unclaimed(&self) -> bool {
        self.thread.is_none()
    }

    /// Take control of the calling thread.
    ///
    /// # Panics
    /// Panics if the handle was already claimed.
    pub fn claim(&mut self) {
        assert!(self.is_unclaimed(), "worker {} already claimed", self.id);
        self.thread = Some(thread::current().id());
    }

    /// Current wake state
    pub fn state(&self) -> WakeState {
        self.state
    }

    /// Check if the thread is parked
    pub fn is_sleeping(&self) -> bool {
        self.state == WakeState::Sleeping
    }

    /// Current thread set membership
    pub fn membership(&self) -> Option<Membership> {
        self.membership
    }

    pub(crate) fn set_membership(&mut self, membership: Option<Membership>) {
        self.membership = membership;
    }

    pub(crate) fn set_slot(&mut self, slot: usize) {
        if let Some(membership) = self.membership.as_mut() {
            membership.slot = slot;
        }
    }

    /// Wake the thread without requesting work.
    ///
    /// The caller is responsible for having moved the handle into the active
    /// set before the thread observes the wake.
    pub fn notify(&mut self) {
        self.notify_with(false);
    }

    /// Wake the thread, telling it whether it is needed for work
    pub fn notify_with(&mut self, required: bool) {
        self.state = if required {
            WakeState::Required
        } else {
            WakeState::Active
        };
        self.wake.notify_one();
    }

    fn prepare_park(&mut self) -> Arc<Condvar> {
        self.state = WakeState::Sleeping;
        self.wake.clone()
    }
}

impl fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("id", &self.id)
            .field("thread", &self.thread)
            .field("membership", &self.membership)
            .field("state", &self.state)
            .finish()
    }
}

/// Anything that owns worker handles addressable by [`WorkerId`]
pub trait WorkerTable {
    /// Borrow a handle
    fn worker(&self, id: WorkerId) -> &WorkerHandle;

    /// Mutably borrow a handle
    fn worker_mut(&mut self, id: WorkerId) -> &mut WorkerHandle;
}

impl WorkerTable for Vec<WorkerHandle> {
    fn worker(&self, id: WorkerId) -> &WorkerHandle {
        &self[id.index()]
    }

    fn worker_mut(&mut self, id: WorkerId) -> &mut WorkerHandle {
        &mut self[id.index()]
    }
}

/// Park a worker until another thread notifies it.
///
/// The lock is released while parked. Returns the post-wake state, which is
/// never `Sleeping`.
fn park<T: WorkerTable>(guard: &mut MutexGuard<'_, T>, id: WorkerId) -> WakeState {
    let wake = guard.worker_mut(id).prepare_park();
    while guard.worker(id).is_sleeping() {
        wake.wait(guard);
    }
    guard.worker(id).state()
}

/// Suspend a worker, not caring why it was woken
pub fn suspend<T: WorkerTable>(guard: &mut MutexGuard<'_, T>, id: WorkerId) {
    park(guard, id);
}

/// Park a worker at a collection point.
///
/// Returns true if it was woken because it is needed for work (must re-check),
/// false if the collection point was released.
pub fn wait_at_barrier<T: WorkerTable>(guard: &mut MutexGuard<'_, T>, id: WorkerId) -> bool {
    park(guard, id) == WakeState::Required
}
