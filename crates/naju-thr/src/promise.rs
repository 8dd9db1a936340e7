//! Promise: a task bundled with a one-shot completion signal.
//!
//! Used when a thread that is neither privileged nor a pool worker wants to
//! run something synchronously. The caller can't service queues itself, so it
//! queues a promise and sleeps on the promise's signal until a worker has run
//! the task.

use crate::task::{self, Task};
use crate::{ThrError, ThrResult};
use once_cell::sync::OnceCell;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::fmt;
use std::sync::Arc;

/// A job that has been promised to be fulfilled
pub struct Promise {
    /// Task to execute (taken by the runner)
    task: Mutex<Option<Task>>,

    /// Signal fired on fulfillment
    signal: Arc<Condvar>,

    /// Outcome, set exactly once
    outcome: OnceCell<ThrResult<()>>,
}

impl Promise {
    /// Create a promise for `task` that fires `signal` when fulfilled
    pub fn new(task: Task, signal: Arc<Condvar>) -> Self {
        Self {
            task: Mutex::new(Some(task)),
            signal,
            outcome: OnceCell::new(),
        }
    }

    /// Check if the promise has been fulfilled
    pub fn is_fulfilled(&self) -> bool {
        self.outcome.get().is_some()
    }

    /// Outcome of the promise, once fulfilled
    pub fn outcome(&self) -> Option<&ThrResult<()>> {
        self.outcome.get()
    }

    /// Run the task in the promise, implicitly fulfilling it.
    ///
    /// `guard` is released while the task runs and held again when the
    /// signal fires.
    pub fn run<T>(&self, guard: &mut MutexGuard<'_, T>) {
        let task = self.task.lock().take();
        let outcome = match task {
            Some(task) => MutexGuard::unlocked(guard, || task::run_guarded(task)),
            None => Err(ThrError::Abandoned),
        };
        self.fulfill(outcome);
    }

    /// Release the waiter with `Abandoned` without running the task.
    ///
    /// The unexecuted task is handed back so the caller can drop it outside
    /// any lock it holds.
    pub fn abandon(&self) -> Option<Task> {
        let task = self.task.lock().take();
        self.fulfill(Err(ThrError::Abandoned));
        task
    }

    fn fulfill(&self, outcome: ThrResult<()>) {
        if self.outcome.set(outcome).is_ok() {
            self.signal.notify_all();
        }
    }

    /// Wait for the promise to be fulfilled.
    ///
    /// `guard` must be the lock the fulfilling side holds when it fires the
    /// signal; it is released for the duration of the wait.
    pub fn wait<T>(&self, guard: &mut MutexGuard<'_, T>) -> ThrResult<()> {
        loop {
            if let Some(outcome) = self.outcome.get() {
                return outcome.clone();
            }
            self.signal.wait(guard);
        }
    }
}

impl fmt::Debug for Promise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("outcome", &self.outcome.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::boxed;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn test_run_fulfills() {
        let lock = Mutex::new(());
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        let promise = Promise::new(
            boxed(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }),
            Arc::new(Condvar::new()),
        );
        assert!(!promise.is_fulfilled());

        let mut guard = lock.lock();
        promise.run(&mut guard);
        assert_eq!(promise.outcome(), Some(&Ok(())));
        assert_eq!(promise.wait(&mut guard), Ok(()));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_run_twice_executes_once() {
        let lock = Mutex::new(());
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        let promise = Promise::new(
            boxed(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }),
            Arc::new(Condvar::new()),
        );

        let mut guard = lock.lock();
        promise.run(&mut guard);
        promise.run(&mut guard);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(promise.outcome(), Some(&Ok(())));
    }

    #[test]
    fn test_panic_recorded() {
        let lock = Mutex::new(());
        let promise = Promise::new(boxed(|| panic!("no context")), Arc::new(Condvar::new()));

        let mut guard = lock.lock();
        promise.run(&mut guard);
        assert_eq!(
            promise.wait(&mut guard),
            Err(ThrError::TaskPanicked("no context".to_string()))
        );
    }

    #[test]
    fn test_abandon_skips_task() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        let promise = Promise::new(
            boxed(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }),
            Arc::new(Condvar::new()),
        );

        assert!(promise.abandon().is_some());
        assert!(promise.abandon().is_none());
        assert_eq!(promise.outcome(), Some(&Err(ThrError::Abandoned)));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_wait_across_threads() {
        let lock = Arc::new(Mutex::new(()));
        let promise = Arc::new(Promise::new(boxed(|| {}), Arc::new(Condvar::new())));

        let mut guard = lock.lock();
        let runner = {
            let lock = lock.clone();
            let promise = promise.clone();
            thread::spawn(move || {
                let mut guard = lock.lock();
                promise.run(&mut guard);
            })
        };

        // The runner can only get the lock once we are parked in wait()
        assert_eq!(promise.wait(&mut guard), Ok(()));
        drop(guard);
        runner.join().unwrap();
    }
}
