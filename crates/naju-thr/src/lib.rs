//! Naju threading core
//!
//! This crate provides the task dispatcher used by the rest of the engine:
//! - A privileged thread that owns non-thread-safe resources (e.g. a GL context)
//! - Important (promised) and normal work queues serviced by a worker pool
//! - Parking/waking of idle workers without busy-waiting
//! - Deadlock-free blocking submission, even from inside dispatched work
//!
//! The entry point is [`Scheduler`]. A typical embedding looks like:
//!
//! ```rust,ignore
//! let scheduler = Scheduler::new(SchedulerConfig::default())?;
//! scheduler.init()?;
//!
//! let handle = scheduler.clone();
//! scheduler.submit(move || {
//!     // ... background work ...
//!     handle.submit_privileged(|| { /* touch the graphics context */ });
//! });
//!
//! scheduler.run_main_loop(0)?; // returns after shutdown()
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod defaults;
pub mod promise;
pub mod ring;
pub mod scheduler;
pub mod signal_pool;
pub mod task;
pub mod thread_set;
pub mod worker;

pub use config::{hardware_concurrency, SchedulerConfig};
pub use promise::Promise;
pub use ring::RingQueue;
pub use scheduler::{global, Caller, Scheduler, SchedulerStats};
pub use signal_pool::{PooledSignal, SignalPool};
pub use task::Task;
pub use thread_set::{Membership, PoolKind, ThreadSet};
pub use worker::{WakeState, WorkerHandle, WorkerId, WorkerTable};

/// Dispatcher errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ThrError {
    /// `get()` on an empty ring queue
    #[error("circular buffer of size {capacity} is empty")]
    EmptyQueue {
        /// Capacity of the queue at the time of the call
        capacity: usize,
    },

    /// `init()` called twice
    #[error("thread system already initialized")]
    AlreadyInitialized,

    /// Operation requires a claimed privileged thread
    #[error("thread system not initialized")]
    NotInitialized,

    /// Main loop entered from a thread other than the privileged one
    #[error("trying to enter main loop from unprivileged thread")]
    NotPrivilegedThread,

    /// Main loop entered while it is already running
    #[error("main loop is already running")]
    MainLoopActive,

    /// The scheduler has been shut down
    #[error("thread system has been shut down")]
    ShutDown,

    /// More threads requested than the thread sets can hold
    #[error("requested {requested} threads but thread sets hold at most {capacity}")]
    CapacityExceeded {
        /// Total threads (workers plus the privileged thread) requested
        requested: usize,
        /// Thread set capacity
        capacity: usize,
    },

    /// The platform did not report its hardware concurrency
    #[error("hardware concurrency information not available")]
    HardwareConcurrencyUnavailable,

    /// The OS refused to spawn a worker thread
    #[error("failed to spawn worker thread: {0}")]
    Spawn(String),

    /// Work was discarded by shutdown before it could complete
    #[error("operation abandoned due to shutdown")]
    Abandoned,

    /// The task panicked while executing
    #[error("task panicked: {0}")]
    TaskPanicked(String),
}

/// Dispatcher result
pub type ThrResult<T> = Result<T, ThrError>;
