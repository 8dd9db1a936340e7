//! Default constants for dispatcher configuration.

/// Smallest usable ring queue capacity. One slot is always kept free to tell
/// an empty queue from a full one.
pub const MIN_QUEUE_CAPACITY: usize = 2;

/// Default initial capacity of every task queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = MIN_QUEUE_CAPACITY;

/// Default OS thread name prefix for pool workers.
pub const DEFAULT_THREAD_NAME_PREFIX: &str = "naju-worker";

/// Worker id reserved for the privileged thread.
pub const PRIVILEGED_WORKER: usize = 0;
