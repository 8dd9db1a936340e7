//! Scheduler configuration

use crate::defaults::{DEFAULT_QUEUE_CAPACITY, DEFAULT_THREAD_NAME_PREFIX, MIN_QUEUE_CAPACITY};
use crate::{ThrError, ThrResult};

/// Get hardware concurrency.
///
/// Fails if the platform does not report it.
pub fn hardware_concurrency() -> ThrResult<usize> {
    match num_cpus::get() {
        0 => Err(ThrError::HardwareConcurrencyUnavailable),
        n => Ok(n),
    }
}

/// Scheduler configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Capacity of each thread set (None = hardware concurrency)
    pub thread_capacity: Option<usize>,

    /// Initial capacity of every task queue
    pub queue_capacity: usize,

    /// Maximum idle wake signals kept for reuse (None = thread capacity)
    pub signal_pool_size: Option<usize>,

    /// OS thread name prefix for pool workers
    pub thread_name_prefix: String,

    /// Stack size for pool workers in bytes (None = platform default)
    pub stack_size: Option<usize>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            thread_capacity: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            signal_pool_size: None,
            thread_name_prefix: DEFAULT_THREAD_NAME_PREFIX.to_string(),
            stack_size: None,
        }
    }
}

impl SchedulerConfig {
    /// Set the thread set capacity
    pub fn thread_capacity(mut self, capacity: usize) -> Self {
        self.thread_capacity = Some(capacity);
        self
    }

    /// Set the initial queue capacity (clamped to the minimum of 2)
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(MIN_QUEUE_CAPACITY);
        self
    }

    /// Set the number of idle wake signals kept for reuse
    pub fn signal_pool_size(mut self, size: usize) -> Self {
        self.signal_pool_size = Some(size);
        self
    }

    /// Set the worker thread name prefix
    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Set the worker stack size
    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    /// Thread set capacity after applying the hardware default
    pub fn resolved_thread_capacity(&self) -> ThrResult<usize> {
        match self.thread_capacity {
            Some(capacity) => Ok(capacity.max(1)),
            None => hardware_concurrency(),
        }
    }

    /// Signal pool size after applying the thread capacity default
    pub fn resolved_signal_pool_size(&self) -> ThrResult<usize> {
        match self.signal_pool_size {
            Some(size) => Ok(size),
            None => self.resolved_thread_capacity(),
        }
    }
}
