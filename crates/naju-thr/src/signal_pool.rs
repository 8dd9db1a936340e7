//! Pool of reusable wake signals for promises.
//!
//! Blocking callers from outside the worker pool need a private signal to
//! sleep on while their promise is in flight. Signals are borrowed through a
//! [`PooledSignal`] guard, which hands the signal back on every exit path.

use parking_lot::{Condvar, Mutex};
use std::ops::Deref;
use std::sync::Arc;

/// Free list of idle wake signals
pub struct SignalPool {
    signals: Mutex<Vec<Arc<Condvar>>>,
    max_size: usize,
}

impl SignalPool {
    /// Create a new pool that keeps up to `max_size` idle signals.
    pub fn new(max_size: usize) -> Self {
        Self {
            signals: Mutex::new(Vec::with_capacity(max_size)),
            max_size,
        }
    }

    /// Borrow a signal from the pool, or create a new one.
    pub fn acquire(&self) -> PooledSignal<'_> {
        let signal = self
            .signals
            .lock()
            .pop()
            .unwrap_or_else(|| Arc::new(Condvar::new()));
        PooledSignal {
            pool: self,
            signal: Some(signal),
        }
    }

    fn release(&self, signal: Arc<Condvar>) {
        let mut pool = self.signals.lock();
        if pool.len() < self.max_size {
            pool.push(signal);
        }
    }

    /// Number of idle signals
    pub fn idle(&self) -> usize {
        self.signals.lock().len()
    }
}

/// A signal on loan from a [`SignalPool`]; returned when dropped
pub struct PooledSignal<'a> {
    pool: &'a SignalPool,
    signal: Option<Arc<Condvar>>,
}

impl PooledSignal<'_> {
    /// Shared handle to the borrowed signal
    pub fn share(&self) -> Arc<Condvar> {
        Arc::clone(self)
    }
}

impl Deref for PooledSignal<'_> {
    type Target = Arc<Condvar>;

    fn deref(&self) -> &Arc<Condvar> {
        self.signal
            .as_ref()
            .unwrap_or_else(|| unreachable!("signal is only taken on drop"))
    }
}

impl Drop for PooledSignal<'_> {
    fn drop(&mut self) {
        if let Some(signal) = self.signal.take() {
            self.pool.release(signal);
        }
    }
}
