//! Task dispatcher
//!
//! One lock guards the three work queues and the three thread sets. Every
//! thread that calls in is resolved to a [`Caller`] first; that decides whether
//! a blocking call is serviced inline (privileged thread, pool workers) or
//! handed off and waited on (everyone else).

#[allow(clippy::module_inception)]
mod scheduler;
mod shared;
mod state;

pub use scheduler::{Scheduler, SchedulerStats};
pub use state::Caller;

use crate::config::SchedulerConfig;
use once_cell::sync::Lazy;

static GLOBAL: Lazy<Scheduler> = Lazy::new(|| {
    Scheduler::new(SchedulerConfig::default())
        .expect("failed to create the process-wide scheduler")
});

/// Process-wide dispatcher with the default configuration.
///
/// # Panics
/// Panics on first use if the hardware concurrency cannot be determined.
pub fn global() -> &'static Scheduler {
    &GLOBAL
}
