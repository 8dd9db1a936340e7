//! Deferred units of work

use crate::{ThrError, ThrResult};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

/// An argument-bound, no-return unit of work. Executed at most once.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Box a closure into a [`Task`]
pub fn boxed<F>(f: F) -> Task
where
    F: FnOnce() + Send + 'static,
{
    Box::new(f)
}

/// Run a task, turning a panic into `ThrError::TaskPanicked`.
///
/// The panic never unwinds into the dispatcher, so a failing task can't take
/// down a worker or leave the scheduler mid-transition.
pub fn run_guarded(task: Task) -> ThrResult<()> {
    panic::catch_unwind(AssertUnwindSafe(task)).map_err(|payload| {
        let message = panic_message(payload.as_ref());
        tracing::error!(message = %message, "task panicked");
        ThrError::TaskPanicked(message)
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_run_guarded_ok() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        assert_eq!(
            run_guarded(boxed(move || {
                c.fetch_add(1, Ordering::SeqCst);
            })),
            Ok(())
        );
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_run_guarded_str_panic() {
        let result = run_guarded(boxed(|| panic!("boom")));
        assert_eq!(result, Err(ThrError::TaskPanicked("boom".to_string())));
    }

    #[test]
    fn test_run_guarded_formatted_panic() {
        let value = 7;
        let result = run_guarded(boxed(move || panic!("bad value {}", value)));
        assert_eq!(
            result,
            Err(ThrError::TaskPanicked("bad value 7".to_string()))
        );
    }
}
