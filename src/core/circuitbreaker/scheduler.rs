use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// `Scheduler` is the collaborator the breaker uses for its two timer-driven
/// transitions (`Open -> HalfOpen` after the sleep window, and the 1-second
/// half-open conversion debounce). It is injected so tests can run the state
/// machine without waiting on wall-clock time, and so a host application can
/// share a single timer wheel across many breakers.
pub trait Scheduler: Send + Sync {
    /// Schedules `task` to run once, at least `delay_ms` from now. Returns a
    /// handle that can cancel the task before it fires.
    fn schedule_once(&self, delay_ms: u64, task: Box<dyn FnOnce() + Send>) -> TaskHandle;
}

/// A cancellable handle to a scheduled task. Dropping the handle does *not*
/// cancel the task - callers must call `cancel()` explicitly, mirroring the
/// spec's requirement that the registry can cancel outstanding half-open
/// timers on breaker replacement.
#[derive(Clone)]
pub struct TaskHandle {
    cancelled: Arc<AtomicBool>,
}

impl TaskHandle {
    fn new() -> Self {
        TaskHandle {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A handle for a task that was never actually scheduled, e.g. a test
    /// `Scheduler` that drops tasks on the floor.
    pub fn noop() -> Self {
        TaskHandle::new()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Default `Scheduler` backed by one detached OS thread per scheduled task.
/// Adequate for a breaker's low task volume (at most one pending timer per
/// breaker at a time); a host application fronting thousands of breakers may
/// want to inject a timer-wheel based implementation instead.
#[derive(Default)]
pub struct ThreadScheduler;

impl ThreadScheduler {
    pub fn new() -> Self {
        ThreadScheduler
    }
}

impl Scheduler for ThreadScheduler {
    fn schedule_once(&self, delay_ms: u64, task: Box<dyn FnOnce() + Send>) -> TaskHandle {
        let handle = TaskHandle::new();
        let handle_for_thread = handle.clone();
        std::thread::spawn(move || {
            crate::utils::sleep_for_ms(delay_ms);
            if !handle_for_thread.is_cancelled() {
                task();
            }
        });
        handle
    }
}
