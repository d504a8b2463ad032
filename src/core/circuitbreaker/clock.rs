/// Monotonic wall-time source, injected so tests can control the passage of
/// time instead of sleeping real seconds.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> u64;
}

/// Default `Clock`, backed by the system clock.
#[derive(Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        crate::utils::curr_time_millis()
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// A `Clock` a test can advance deterministically.
    pub struct FakeClock(AtomicU64);

    impl FakeClock {
        pub fn new(start_millis: u64) -> Self {
            FakeClock(AtomicU64::new(start_millis))
        }

        pub fn advance_ms(&self, ms: u64) {
            self.0.fetch_add(ms, Ordering::SeqCst);
        }
    }

    impl Clock for FakeClock {
        fn now_millis(&self) -> u64 {
            self.0.load(Ordering::SeqCst)
        }
    }
}
