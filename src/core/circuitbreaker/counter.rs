//! `TriggerCounter` family: aggregate success/failure samples per trigger
//! condition and signal the owning breaker once a threshold is met.
//!
//! Both variants share a contract: accept one boolean sample (`true` =
//! success), fire a single-shot callback on the injected [`TripHandler`] when
//! a threshold is crossed, and expose [`TriggerCounter::resume`] to reset
//! internal state. A `tripped` bit makes firing idempotent across concurrent
//! samples landing in the same evaluation window; only the state machine
//! (via `resume()` on transition back to `Closed`) clears it.

use super::clock::Clock;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Invoked at most once per streak/window attainment to request that the
/// owning breaker trip from `Closed` to `Open`.
pub trait TripHandler: Send + Sync {
    fn trip(&self, rule_name: &str);
}

pub trait TriggerCounter: Send + Sync {
    /// Records one sample. `success = true` for a success, `false` for a failure.
    fn on_sample(&self, success: bool);
    /// Resets all internal state and clears the tripped bit. Called by the
    /// state machine when transitioning to `Closed`.
    fn resume(&self);
}

/// Trips after `error_count` consecutive failures.
pub struct ConsecutiveCounter {
    rule_name: String,
    error_count: u32,
    streak: AtomicU32,
    tripped: AtomicBool,
    handler: Arc<dyn TripHandler>,
}

impl ConsecutiveCounter {
    pub fn new(rule_name: String, error_count: u32, handler: Arc<dyn TripHandler>) -> Self {
        ConsecutiveCounter {
            rule_name,
            error_count,
            streak: AtomicU32::new(0),
            tripped: AtomicBool::new(false),
            handler,
        }
    }
}

impl TriggerCounter for ConsecutiveCounter {
    fn on_sample(&self, success: bool) {
        if success {
            self.streak.store(0, Ordering::SeqCst);
            return;
        }
        let streak = self.streak.fetch_add(1, Ordering::SeqCst) + 1;
        if streak >= self.error_count
            && self
                .tripped
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            self.streak.store(0, Ordering::SeqCst);
            self.handler.trip(&self.rule_name);
        }
    }

    fn resume(&self) {
        self.streak.store(0, Ordering::SeqCst);
        self.tripped.store(false, Ordering::SeqCst);
    }
}

const NEVER: u64 = u64::MAX;

/// One second-wide slot in an [`ErrRateCounter`]'s ring.
struct Bucket {
    /// The wall-clock second this bucket currently represents, or `NEVER`.
    second: AtomicU64,
    total: AtomicU64,
    failed: AtomicU64,
    /// Guards the reset-on-rollover path; uncontended in the common case
    /// where a bucket is reused well inside its owning second.
    reset_lock: Mutex<()>,
}

impl Bucket {
    fn new() -> Self {
        Bucket {
            second: AtomicU64::new(NEVER),
            total: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            reset_lock: Mutex::new(()),
        }
    }
}

/// Bucketed ring over `interval_secs`, one bucket per second. Invariant: the
/// sum over the ring equals the observed count in the last `interval_secs`
/// seconds, give or take one bucket of skew around a rollover.
pub struct ErrRateCounter {
    rule_name: String,
    interval_secs: u32,
    min_samples: u64,
    error_percent: f64,
    buckets: Vec<Bucket>,
    tripped: AtomicBool,
    last_checked_second: AtomicU64,
    handler: Arc<dyn TripHandler>,
    clock: Arc<dyn Clock>,
}

impl ErrRateCounter {
    pub fn new(
        rule_name: String,
        interval_secs: u32,
        min_samples: u64,
        error_percent: f64,
        handler: Arc<dyn TripHandler>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let mut buckets = Vec::with_capacity(interval_secs as usize);
        for _ in 0..interval_secs {
            buckets.push(Bucket::new());
        }
        ErrRateCounter {
            rule_name,
            interval_secs,
            min_samples,
            error_percent,
            buckets,
            tripped: AtomicBool::new(false),
            last_checked_second: AtomicU64::new(NEVER),
            handler,
            clock,
        }
    }

    fn now_secs(&self) -> u64 {
        self.clock.now_millis() / 1000
    }

    fn bucket_for(&self, sec: u64) -> &Bucket {
        let idx = (sec % self.interval_secs as u64) as usize;
        let bucket = &self.buckets[idx];
        loop {
            let owner = bucket.second.load(Ordering::SeqCst);
            if owner == sec {
                return bucket;
            }
            if owner == NEVER || owner < sec {
                if let Ok(_guard) = bucket.reset_lock.try_lock() {
                    if bucket.second.load(Ordering::SeqCst) != sec {
                        bucket.total.store(0, Ordering::SeqCst);
                        bucket.failed.store(0, Ordering::SeqCst);
                        bucket.second.store(sec, Ordering::SeqCst);
                    }
                    return bucket;
                }
                std::thread::yield_now();
            } else {
                // `owner > sec`: a clock went backwards relative to another
                // sample. Use the bucket read-only rather than clobbering
                // newer data.
                return bucket;
            }
        }
    }

    /// Sums total/failed over buckets still inside the trailing window.
    fn window_sums(&self, now_sec: u64) -> (u64, u64) {
        let mut total = 0u64;
        let mut failed = 0u64;
        for bucket in &self.buckets {
            let owner = bucket.second.load(Ordering::SeqCst);
            if owner != NEVER && now_sec.saturating_sub(owner) < self.interval_secs as u64 {
                total += bucket.total.load(Ordering::SeqCst);
                failed += bucket.failed.load(Ordering::SeqCst);
            }
        }
        (total, failed)
    }
}

impl TriggerCounter for ErrRateCounter {
    fn on_sample(&self, success: bool) {
        let now_sec = self.now_secs();
        let bucket = self.bucket_for(now_sec);
        bucket.total.fetch_add(1, Ordering::SeqCst);
        if !success {
            bucket.failed.fetch_add(1, Ordering::SeqCst);
        }

        // Evaluate on bucket rollover, or at most once per second on arrival.
        if self.last_checked_second.swap(now_sec, Ordering::SeqCst) == now_sec {
            return;
        }
        if self.tripped.load(Ordering::SeqCst) {
            return;
        }
        let (total, failed) = self.window_sums(now_sec);
        if total >= self.min_samples && (failed * 100) as f64 >= total as f64 * self.error_percent {
            if self
                .tripped
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                self.handler.trip(&self.rule_name);
            }
        }
    }

    fn resume(&self) {
        for bucket in &self.buckets {
            bucket.second.store(NEVER, Ordering::SeqCst);
            bucket.total.store(0, Ordering::SeqCst);
            bucket.failed.store(0, Ordering::SeqCst);
        }
        self.last_checked_second.store(NEVER, Ordering::SeqCst);
        self.tripped.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod test {
    use super::super::clock::test::FakeClock;
    use super::*;
    use std::sync::Mutex as StdMutex;

    struct RecordingHandler {
        trips: StdMutex<Vec<String>>,
    }

    impl RecordingHandler {
        fn new() -> Arc<Self> {
            Arc::new(RecordingHandler {
                trips: StdMutex::new(Vec::new()),
            })
        }
        fn count(&self) -> usize {
            self.trips.lock().unwrap().len()
        }
    }

    impl TripHandler for RecordingHandler {
        fn trip(&self, rule_name: &str) {
            self.trips.lock().unwrap().push(rule_name.to_string());
        }
    }

    #[test]
    fn consecutive_counter_fires_once_per_streak() {
        let handler = RecordingHandler::new();
        let counter = ConsecutiveCounter::new("r1".into(), 3, handler.clone());
        counter.on_sample(false);
        counter.on_sample(false);
        assert_eq!(handler.count(), 0);
        counter.on_sample(false);
        assert_eq!(handler.count(), 1);
        // further failures do not refire until resume()
        counter.on_sample(false);
        counter.on_sample(false);
        assert_eq!(handler.count(), 1);
        counter.resume();
        counter.on_sample(false);
        counter.on_sample(false);
        counter.on_sample(false);
        assert_eq!(handler.count(), 2);
    }

    #[test]
    fn consecutive_counter_resets_streak_on_success() {
        let handler = RecordingHandler::new();
        let counter = ConsecutiveCounter::new("r1".into(), 3, handler.clone());
        counter.on_sample(false);
        counter.on_sample(false);
        counter.on_sample(true);
        counter.on_sample(false);
        counter.on_sample(false);
        assert_eq!(handler.count(), 0);
    }

    #[test]
    fn err_rate_counter_trips_over_threshold() {
        let handler = RecordingHandler::new();
        let clock = Arc::new(FakeClock::new(0));
        let counter = ErrRateCounter::new(
            "r1".into(),
            10,
            10,
            50.0,
            handler.clone(),
            clock.clone() as Arc<dyn Clock>,
        );
        for _ in 0..5 {
            counter.on_sample(true);
        }
        for i in 0..6 {
            if i > 0 {
                clock.advance_ms(1);
            }
            counter.on_sample(false);
        }
        assert_eq!(handler.count(), 1);
    }

    #[test]
    fn err_rate_counter_stays_closed_under_min_samples_ratio() {
        let handler = RecordingHandler::new();
        let clock = Arc::new(FakeClock::new(0));
        let counter = ErrRateCounter::new(
            "r1".into(),
            10,
            10,
            50.0,
            handler.clone(),
            clock.clone() as Arc<dyn Clock>,
        );
        for _ in 0..5 {
            counter.on_sample(true);
        }
        for i in 0..4 {
            if i > 0 {
                clock.advance_ms(1);
            }
            counter.on_sample(false);
        }
        assert_eq!(handler.count(), 0);
    }

    #[test]
    fn err_rate_counter_expires_old_buckets() {
        let handler = RecordingHandler::new();
        let clock = Arc::new(FakeClock::new(0));
        let counter = ErrRateCounter::new(
            "r1".into(),
            2,
            1,
            1.0,
            handler.clone(),
            clock.clone() as Arc<dyn Clock>,
        );
        counter.on_sample(false);
        assert_eq!(handler.count(), 1);
        counter.resume();
        clock.advance_ms(5000);
        counter.on_sample(true);
        counter.on_sample(true);
        assert_eq!(handler.count(), 1);
    }
}
