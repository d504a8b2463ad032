//! `ResourceBreaker`: the per-resource `Closed -> Open -> HalfOpen -> Closed`
//! state machine. A breaker owns one immutable [`CircuitBreakerRule`] for its
//! whole lifetime; a rule reload replaces the breaker wholesale rather than
//! mutating one in place (see [`super::registry`]).

use super::clock::Clock;
use super::counter::{ConsecutiveCounter, ErrRateCounter, TriggerCounter, TripHandler};
use super::rule::{CircuitBreakerRule, ErrorCondition, FallbackResponse, TriggerCondition};
use super::scheduler::Scheduler;
use crate::core::stat::{ResourceStat, ReturnStatus};
use regex::Regex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Closed,
    Open,
    HalfOpen,
}

/// Outcome of a pre-call admission check.
pub enum CheckResult {
    Pass,
    Reject(Option<FallbackResponse>),
}

impl CheckResult {
    pub fn is_pass(&self) -> bool {
        matches!(self, CheckResult::Pass)
    }
}

/// A compiled [`ErrorCondition`], so `report()` never pays regex compilation
/// cost on the hot path.
enum CompiledErrorCondition {
    RetCode(Regex),
    Delay(u64),
}

fn compile_error_conditions(conditions: &[ErrorCondition]) -> Vec<CompiledErrorCondition> {
    conditions
        .iter()
        .map(|c| match c {
            ErrorCondition::RetCode { pattern } => {
                // `CircuitBreakerRule::is_valid` already rejected bad patterns
                // before a breaker is ever constructed from this rule.
                CompiledErrorCondition::RetCode(Regex::new(pattern).expect("validated pattern"))
            }
            ErrorCondition::Delay { operand_ms } => CompiledErrorCondition::Delay(*operand_ms),
        })
        .collect()
}

struct WeakTripHandler(Weak<ResourceBreaker>);

impl TripHandler for WeakTripHandler {
    fn trip(&self, _rule_name: &str) {
        if let Some(breaker) = self.0.upgrade() {
            breaker.close_to_open();
        }
    }
}

pub struct ResourceBreaker {
    rule: CircuitBreakerRule,
    error_conditions: Vec<CompiledErrorCondition>,
    state: RwLock<State>,
    transition_lock: Mutex<()>,
    counters: Vec<Arc<dyn TriggerCounter>>,
    half_open_successes: AtomicU32,
    /// Remaining half-open admission tokens; `check()` denies once exhausted
    /// without that denial counting as a sample.
    half_open_tokens: AtomicU32,
    /// Debounces the half-open conversion check to at most one in-flight
    /// scheduled task at a time, per §4.2.
    half_open_conversion_scheduled: AtomicBool,
    open_since_ms: AtomicU64,
    last_self_heal_check_ms: AtomicU64,
    pending_timer: Mutex<Option<super::scheduler::TaskHandle>>,
    scheduler: Arc<dyn Scheduler>,
    clock: Arc<dyn Clock>,
    self_weak: Weak<ResourceBreaker>,
}

impl ResourceBreaker {
    pub fn new(
        rule: CircuitBreakerRule,
        scheduler: Arc<dyn Scheduler>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| {
            let handler: Arc<dyn TripHandler> = Arc::new(WeakTripHandler(weak.clone()));
            let counters = rule
                .triggers
                .iter()
                .map(|trigger| build_counter(&rule.rule_name, trigger, handler.clone(), clock.clone()))
                .collect();
            let error_conditions = compile_error_conditions(&rule.error_conditions);
            ResourceBreaker {
                rule,
                error_conditions,
                state: RwLock::new(State::Closed),
                transition_lock: Mutex::new(()),
                counters,
                half_open_successes: AtomicU32::new(0),
                half_open_tokens: AtomicU32::new(0),
                half_open_conversion_scheduled: AtomicBool::new(false),
                open_since_ms: AtomicU64::new(0),
                last_self_heal_check_ms: AtomicU64::new(0),
                pending_timer: Mutex::new(None),
                scheduler,
                clock,
                self_weak: weak.clone(),
            }
        })
    }

    pub fn rule(&self) -> &CircuitBreakerRule {
        &self.rule
    }

    pub fn state(&self) -> State {
        *self.state.read().unwrap()
    }

    /// Classifies a report as failure (`false`) or success (`true`). A
    /// `Success`/`Fail` status is authoritative; `Unknown` is run through the
    /// rule's error conditions (OR'd together), defaulting to success when
    /// none match.
    fn classify(&self, stat: &ResourceStat) -> bool {
        match stat.status {
            ReturnStatus::Success => true,
            ReturnStatus::Fail => false,
            ReturnStatus::Unknown => {
                for cond in &self.error_conditions {
                    let is_failure = match cond {
                        CompiledErrorCondition::RetCode(re) => {
                            re.is_match(&stat.return_code.to_string())
                        }
                        CompiledErrorCondition::Delay(operand_ms) => stat.delay_ms >= *operand_ms,
                    };
                    if is_failure {
                        return false;
                    }
                }
                true
            }
        }
    }

    /// Feeds one observed call outcome into the state machine.
    pub fn report(&self, stat: ResourceStat) {
        let success = self.classify(&stat);
        match self.state() {
            State::Closed => {
                for counter in &self.counters {
                    counter.on_sample(success);
                }
            }
            State::HalfOpen => {
                if success {
                    let count = self.half_open_successes.fetch_add(1, Ordering::SeqCst) + 1;
                    if count >= self.rule.recover.consecutive_success_count {
                        self.schedule_conversion_check_if_needed();
                    }
                } else {
                    self.half_open_successes.store(0, Ordering::SeqCst);
                    self.schedule_conversion_check_if_needed();
                }
            }
            State::Open => {
                // A late sample from a call admitted before the breaker
                // tripped; the state machine only reacts to samples gathered
                // while Closed or HalfOpen.
            }
        }
    }

    /// Pre-call admission check. May itself advance `Open -> HalfOpen` as a
    /// self-healing fallback for a scheduler that failed to fire its timer,
    /// debounced to at most once per second. In `HalfOpen`, admission is
    /// additionally rationed by a token count set to `consecutive_success_count`
    /// on entry; exhausting it denies calls without recording a failure.
    pub fn check(&self) -> CheckResult {
        if self.state() == State::Open {
            self.self_heal_if_due();
        }
        match self.state() {
            State::Closed => CheckResult::Pass,
            State::Open => CheckResult::Reject(self.fallback_response()),
            State::HalfOpen => {
                let acquired = self
                    .half_open_tokens
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |tokens| {
                        tokens.checked_sub(1)
                    })
                    .is_ok();
                if acquired {
                    CheckResult::Pass
                } else {
                    CheckResult::Reject(self.fallback_response())
                }
            }
        }
    }

    fn fallback_response(&self) -> Option<FallbackResponse> {
        self.rule.fallback.as_ref().and_then(|fb| {
            if fb.enable {
                Some(fb.response.clone())
            } else {
                None
            }
        })
    }

    fn self_heal_if_due(&self) {
        let now = self.clock.now_millis();
        let last = self.last_self_heal_check_ms.load(Ordering::SeqCst);
        if now.saturating_sub(last) < 1000 {
            return;
        }
        if self
            .last_self_heal_check_ms
            .compare_exchange(last, now, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        let sleep_ms = self.rule.recover.sleep_window_secs as u64 * 1000;
        let opened_at = self.open_since_ms.load(Ordering::SeqCst);
        if now.saturating_sub(opened_at) >= sleep_ms {
            self.open_to_half_open();
        }
    }

    fn close_to_open(&self) {
        let _guard = self.transition_lock.lock().unwrap();
        if self.state() != State::Closed {
            return;
        }
        *self.state.write().unwrap() = State::Open;
        self.open_since_ms
            .store(self.clock.now_millis(), Ordering::SeqCst);
        self.schedule_half_open_timer();
    }

    fn open_to_half_open(&self) {
        let _guard = self.transition_lock.lock().unwrap();
        if self.state() != State::Open {
            return;
        }
        self.half_open_successes.store(0, Ordering::SeqCst);
        self.half_open_tokens.store(
            self.rule.recover.consecutive_success_count,
            Ordering::SeqCst,
        );
        self.half_open_conversion_scheduled
            .store(false, Ordering::SeqCst);
        *self.state.write().unwrap() = State::HalfOpen;
    }

    fn schedule_conversion_check_if_needed(&self) {
        if self
            .half_open_conversion_scheduled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        let weak = self.self_weak.clone();
        self.scheduler.schedule_once(
            1000,
            Box::new(move || {
                if let Some(breaker) = weak.upgrade() {
                    breaker.check_half_open_conversion();
                }
            }),
        );
    }

    /// Runs the debounced half-open conversion decision: closes if a
    /// contiguous run of `consecutive_success_count` successes has
    /// accumulated since entering `HalfOpen`, otherwise reopens.
    fn check_half_open_conversion(&self) {
        let _guard = self.transition_lock.lock().unwrap();
        self.half_open_conversion_scheduled
            .store(false, Ordering::SeqCst);
        if self.state() != State::HalfOpen {
            return;
        }
        let successes = self.half_open_successes.load(Ordering::SeqCst);
        if successes >= self.rule.recover.consecutive_success_count {
            *self.state.write().unwrap() = State::Closed;
            self.half_open_successes.store(0, Ordering::SeqCst);
            for counter in &self.counters {
                counter.resume();
            }
        } else {
            *self.state.write().unwrap() = State::Open;
            self.half_open_successes.store(0, Ordering::SeqCst);
            self.open_since_ms
                .store(self.clock.now_millis(), Ordering::SeqCst);
            self.schedule_half_open_timer();
        }
    }

    fn schedule_half_open_timer(&self) {
        let delay_ms = self.rule.recover.sleep_window_secs as u64 * 1000;
        let weak = self.self_weak.clone();
        let handle = self.scheduler.schedule_once(
            delay_ms,
            Box::new(move || {
                if let Some(breaker) = weak.upgrade() {
                    breaker.open_to_half_open();
                }
            }),
        );
        let mut pending = self.pending_timer.lock().unwrap();
        if let Some(old) = pending.take() {
            old.cancel();
        }
        *pending = Some(handle);
    }
}

fn build_counter(
    rule_name: &str,
    trigger: &TriggerCondition,
    handler: Arc<dyn TripHandler>,
    clock: Arc<dyn Clock>,
) -> Arc<dyn TriggerCounter> {
    match trigger {
        TriggerCondition::ConsecutiveError { error_count } => {
            Arc::new(ConsecutiveCounter::new(rule_name.to_string(), *error_count, handler))
        }
        TriggerCondition::ErrorRate {
            interval_secs,
            min_samples,
            error_percent,
        } => Arc::new(ErrRateCounter::new(
            rule_name.to_string(),
            *interval_secs,
            *min_samples,
            *error_percent,
            handler,
            clock,
        )),
    }
}
