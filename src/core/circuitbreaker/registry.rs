//! `BreakerRegistry` owns the live set of [`ResourceBreaker`]s, constructing
//! one on first report for a resource and rebuilding it wholesale whenever
//! the governing rule changes.

use super::breaker::{CheckResult, ResourceBreaker, State};
use super::clock::{Clock, SystemClock};
use super::rule::CircuitBreakerRule;
use super::scheduler::{Scheduler, ThreadScheduler};
use crate::core::resource::{Level, Resource};
use crate::core::stat::ResourceStat;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Keys a configured rule by the resource it governs and the level it was
/// authored at, so a `Method` rule and a `Service` rule for the same service
/// can coexist and the more specific one wins per [`Resource::level`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RuleKey {
    namespace: String,
    service: String,
    level: Level,
    /// Disambiguates sibling keys at the same level, e.g. two `Method` rules
    /// for different methods of the same service.
    qualifier: String,
}

impl RuleKey {
    fn for_rule(rule: &CircuitBreakerRule, resource: &Resource) -> Self {
        let (namespace, service) = resource.namespace_service();
        let qualifier = match resource {
            Resource::Method { method, .. } => method.clone(),
            Resource::Subset { subset, .. } => subset.clone(),
            Resource::Instance { host, port, .. } => format!("{}:{}", host, port),
            Resource::Service { .. } => String::new(),
        };
        RuleKey {
            namespace: namespace.to_string(),
            service: service.to_string(),
            level: rule.level,
            qualifier,
        }
    }

    fn for_resource_at(resource: &Resource, level: Level) -> Self {
        let (namespace, service) = resource.namespace_service();
        let qualifier = match (resource, level) {
            (Resource::Method { method, .. }, Level::Method) => method.clone(),
            (Resource::Subset { subset, .. }, Level::Subset) => subset.clone(),
            (Resource::Instance { host, port, .. }, Level::Instance) => format!("{}:{}", host, port),
            _ => String::new(),
        };
        RuleKey {
            namespace: namespace.to_string(),
            service: service.to_string(),
            level,
            qualifier,
        }
    }
}

struct Inner {
    rules: HashMap<RuleKey, CircuitBreakerRule>,
    breakers: HashMap<RuleKey, Arc<ResourceBreaker>>,
}

/// Central registry of breakers, keyed by resource. Not a singleton: an
/// application composes one registry (or several, for separate rule sets)
/// and shares it across callers.
pub struct BreakerRegistry {
    inner: RwLock<Inner>,
    scheduler: Arc<dyn Scheduler>,
    clock: Arc<dyn Clock>,
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        BreakerRegistry::new(Arc::new(ThreadScheduler::new()), Arc::new(SystemClock))
    }
}

impl BreakerRegistry {
    pub fn new(scheduler: Arc<dyn Scheduler>, clock: Arc<dyn Clock>) -> Self {
        BreakerRegistry {
            inner: RwLock::new(Inner {
                rules: HashMap::new(),
                breakers: HashMap::new(),
            }),
            scheduler,
            clock,
        }
    }

    /// Installs or replaces the single rule governing `resource`. This is the
    /// primary entry point: unlike `load_rules`, it carries the resource
    /// identity the rule applies to.
    pub fn set_rule(&self, resource: &Resource, rule: CircuitBreakerRule) -> crate::Result<()> {
        rule.is_valid()?;
        let key = RuleKey::for_rule(&rule, resource);
        let mut inner = self.inner.write().unwrap();
        let changed = inner.rules.get(&key) != Some(&rule);
        if changed {
            inner.rules.insert(key.clone(), rule);
            inner.breakers.remove(&key);
        }
        Ok(())
    }

    pub fn remove_rule(&self, resource: &Resource, level: Level) {
        let key = RuleKey::for_resource_at(resource, level);
        let mut inner = self.inner.write().unwrap();
        inner.rules.remove(&key);
        inner.breakers.remove(&key);
    }

    /// Resolves the most specific rule configured for `resource`, in
    /// `Method -> Service -> Subset -> Instance` order, and returns the
    /// breaker that enforces it, constructing one on first use.
    fn resolve(&self, resource: &Resource) -> Option<Arc<ResourceBreaker>> {
        let candidate_levels = [Level::Method, Level::Service, Level::Subset, Level::Instance];
        {
            let inner = self.inner.read().unwrap();
            for level in candidate_levels {
                let key = RuleKey::for_resource_at(resource, level);
                if let Some(breaker) = inner.breakers.get(&key) {
                    return Some(breaker.clone());
                }
            }
        }
        let mut inner = self.inner.write().unwrap();
        for level in candidate_levels {
            let key = RuleKey::for_resource_at(resource, level);
            if let Some(breaker) = inner.breakers.get(&key) {
                return Some(breaker.clone());
            }
            if let Some(rule) = inner.rules.get(&key).cloned() {
                let breaker = ResourceBreaker::new(rule, self.scheduler.clone(), self.clock.clone());
                inner.breakers.insert(key, breaker.clone());
                return Some(breaker);
            }
        }
        None
    }

    /// Feeds a sample to whichever breaker governs `stat.resource`, if any.
    /// A resource with no configured rule is silently ignored.
    pub fn report(&self, stat: ResourceStat) {
        if let Some(breaker) = self.resolve(&stat.resource) {
            breaker.report(stat);
        }
    }

    /// Pre-call admission check. A resource with no configured rule always
    /// passes.
    pub fn check(&self, resource: &Resource) -> CheckResult {
        match self.resolve(resource) {
            Some(breaker) => breaker.check(),
            None => CheckResult::Pass,
        }
    }

    /// `true` if `resource` currently has a tripped (non-`Closed`) breaker.
    /// Used by the router to exclude broken destinations.
    pub fn is_broken(&self, resource: &Resource) -> bool {
        match self.resolve(resource) {
            Some(breaker) => breaker.state() != State::Closed,
            None => false,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::core::circuitbreaker::clock::test::FakeClock;
    use crate::core::circuitbreaker::rule::{RecoverCondition, TriggerCondition};
    use crate::core::circuitbreaker::scheduler::TaskHandle;
    use crate::core::stat::ReturnStatus;

    struct NoopScheduler;
    impl Scheduler for NoopScheduler {
        fn schedule_once(&self, _delay_ms: u64, _task: Box<dyn FnOnce() + Send>) -> TaskHandle {
            TaskHandle::noop()
        }
    }

    fn rule(name: &str, level: Level, error_count: u32) -> CircuitBreakerRule {
        CircuitBreakerRule {
            rule_name: name.into(),
            level,
            triggers: vec![TriggerCondition::ConsecutiveError { error_count }],
            error_conditions: vec![],
            recover: RecoverCondition {
                sleep_window_secs: 1,
                consecutive_success_count: 1,
            },
            fallback: None,
        }
    }

    fn registry() -> BreakerRegistry {
        BreakerRegistry::new(Arc::new(NoopScheduler), Arc::new(FakeClock::new(0)))
    }

    #[test]
    fn unconfigured_resource_always_passes() {
        let reg = registry();
        let res = Resource::service("ns", "svc");
        assert!(reg.check(&res).is_pass());
    }

    #[test]
    fn constructs_breaker_on_first_report_and_trips() {
        let reg = registry();
        let res = Resource::service("ns", "svc");
        reg.set_rule(&res, rule("svc-rule", Level::Service, 2)).unwrap();

        reg.report(ResourceStat::new(res.clone(), ReturnStatus::Fail, 500, 5));
        assert!(reg.check(&res).is_pass());
        reg.report(ResourceStat::new(res.clone(), ReturnStatus::Fail, 500, 5));
        assert!(!reg.check(&res).is_pass());
        assert!(reg.is_broken(&res));
    }

    #[test]
    fn method_rule_takes_precedence_over_service_rule() {
        let reg = registry();
        let service_res = Resource::service("ns", "svc");
        let method_res = Resource::method("ns", "svc", "Get");
        reg.set_rule(&service_res, rule("svc-rule", Level::Service, 100))
            .unwrap();
        reg.set_rule(&method_res, rule("method-rule", Level::Method, 1))
            .unwrap();

        reg.report(ResourceStat::new(method_res.clone(), ReturnStatus::Fail, 500, 5));
        assert!(reg.is_broken(&method_res));
        // The service-level breaker is a distinct instance and unaffected.
        assert!(!reg.is_broken(&service_res));
    }

    #[test]
    fn replacing_a_rule_rebuilds_the_breaker_closed() {
        let reg = registry();
        let res = Resource::service("ns", "svc");
        reg.set_rule(&res, rule("svc-rule", Level::Service, 1)).unwrap();
        reg.report(ResourceStat::new(res.clone(), ReturnStatus::Fail, 500, 5));
        assert!(reg.is_broken(&res));

        reg.set_rule(&res, rule("svc-rule-v2", Level::Service, 1)).unwrap();
        assert!(!reg.is_broken(&res));
    }
}
