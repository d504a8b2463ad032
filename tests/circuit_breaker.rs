use mesh_breaker::core::circuitbreaker::{
    BreakerRegistry, CircuitBreakerRule, RecoverCondition, TriggerCondition,
};
use mesh_breaker::core::resource::{Level, Resource};
use mesh_breaker::core::stat::{ResourceStat, ReturnStatus};
use std::sync::Arc;
use std::thread;

fn svc() -> Resource {
    Resource::service("default", "billing")
}

#[test]
fn trips_open_then_recovers_through_half_open() {
    let registry = BreakerRegistry::default();
    registry
        .set_rule(
            &svc(),
            CircuitBreakerRule {
                rule_name: "billing-breaker".into(),
                level: Level::Service,
                triggers: vec![TriggerCondition::ConsecutiveError { error_count: 5 }],
                error_conditions: vec![],
                recover: RecoverCondition {
                    sleep_window_secs: 1,
                    consecutive_success_count: 2,
                },
                fallback: None,
            },
        )
        .unwrap();

    assert!(registry.check(&svc()).is_pass());

    for _ in 0..5 {
        registry.report(ResourceStat::new(svc(), ReturnStatus::Fail, 500, 10));
    }
    assert!(registry.is_broken(&svc()));
    assert!(!registry.check(&svc()).is_pass());

    // Give the scheduled Open -> HalfOpen timer time to fire.
    thread::sleep(std::time::Duration::from_millis(1200));
    assert!(registry.check(&svc()).is_pass());

    registry.report(ResourceStat::new(svc(), ReturnStatus::Success, 0, 5));
    registry.report(ResourceStat::new(svc(), ReturnStatus::Success, 0, 5));
    assert!(!registry.is_broken(&svc()));
}

#[test]
fn concurrent_reports_trip_exactly_once() {
    let registry = Arc::new(BreakerRegistry::default());
    registry
        .set_rule(
            &svc(),
            CircuitBreakerRule {
                rule_name: "billing-breaker".into(),
                level: Level::Service,
                triggers: vec![TriggerCondition::ConsecutiveError { error_count: 50 }],
                error_conditions: vec![],
                recover: RecoverCondition {
                    sleep_window_secs: 60,
                    consecutive_success_count: 1,
                },
                fallback: None,
            },
        )
        .unwrap();

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let registry = registry.clone();
            thread::spawn(move || {
                for _ in 0..10 {
                    registry.report(ResourceStat::new(svc(), ReturnStatus::Fail, 500, 5));
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert!(registry.is_broken(&svc()));
    assert!(!registry.check(&svc()).is_pass());
}

#[test]
fn unconfigured_resources_are_never_broken() {
    let registry = BreakerRegistry::default();
    let other = Resource::service("default", "untouched");
    assert!(!registry.is_broken(&other));
    assert!(registry.check(&other).is_pass());
}
