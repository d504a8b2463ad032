//! Circuit breaker state machine: [`counter::TriggerCounter`]s aggregate raw
//! samples, [`breaker::ResourceBreaker`] drives the `Closed/Open/HalfOpen`
//! state machine for one resource, and [`registry::BreakerRegistry`] resolves
//! the right breaker for a resource and constructs it on first use.

pub mod breaker;
pub mod clock;
pub mod counter;
pub mod registry;
pub mod rule;
pub mod scheduler;

pub use breaker::{CheckResult, ResourceBreaker, State};
pub use clock::{Clock, SystemClock};
pub use counter::{TriggerCounter, TripHandler};
pub use registry::BreakerRegistry;
pub use rule::{
    CircuitBreakerRule, ErrorCondition, FallbackConfig, FallbackResponse, RecoverCondition,
    TriggerCondition,
};
pub use scheduler::{Scheduler, TaskHandle, ThreadScheduler};

/// A host-provided push stream of rule changes. This crate only defines the
/// seam; consuming a discovery protocol's rule feed and calling
/// `BreakerRegistry::set_rule`/`remove_rule` in response is left to the host
/// application.
pub trait RuleSource: Send + Sync {
    fn resource(&self) -> crate::core::resource::Resource;
    fn rule(&self) -> Option<rule::CircuitBreakerRule>;
}
