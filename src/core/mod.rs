/// Circuit breaker state machine: trigger counters, the per-resource breaker
/// and the registry that dispatches reports and checks to them.
pub mod circuitbreaker;
/// Resource identity shared by the breaker and the router.
pub mod resource;
/// Rule-based service router: label matching and priority/weight evaluation.
pub mod router;
/// The sample type reported to the circuit breaker.
pub mod stat;

pub use resource::*;
pub use stat::*;
