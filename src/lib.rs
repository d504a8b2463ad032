//! # mesh-breaker
//!
//! A client-side traffic management library for service meshes: a per-resource
//! **circuit breaker** state machine and a **rule-based service router** that
//! consults the breaker before handing back candidate instances.
//!
//! The two subsystems cooperate but are independently usable:
//!
//! - [`core::circuitbreaker`] aggregates success/failure samples per resource and
//!   transitions a state machine between `Closed`, `Open` and `HalfOpen`.
//! - [`core::router`] evaluates inbound/outbound routing rules over a candidate
//!   instance list, builds priority/weight destination groups and excludes
//!   destinations whose subset is presently tripped.
//!
//! ## Example
//!
//! ```rust
//! use mesh_breaker::core::circuitbreaker::BreakerRegistry;
//! use mesh_breaker::core::{Resource, ResourceStat, ReturnStatus};
//!
//! let registry = BreakerRegistry::default();
//! registry.report(ResourceStat::new(
//!     Resource::service("default", "echo"),
//!     ReturnStatus::Success,
//!     0,
//!     5,
//! ));
//! let result = registry.check(&Resource::service("default", "echo"));
//! assert!(result.is_pass());
//! ```
//!
//! Discovery transport, configuration file parsing, plugin registration and
//! metrics export are treated as external collaborators and are out of scope
//! for this crate; see [`core::circuitbreaker::Scheduler`],
//! [`core::circuitbreaker::Clock`] and [`core::circuitbreaker::RuleSource`] for
//! the narrow seams this crate expects a host application to provide.

/// Core implementations: resources, circuit breaker state machine and rule router.
pub mod core;
/// Ambient runtime configuration (failover policy, global variables, env key).
pub mod config;
/// Logging adapter, mirroring the host application's chosen logging backend.
pub mod logging;
/// Small utility helpers (time source, string helpers).
pub mod utils;
/// Convenience wiring to bootstrap a [`core::circuitbreaker::BreakerRegistry`]
/// and [`core::router::RuleRouter`] pair from a [`config::MeshConfig`].
pub mod api;

pub use crate::core::*;
pub use api::*;

pub type Result<T> = anyhow::Result<T>;
pub type Error = anyhow::Error;
