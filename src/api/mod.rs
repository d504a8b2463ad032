//! Convenience bootstrap wiring a [`crate::core::circuitbreaker::BreakerRegistry`]
//! and a [`crate::core::router::RuleRouter`] pair from a [`crate::config::MeshConfig`].
//! Using this module is optional: both collaborators can be constructed and
//! wired by hand, which a host application running several independent rule
//! sets will likely want to do instead.

mod init;

pub use init::{init_default, init_with_config, init_with_config_file, Mesh};
