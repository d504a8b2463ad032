//! Ambient, process-wide configuration: the failover policy, router enablement
//! default, `$var` substitution table and the multi-env metadata key described
//! in the configuration table of the routing specification.
//!
//! Rule data itself (circuit breaker rules, routing rule sets) is *not*
//! configuration in this sense - it is pushed in by the host application
//! through [`crate::core::circuitbreaker::BreakerRegistry::set_rule`] and
//! [`crate::core::router::RuleRouter::load_rules`], and supplied per-call as
//! a [`crate::core::router::RouteRequest`].

mod constant;
mod entity;

pub use constant::*;
pub use entity::*;

use crate::{logging, Error, Result};
use std::fs::File;
use std::io::Read as _;
use std::path::Path;
use std::sync::RwLock;

lazy_static::lazy_static! {
    static ref GLOBAL_CONFIG: RwLock<MeshConfig> = RwLock::new(MeshConfig::default());
}

/// Replaces the global configuration wholesale.
pub fn reset_global_config(entity: MeshConfig) {
    *GLOBAL_CONFIG.write().unwrap() = entity;
}

/// Reads the configuration file path from the `MESH_BREAKER_CONFIG_FILE`
/// environment variable, if set.
pub fn config_file_from_env() -> Option<String> {
    std::env::var(CONFIG_FILENAME_ENV_KEY).ok()
}

/// Loads configuration from a YAML file and installs it globally.
pub fn load_config_from_yaml_file<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(Error::msg("configuration file does not exist"));
    }
    let mut file = File::open(path)?;
    let mut content = String::new();
    file.read_to_string(&mut content)?;
    let entity: MeshConfig = serde_yaml::from_str(&content)?;
    logging::info!("[Config] resolved configuration from file {:?}", path);
    reset_global_config(entity);
    Ok(())
}

/// A snapshot of the whole global configuration, for callers assembling a
/// [`crate::api::Mesh`] that need every field at once.
pub fn current_config() -> MeshConfig {
    GLOBAL_CONFIG.read().unwrap().clone()
}

pub fn failover_type() -> FailoverType {
    GLOBAL_CONFIG.read().unwrap().router.failover_type
}

pub fn router_enabled() -> bool {
    GLOBAL_CONFIG.read().unwrap().router.enabled
}

pub fn global_variable(key: &str) -> Option<String> {
    GLOBAL_CONFIG
        .read()
        .unwrap()
        .router
        .global_variables
        .get(key)
        .cloned()
}

pub fn env_key() -> String {
    GLOBAL_CONFIG.read().unwrap().router.env_key.clone()
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults() {
        reset_global_config(MeshConfig::default());
        assert_eq!(failover_type(), FailoverType::None);
        assert!(router_enabled());
        assert_eq!(env_key(), DEFAULT_ENV_KEY);
    }

    #[test]
    fn global_variables_roundtrip() {
        let mut cfg = MeshConfig::default();
        let mut vars = HashMap::new();
        vars.insert("region".to_string(), "west".to_string());
        cfg.router.global_variables = vars;
        reset_global_config(cfg);
        assert_eq!(global_variable("region"), Some("west".to_string()));
        assert_eq!(global_variable("missing"), None);
        reset_global_config(MeshConfig::default());
    }
}
