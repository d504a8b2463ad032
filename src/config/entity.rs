use super::constant::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Behavior when every routing rule fails to produce an instance list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailoverType {
    /// Return an empty instance list.
    None,
    /// Return the original, unfiltered instance list.
    All,
}

impl Default for FailoverType {
    fn default() -> Self {
        FailoverType::None
    }
}

/// `RouterConfig` holds the router-wide defaults described in the configuration table:
/// the default failover policy, whether the router is enabled at all, and the
/// substitution environment ($var resolution, multi-env propagation key).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub failover_type: FailoverType,
    pub enabled: bool,
    /// Key -> value map used for `$var` substitution in match strings.
    pub global_variables: HashMap<String, String>,
    /// Reserved metadata key propagated across multi-env routing.
    pub env_key: String,
}

impl Default for RouterConfig {
    fn default() -> Self {
        RouterConfig {
            failover_type: FailoverType::default(),
            enabled: true,
            global_variables: HashMap::new(),
            env_key: DEFAULT_ENV_KEY.into(),
        }
    }
}

/// `MeshConfig` is the top-level configuration entity for this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    pub router: RouterConfig,
}

impl Default for MeshConfig {
    fn default() -> Self {
        MeshConfig {
            router: RouterConfig::default(),
        }
    }
}

impl MeshConfig {
    pub fn new() -> Self {
        MeshConfig::default()
    }
}

impl fmt::Display for MeshConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fmtted = serde_json::to_string_pretty(self).unwrap();
        write!(f, "{}", fmtted)
    }
}
