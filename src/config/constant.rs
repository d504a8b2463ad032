pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Environment variable carrying the metadata key propagated across multi-env routing.
pub const DEFAULT_ENV_KEY: &str = "internal-env";

pub const CONFIG_FILENAME_ENV_KEY: &str = "MESH_BREAKER_CONFIG_FILE";
