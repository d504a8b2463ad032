use crate::config::{self, MeshConfig};
use crate::core::circuitbreaker::{BreakerRegistry, Clock, Scheduler, SystemClock, ThreadScheduler};
use crate::core::router::RuleRouter;
use crate::logging;
use std::path::Path;
use std::sync::Arc;

/// A breaker registry and router wired to share one configuration, ready for
/// a host application to call `report`/`check`/`route` against. Returned by
/// the `init_*` family rather than constructed directly, since the two
/// collaborate (the router consults the registry to exclude broken subsets).
pub struct Mesh {
    pub breakers: Arc<BreakerRegistry>,
    pub router: Arc<RuleRouter>,
}

/// Initializes with default configuration, unless `MESH_BREAKER_CONFIG_FILE`
/// names a file to load instead. No circuit breaker or route rules are
/// installed either way - only the failover/enablement/variable defaults.
pub fn init_default() -> Mesh {
    if let Some(path) = config::config_file_from_env() {
        match init_with_config_file(&path) {
            Ok(mesh) => return mesh,
            Err(e) => logging::warn!(
                "[Api] failed to load configuration file {:?}: {}, falling back to defaults",
                path,
                e
            ),
        }
    }
    init_with_config(MeshConfig::default())
}

/// Initializes from an explicit configuration, installing it globally.
pub fn init_with_config(cfg: MeshConfig) -> Mesh {
    logging::logger_init();
    config::reset_global_config(cfg.clone());

    let scheduler: Arc<dyn Scheduler> = Arc::new(ThreadScheduler::new());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let breakers = Arc::new(BreakerRegistry::new(scheduler, clock));
    let router = Arc::new(RuleRouter::new(
        breakers.clone(),
        cfg.router.global_variables.clone(),
    ));

    logging::info!(
        "[Api] mesh initialized, router_enabled={}, failover={:?}",
        cfg.router.enabled,
        cfg.router.failover_type
    );
    Mesh { breakers, router }
}

/// Initializes from a YAML configuration file on disk.
pub fn init_with_config_file<P: AsRef<Path>>(path: P) -> crate::Result<Mesh> {
    config::load_config_from_yaml_file(path)?;
    Ok(init_with_config(config::current_config()))
}
