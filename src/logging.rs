use cfg_if::cfg_if;
pub use log::{debug, error, info, trace, warn};

cfg_if! {
    if #[cfg(feature = "logger_env")] {
        use crate::config::DEFAULT_LOG_LEVEL;

        fn init_env_logger() {
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(DEFAULT_LOG_LEVEL))
                .init();
        }

        /// Initializes the process-wide logger. Safe to call more than once;
        /// later calls are no-ops (the underlying `log` facade only accepts one).
        pub fn logger_init() {
            init_env_logger();
        }
    } else {
        /// Initializes the process-wide logger. With no logging backend feature
        /// enabled, the host application is expected to have installed its own
        /// `log::Log` implementation before using this crate.
        pub fn logger_init() {}
    }
}
