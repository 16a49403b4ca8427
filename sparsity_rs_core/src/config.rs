//! Process-wide knobs of the engine.
//!
//! Nothing here changes the semantics of an operation, only how (and where) it runs.

use std::{env, sync::OnceLock};

use crate::io::TimeUnit;

/// Environment variable that overrides [`SparsityConfig::num_threads`].
pub const NUM_THREADS_ENV: &str = "SPARSITY_NUM_THREADS";

#[derive(Debug, Clone)]
pub struct SparsityConfig {
    /// Number of worker threads used by the threaded scheduler and by the parallel
    /// aggregation helpers. `0` lets rayon pick (usually the number of logical cores).
    pub num_threads: usize,

    /// File name under which a persisted vocabulary is stored when a directory is given.
    pub vocabulary_file: &'static str,

    /// Unit of the integer timestamps returned by the event-log reader.
    pub ts_unit: TimeUnit,
}

impl Default for SparsityConfig {
    fn default() -> Self {
        SparsityConfig {
            num_threads: 0,
            vocabulary_file: "df.vocab",
            ts_unit: TimeUnit::Seconds,
        }
    }
}

impl SparsityConfig {
    /// Default config, with `SPARSITY_NUM_THREADS` applied when set to a valid number.
    pub fn from_env() -> Self {
        let mut config = SparsityConfig::default();
        if let Some(n) = env::var(NUM_THREADS_ENV)
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
        {
            config.num_threads = n;
        }
        config
    }

    /// Return the global config, resolved from the environment on first use.
    pub fn global() -> &'static SparsityConfig {
        static GLOBAL: OnceLock<SparsityConfig> = OnceLock::new();
        GLOBAL.get_or_init(SparsityConfig::from_env)
    }
}
