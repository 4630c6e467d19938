//! Engine-wide knobs that aren't part of any one scenario.

use std::time::Duration;

/// Default hard wait bound for the parallel scenario pool (§5).
pub static DEFAULT_POOL_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Engine-wide configuration, read from the environment with documented defaults.
/// There is no config file format; every knob here is process-level, not per-scenario.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Number of worker threads for the parallel scenario driver. Defaults to
    /// `std::thread::available_parallelism()`.
    pub worker_count: usize,
    /// Hard wait bound before the pool aborts outstanding scenarios.
    pub pool_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            pool_timeout: DEFAULT_POOL_TIMEOUT,
        }
    }
}

impl EngineConfig {
    /// Builds a config from environment variables, falling back to defaults for any
    /// unset or unparseable value.
    ///
    /// * `KIGALI_SIM_WORKERS` - worker thread count
    /// * `KIGALI_SIM_POOL_TIMEOUT_SECS` - pool hard wait bound, in seconds
    pub fn from_env() -> Self {
        let worker_count = std::env::var("KIGALI_SIM_WORKERS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|n| *n > 0)
            .unwrap_or_else(default_worker_count);

        let pool_timeout = std::env::var("KIGALI_SIM_POOL_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_POOL_TIMEOUT);

        Self {
            worker_count,
            pool_timeout,
        }
    }
}

fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Installs a `tracing` subscriber suitable for CLI/test use. A no-op if a global
/// subscriber is already installed (e.g. by a host application).
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_positive_worker_count() {
        assert!(EngineConfig::default().worker_count >= 1);
    }
}
