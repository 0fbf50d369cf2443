//! Pool configuration with compile-time defaults and environment overrides.
//!
//! Grounded on `gvthread-runtime/src/config/mod.rs`'s `SchedulerConfig`:
//! a plain struct populated by `from_env()`, with builder methods for
//! programmatic overrides.

use workpool_core::env::env_get_bool;
use workpool_core::env::env_get;

mod defaults {
    pub const QUEUE_CAPACITY: usize = 256;
    pub const DROP_ON_SATURATION: bool = false;
}

/// Configuration for `WorkPool::create`.
///
/// # Environment variables (all optional)
///
/// - `WORKPOOL_NUM_WORKERS` — worker thread count (default:
///   `std::thread::available_parallelism()`, or 4 if unavailable)
/// - `WORKPOOL_QUEUE_CAPACITY` — worklist ring capacity (default 256)
/// - `WORKPOOL_DROP_ON_SATURATION` — return `Busy` instead of blocking
///   when a saturation episode's concurrency is reached (default off)
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub num_workers: usize,
    pub queue_capacity: usize,
    pub drop_on_saturation: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl PoolConfig {
    /// Library defaults with environment-variable overrides applied.
    pub fn from_env() -> Self {
        let default_workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self {
            num_workers: env_get("WORKPOOL_NUM_WORKERS", default_workers),
            queue_capacity: env_get("WORKPOOL_QUEUE_CAPACITY", defaults::QUEUE_CAPACITY),
            drop_on_saturation: env_get_bool(
                "WORKPOOL_DROP_ON_SATURATION",
                defaults::DROP_ON_SATURATION,
            ),
        }
    }

    /// Library defaults, ignoring the environment. Useful for tests.
    pub fn new() -> Self {
        Self {
            num_workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            queue_capacity: defaults::QUEUE_CAPACITY,
            drop_on_saturation: defaults::DROP_ON_SATURATION,
        }
    }

    pub fn num_workers(mut self, n: usize) -> Self {
        self.num_workers = n;
        self
    }

    pub fn queue_capacity(mut self, n: usize) -> Self {
        self.queue_capacity = n;
        self
    }

    pub fn drop_on_saturation(mut self, enabled: bool) -> Self {
        self.drop_on_saturation = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_apply() {
        let cfg = PoolConfig::new().num_workers(3).queue_capacity(16);
        assert_eq!(cfg.num_workers, 3);
        assert_eq!(cfg.queue_capacity, 16);
    }

    #[test]
    fn env_override_applies() {
        std::env::set_var("WORKPOOL_QUEUE_CAPACITY", "99");
        let cfg = PoolConfig::from_env();
        assert_eq!(cfg.queue_capacity, 99);
        std::env::remove_var("WORKPOOL_QUEUE_CAPACITY");
    }
}
