//! Process-wide tuning knobs.
//!
//! Values come from the environment on first use and can be replaced at
//! runtime with [`set`].

use lazy_static::lazy_static;
use parking_lot::RwLock;
use tracing::warn;

pub const PARALLEL_SORT_THRESHOLD_ENV: &str = "ROWVIEW_PARALLEL_SORT_THRESHOLD";
pub const INITIAL_VIEW_CAPACITY_ENV: &str = "ROWVIEW_INITIAL_VIEW_CAPACITY";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewConfig {
    /// Views with at least this many entries are sorted with rayon when the
    /// `parallel` feature is enabled.
    pub parallel_sort_threshold: usize,
    /// Capacity reserved for a view's row references before a query runs.
    pub initial_view_capacity: usize,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            parallel_sort_threshold: 4096,
            initial_view_capacity: 16,
        }
    }
}

impl ViewConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            parallel_sort_threshold: env_usize(
                PARALLEL_SORT_THRESHOLD_ENV,
                defaults.parallel_sort_threshold,
            ),
            initial_view_capacity: env_usize(
                INITIAL_VIEW_CAPACITY_ENV,
                defaults.initial_view_capacity,
            ),
        }
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, default, "Ignoring unparsable config value");
            default
        }),
        Err(_) => default,
    }
}

lazy_static! {
    static ref CONFIG: RwLock<ViewConfig> = RwLock::new(ViewConfig::from_env());
}

/// Snapshot of the active configuration.
pub fn get() -> ViewConfig {
    CONFIG.read().clone()
}

/// Replace the active configuration.
pub fn set(config: ViewConfig) {
    *CONFIG.write() = config;
}

#[cfg(test)]
mod config_tests {
    use super::*;

    #[test]
    fn test_defaults_when_env_missing() {
        let value = env_usize("ROWVIEW_TEST_SURELY_UNSET_KEY", 7);
        assert_eq!(value, 7);
    }

    #[test]
    fn test_unparsable_value_falls_back() {
        std::env::set_var("ROWVIEW_TEST_BAD_VALUE", "many");
        assert_eq!(env_usize("ROWVIEW_TEST_BAD_VALUE", 3), 3);
        std::env::set_var("ROWVIEW_TEST_GOOD_VALUE", " 42 ");
        assert_eq!(env_usize("ROWVIEW_TEST_GOOD_VALUE", 3), 42);
    }
}
