// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeSet;
use std::path::PathBuf;

use awardref_core::env::{env_list, env_u64, env_usize};
use awardref_core::resolve_cache_dir;

use crate::retry::RetryPolicy;

pub const ENV_FETCH_MAX_ATTEMPTS: &str = "AWARDREF_FETCH_MAX_ATTEMPTS";
pub const ENV_FETCH_BACKOFF_MS: &str = "AWARDREF_FETCH_BACKOFF_MS";
pub const ENV_EVENT_CAPACITY: &str = "AWARDREF_EVENT_CAPACITY";
pub const ENV_ENABLED_DATASETS: &str = "AWARDREF_ENABLED_DATASETS";
pub const ENV_DISABLED_DATASETS: &str = "AWARDREF_DISABLED_DATASETS";

const STORE_FILE_NAME: &str = "lookup.sqlite";
const SNAPSHOT_DIR_NAME: &str = "snapshots";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub cache_root: PathBuf,
    pub fetch_retry: RetryPolicy,
    /// Buffered lifecycle events per subscriber before the slowest one lags.
    pub event_capacity: usize,
    /// Datasets loaded by `load_all` even when not enabled by default.
    pub enabled_datasets: BTreeSet<String>,
    /// Datasets skipped by `load_all`. Wins over `enabled_datasets`.
    pub disabled_datasets: BTreeSet<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_root: PathBuf::from(".awardref/cache"),
            fetch_retry: RetryPolicy::default(),
            event_capacity: 1024,
            enabled_datasets: BTreeSet::new(),
            disabled_datasets: BTreeSet::new(),
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cache_root: resolve_cache_dir(),
            fetch_retry: RetryPolicy {
                max_attempts: env_usize(
                    ENV_FETCH_MAX_ATTEMPTS,
                    defaults.fetch_retry.max_attempts,
                ),
                base_backoff_ms: env_u64(
                    ENV_FETCH_BACKOFF_MS,
                    defaults.fetch_retry.base_backoff_ms,
                ),
            },
            event_capacity: env_usize(ENV_EVENT_CAPACITY, defaults.event_capacity),
            enabled_datasets: env_list(ENV_ENABLED_DATASETS).into_iter().collect(),
            disabled_datasets: env_list(ENV_DISABLED_DATASETS).into_iter().collect(),
        }
    }

    #[must_use]
    pub fn with_cache_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.cache_root = root.into();
        self
    }

    #[must_use]
    pub fn store_path(&self) -> PathBuf {
        self.cache_root.join(STORE_FILE_NAME)
    }

    #[must_use]
    pub fn snapshot_dir(&self) -> PathBuf {
        self.cache_root.join(SNAPSHOT_DIR_NAME)
    }

    /// Whether `load_all` should load `key`, given the definition's own default.
    #[must_use]
    pub fn is_enabled(&self, key: &str, enabled_by_default: bool) -> bool {
        if self.disabled_datasets.contains(key) {
            return false;
        }
        enabled_by_default || self.enabled_datasets.contains(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_override_wins() {
        let mut cfg = EngineConfig::default();
        cfg.enabled_datasets.insert("wwff".to_string());
        cfg.disabled_datasets.insert("wwff".to_string());
        cfg.disabled_datasets.insert("pota".to_string());
        assert!(!cfg.is_enabled("wwff", true));
        assert!(!cfg.is_enabled("pota", true));
        assert!(cfg.is_enabled("sota", true));
    }

    #[test]
    fn enabled_override_turns_on_opt_in_datasets() {
        let mut cfg = EngineConfig::default();
        assert!(!cfg.is_enabled("mills", false));
        cfg.enabled_datasets.insert("mills".to_string());
        assert!(cfg.is_enabled("mills", false));
    }

    #[test]
    fn paths_live_under_cache_root() {
        let cfg = EngineConfig::default().with_cache_root("/tmp/awardref");
        assert_eq!(cfg.store_path(), PathBuf::from("/tmp/awardref/lookup.sqlite"));
        assert_eq!(cfg.snapshot_dir(), PathBuf::from("/tmp/awardref/snapshots"));
    }
}
