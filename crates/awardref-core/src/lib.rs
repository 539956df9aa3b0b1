// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

mod clock;
pub mod env;
mod error;

use std::path::PathBuf;

pub use clock::{unix_seconds, Clock, FixedClock, SystemClock};
pub use error::{
    EngineError, ErrorCode, FetchError, NotRegistered, ProcessError, SnapshotError, StoreError,
};

pub const CRATE_NAME: &str = "awardref-core";

pub const ENV_AWARDREF_LOG_LEVEL: &str = "AWARDREF_LOG_LEVEL";
pub const ENV_AWARDREF_CACHE_DIR: &str = "AWARDREF_CACHE_DIR";

/// Cache root for snapshots and the lookup database.
///
/// Resolution order: `AWARDREF_CACHE_DIR`, `XDG_CACHE_HOME/awardref`,
/// `HOME/.cache/awardref`, then `.awardref/cache` relative to the working directory.
#[must_use]
pub fn resolve_cache_dir() -> PathBuf {
    if let Ok(explicit) = std::env::var(ENV_AWARDREF_CACHE_DIR) {
        let trimmed = explicit.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }

    if let Ok(xdg_cache_home) = std::env::var("XDG_CACHE_HOME") {
        let trimmed = xdg_cache_home.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed).join("awardref");
        }
    }

    if let Ok(home) = std::env::var("HOME") {
        let trimmed = home.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed).join(".cache").join("awardref");
        }
    }

    PathBuf::from(".awardref").join("cache")
}
