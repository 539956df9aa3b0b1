// SPDX-License-Identifier: Apache-2.0

//! Environment lookups with typed defaults.

use std::env;

#[must_use]
pub fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

#[must_use]
pub fn env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

/// Comma separated list, trimmed, empty items dropped.
#[must_use]
pub fn env_list(name: &str) -> Vec<String> {
    split_list(&env::var(name).unwrap_or_default())
}

#[must_use]
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}
