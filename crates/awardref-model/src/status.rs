// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Ready,
    Fetching,
    Loading,
    Loaded,
    Error,
}

impl LifecycleState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Fetching => "fetching",
            Self::Loading => "loading",
            Self::Loaded => "loaded",
            Self::Error => "error",
        }
    }
}

/// Per-dataset lifecycle record, created on first load and dropped on remove.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetStatus {
    pub state: LifecycleState,
    pub version: Option<String>,
    pub last_refreshed_at: Option<u64>,
    pub last_error: Option<String>,
}

impl Default for DatasetStatus {
    fn default() -> Self {
        Self {
            state: LifecycleState::Ready,
            version: None,
            last_refreshed_at: None,
            last_error: None,
        }
    }
}

/// Result of one refresh: rows upserted and the payload version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshSummary {
    pub count: u64,
    pub version: String,
}

/// Persisted per-dataset summary. Only `version` and `refreshed_at` are
/// interpreted by the engine; the file's modification time drives staleness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatasetSnapshot {
    pub key: String,
    pub name: String,
    pub version: String,
    pub count: u64,
    pub refreshed_at: u64,
}

impl DatasetSnapshot {
    #[must_use]
    pub fn summary(&self) -> RefreshSummary {
        RefreshSummary {
            count: self.count,
            version: self.version.clone(),
        }
    }
}
