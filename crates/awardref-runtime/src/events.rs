// SPDX-License-Identifier: Apache-2.0

use awardref_model::{LifecycleState, Progress};
use serde::{Deserialize, Serialize};

/// Message on the lifecycle broadcast channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LifecycleEvent {
    Progress {
        key: String,
        processed: u64,
        total: u64,
        percent: f64,
        eta_seconds: f64,
    },
    StateChanged {
        key: String,
        state: LifecycleState,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl LifecycleEvent {
    #[must_use]
    pub fn progress(key: &str, progress: &Progress) -> Self {
        Self::Progress {
            key: key.to_string(),
            processed: progress.processed,
            total: progress.total,
            percent: progress.percent,
            eta_seconds: progress.eta_seconds,
        }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Progress { key, .. } | Self::StateChanged { key, .. } => key,
        }
    }
}
