// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Refresh progress after a committed chunk.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub processed: u64,
    pub total: u64,
    /// Fraction in `[0, 1]`.
    pub percent: f64,
    pub eta_seconds: f64,
}

impl Progress {
    /// Linear extrapolation of the remaining time from current throughput.
    #[must_use]
    pub fn compute(processed: u64, total: u64, elapsed: Duration) -> Self {
        let processed = processed.min(total);
        let percent = if total == 0 {
            1.0
        } else {
            processed as f64 / total as f64
        };
        let eta_seconds = if processed == 0 {
            0.0
        } else {
            let per_record = elapsed.as_secs_f64() / processed as f64;
            per_record * (total - processed) as f64
        };
        Self {
            processed,
            total,
            percent,
            eta_seconds,
        }
    }
}
