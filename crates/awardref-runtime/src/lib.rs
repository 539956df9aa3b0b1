// SPDX-License-Identifier: Apache-2.0

//! Registry and lifecycle orchestration for award reference datasets.
//!
//! A [`DatasetDefinition`] describes one remote dataset. The
//! [`LifecycleManager`] loads it from a local snapshot or fetches and
//! refreshes it into the shared lookup store, publishing progress on a
//! broadcast channel.

#![forbid(unsafe_code)]

mod config;
mod definition;
mod events;
mod lifecycle;
mod registry;
mod retry;
mod snapshot;
mod source;

pub use config::{
    EngineConfig, ENV_DISABLED_DATASETS, ENV_ENABLED_DATASETS, ENV_EVENT_CAPACITY,
    ENV_FETCH_BACKOFF_MS, ENV_FETCH_MAX_ATTEMPTS,
};
pub use definition::{DatasetDefinition, MappedDataset, PayloadFormat};
pub use events::LifecycleEvent;
pub use lifecycle::{LifecycleManager, LoadOptions, LoadOutcome};
pub use registry::{DatasetRegistry, SharedStore};
pub use retry::{BackoffPolicy, RetryPolicy};
pub use snapshot::{read_snapshot, snapshot_path};
pub use source::{FileSource, MemorySource, PayloadSource};

pub const CRATE_NAME: &str = "awardref-runtime";
