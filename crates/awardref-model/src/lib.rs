// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

mod dataset;
mod locator;
mod progress;
mod record;
mod status;

pub use dataset::{parse_dataset_key, DatasetKey, ValidationError, DATASET_KEY_MAX_LEN};
pub use locator::{locator_to_lat_lon, lat_lon_to_locator, LocatorPrecision};
pub use progress::Progress;
pub use record::{LookupRecord, RecordDraft};
pub use status::{DatasetSnapshot, DatasetStatus, LifecycleState, RefreshSummary};

pub const CRATE_NAME: &str = "awardref-model";
