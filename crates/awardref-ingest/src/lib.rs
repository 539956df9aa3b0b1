// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

mod delimited;
mod job;
mod logging;
mod normalize;
mod payload;

pub use delimited::{DelimitedFormat, HeaderMode};
pub use job::{
    run_to_completion, RecordNormalizer, RefreshJob, RefreshOptions, RefreshOutcome, Tick,
    DEFAULT_CHUNK_SIZE,
};
pub use logging::{IngestEvent, IngestLog, IngestStage};
pub use normalize::FieldRoles;
pub use payload::{parse_json_records, Payload, RawRecord};

pub const CRATE_NAME: &str = "awardref-ingest";
