// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use async_trait::async_trait;
use awardref_core::{FetchError, ProcessError};
use awardref_ingest::{
    parse_json_records, DelimitedFormat, FieldRoles, Payload, RawRecord, RecordNormalizer,
    DEFAULT_CHUNK_SIZE,
};
use awardref_model::{DatasetKey, DatasetSnapshot, RecordDraft};

use crate::source::PayloadSource;

/// One remote reference dataset: where it comes from, how its payload is
/// parsed and normalized, and how stale it may get.
///
/// The engine owns the refresh itself; a definition supplies only the parts
/// specific to its source format.
#[async_trait]
pub trait DatasetDefinition: Send + Sync + 'static {
    fn key(&self) -> &DatasetKey;

    fn name(&self) -> &str;

    /// A local snapshot older than this many days triggers a background fetch.
    fn max_age_days(&self) -> u64;

    fn enabled_by_default(&self) -> bool {
        true
    }

    async fn fetch(&self) -> Result<Vec<u8>, FetchError>;

    fn parse(&self, raw: &[u8]) -> Result<Payload, ProcessError>;

    fn normalize(&self, raw: &RawRecord) -> Result<Option<RecordDraft>, ProcessError>;

    fn chunk_size(&self) -> usize {
        DEFAULT_CHUNK_SIZE
    }

    /// Called after every successful fetch or read with the persisted summary.
    fn on_load(&self, _snapshot: &DatasetSnapshot) {}

    /// Called before the dataset's rows are dropped from the store.
    fn on_remove(&self) {}
}

/// Borrowed view of a definition as a pipeline normalizer.
pub(crate) struct DefinitionNormalizer<'a>(pub(crate) &'a dyn DatasetDefinition);

impl RecordNormalizer for DefinitionNormalizer<'_> {
    fn normalize(&self, raw: &RawRecord) -> Result<Option<RecordDraft>, ProcessError> {
        self.0.normalize(raw)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadFormat {
    Delimited(DelimitedFormat),
    /// A JSON array of flat objects, or `{"version": .., "records": [..]}`.
    JsonRecords,
}

impl PayloadFormat {
    pub fn parse(&self, raw: &[u8]) -> Result<Payload, ProcessError> {
        match self {
            Self::Delimited(format) => format.parse_bytes(raw),
            Self::JsonRecords => parse_json_records(raw),
        }
    }
}

/// A definition whose rows map column-for-column onto lookup records.
/// Covers most award lists; datasets with bespoke rules implement
/// [`DatasetDefinition`] directly.
pub struct MappedDataset {
    key: DatasetKey,
    name: String,
    max_age_days: u64,
    enabled_by_default: bool,
    chunk_size: usize,
    format: PayloadFormat,
    roles: FieldRoles,
    source: Arc<dyn PayloadSource>,
}

impl MappedDataset {
    #[must_use]
    pub fn new(key: DatasetKey, name: impl Into<String>, source: Arc<dyn PayloadSource>) -> Self {
        Self {
            key,
            name: name.into(),
            max_age_days: 30,
            enabled_by_default: true,
            chunk_size: DEFAULT_CHUNK_SIZE,
            format: PayloadFormat::Delimited(DelimitedFormat::default()),
            roles: FieldRoles::default(),
            source,
        }
    }

    #[must_use]
    pub fn with_format(mut self, format: PayloadFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_roles(mut self, roles: FieldRoles) -> Self {
        self.roles = roles;
        self
    }

    #[must_use]
    pub fn with_max_age_days(mut self, days: u64) -> Self {
        self.max_age_days = days;
        self
    }

    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    #[must_use]
    pub fn enabled_by_default(mut self, enabled: bool) -> Self {
        self.enabled_by_default = enabled;
        self
    }
}

#[async_trait]
impl DatasetDefinition for MappedDataset {
    fn key(&self) -> &DatasetKey {
        &self.key
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn max_age_days(&self) -> u64 {
        self.max_age_days
    }

    fn enabled_by_default(&self) -> bool {
        self.enabled_by_default
    }

    async fn fetch(&self) -> Result<Vec<u8>, FetchError> {
        self.source.fetch().await
    }

    fn parse(&self, raw: &[u8]) -> Result<Payload, ProcessError> {
        self.format.parse(raw)
    }

    fn normalize(&self, raw: &RawRecord) -> Result<Option<RecordDraft>, ProcessError> {
        self.roles.normalize(raw)
    }

    fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;

    fn key(raw: &str) -> DatasetKey {
        DatasetKey::parse(raw).expect("key")
    }

    #[tokio::test]
    async fn mapped_dataset_parses_and_normalizes_through_its_format() {
        let source = Arc::new(MemorySource::new("ref;title;grid\nSP-001;Sniezka;JO70se\n"));
        let format = DelimitedFormat {
            delimiter: ';',
            ..DelimitedFormat::default()
        }
        .map_field("title", "name");
        let dataset = MappedDataset::new(key("sota-sp"), "SOTA Poland", source)
            .with_format(PayloadFormat::Delimited(format))
            .with_max_age_days(7);

        let raw = dataset.fetch().await.expect("fetch");
        let payload = dataset.parse(&raw).expect("parse");
        assert_eq!(payload.records.len(), 1);
        let draft = dataset
            .normalize(&payload.records[0])
            .expect("normalize")
            .expect("row kept");
        assert_eq!(draft.key, "SP-001");
        assert_eq!(draft.name, "Sniezka");
        assert!(draft.lat.is_some());
        assert_eq!(dataset.max_age_days(), 7);
        assert!(DatasetDefinition::enabled_by_default(&dataset));
    }

    #[test]
    fn json_records_format_reads_versioned_envelopes() {
        let payload = PayloadFormat::JsonRecords
            .parse(br#"{"version":"2024.1","records":[{"ref":"K-0001","name":"Acadia"}]}"#)
            .expect("parse");
        assert_eq!(payload.version.as_deref(), Some("2024.1"));
        assert_eq!(payload.records[0].get("name"), Some("Acadia"));
    }
}
