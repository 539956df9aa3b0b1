// SPDX-License-Identifier: Apache-2.0

use std::time::Instant;

use awardref_core::{EngineError, ProcessError};
use awardref_model::{LookupRecord, Progress, RecordDraft, RefreshSummary};
use awardref_store::LookupStore;
use tracing::{debug, info, warn};

use crate::logging::{fields, IngestEvent, IngestLog, IngestStage};
use crate::payload::{Payload, RawRecord};

pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// Turns one raw source record into a draft row, or `None` to skip it.
pub trait RecordNormalizer {
    fn normalize(&self, raw: &RawRecord) -> Result<Option<RecordDraft>, ProcessError>;
}

impl<F> RecordNormalizer for F
where
    F: Fn(&RawRecord) -> Result<Option<RecordDraft>, ProcessError>,
{
    fn normalize(&self, raw: &RawRecord) -> Result<Option<RecordDraft>, ProcessError> {
        self(raw)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshOptions {
    pub chunk_size: usize,
    /// Version used when the payload does not carry one.
    pub fallback_version: String,
    /// An empty payload would sweep the whole category away; refuse it unless set.
    pub allow_empty: bool,
}

impl Default for RefreshOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            fallback_version: awardref_core::unix_seconds(std::time::SystemTime::now())
                .to_string(),
            allow_empty: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RefreshOutcome {
    pub summary: RefreshSummary,
    pub skipped: u64,
    pub deleted: u64,
    pub events: Vec<IngestEvent>,
}

/// What one [`RefreshJob::tick`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum Tick {
    /// Sweep marks of the category were cleared.
    SweepStarted { flagged: u64 },
    /// One chunk was committed.
    Batch(Progress),
    /// Unmarked rows were deleted; the job is finished.
    Complete(RefreshOutcome),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Pending,
    Batches,
    Finished,
    Failed,
}

/// A mark-and-sweep refresh of one category, advanced one unit of work per
/// [`tick`](RefreshJob::tick).
///
/// The first tick clears every sweep mark of the category, each following
/// tick normalizes and upserts one chunk in its own transaction, and the
/// final tick deletes rows that were not re-marked. Callers yield to their
/// scheduler between ticks; the store is consistent and queryable at every
/// tick boundary. If a tick fails the job stops: committed chunks stay and
/// nothing is deleted.
#[derive(Debug)]
pub struct RefreshJob {
    category: String,
    records: Vec<RawRecord>,
    version: String,
    chunk_size: usize,
    allow_empty: bool,
    cursor: usize,
    upserted: u64,
    skipped: u64,
    started: Instant,
    phase: Phase,
    log: IngestLog,
}

impl RefreshJob {
    #[must_use]
    pub fn new(category: impl Into<String>, payload: Payload, options: RefreshOptions) -> Self {
        let category = category.into();
        let version = payload
            .version
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(options.fallback_version);
        let mut log = IngestLog::default();
        log.emit(
            IngestStage::Prepare,
            "refresh.prepare",
            fields([
                ("category", category.clone()),
                ("records", payload.records.len().to_string()),
                ("version", version.clone()),
            ]),
        );
        Self {
            category,
            records: payload.records,
            version,
            chunk_size: options.chunk_size.max(1),
            allow_empty: options.allow_empty,
            cursor: 0,
            upserted: 0,
            skipped: 0,
            started: Instant::now(),
            phase: Phase::Pending,
            log,
        }
    }

    #[must_use]
    pub fn category(&self) -> &str {
        &self.category
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.records.len() as u64
    }

    /// Number of batch ticks this job will perform.
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.records.len().div_ceil(self.chunk_size)
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        matches!(self.phase, Phase::Finished | Phase::Failed)
    }

    pub fn tick(
        &mut self,
        store: &mut LookupStore,
        normalizer: &dyn RecordNormalizer,
    ) -> Result<Tick, EngineError> {
        let result = match self.phase {
            Phase::Pending => self.start(store),
            Phase::Batches if self.cursor < self.records.len() => {
                self.run_batch(store, normalizer)
            }
            Phase::Batches => self.finish(store),
            Phase::Finished | Phase::Failed => {
                return Err(EngineError::Process(ProcessError(format!(
                    "refresh of `{}` already ended",
                    self.category
                ))))
            }
        };
        if let Err(err) = &result {
            self.phase = Phase::Failed;
            warn!(
                category = %self.category,
                processed = self.cursor,
                error = %err,
                "refresh aborted; committed batches kept, sweep skipped"
            );
        }
        result
    }

    fn start(&mut self, store: &mut LookupStore) -> Result<Tick, EngineError> {
        if self.records.is_empty() && !self.allow_empty {
            return Err(EngineError::Process(ProcessError(format!(
                "payload for `{}` contained no records",
                self.category
            ))));
        }
        self.started = Instant::now();
        let flagged = store.begin_sweep(&self.category)? as u64;
        self.log.emit(
            IngestStage::SweepStart,
            "refresh.sweep_start",
            fields([("flagged", flagged.to_string())]),
        );
        self.phase = Phase::Batches;
        Ok(Tick::SweepStarted { flagged })
    }

    fn run_batch(
        &mut self,
        store: &mut LookupStore,
        normalizer: &dyn RecordNormalizer,
    ) -> Result<Tick, EngineError> {
        let end = (self.cursor + self.chunk_size).min(self.records.len());
        let mut batch: Vec<LookupRecord> = Vec::with_capacity(end - self.cursor);
        let mut skipped = 0_u64;
        for (offset, raw) in self.records[self.cursor..end].iter().enumerate() {
            let draft = normalizer.normalize(raw).map_err(|e| {
                ProcessError(format!("record {}: {}", self.cursor + offset + 1, e.0))
            })?;
            match draft {
                Some(draft) => batch.push(draft.into_record(&self.category)),
                None => skipped += 1,
            }
        }
        let written = store.upsert_batch(&batch)? as u64;
        self.upserted += written;
        self.skipped += skipped;
        self.cursor = end;

        let progress = Progress::compute(self.cursor as u64, self.total(), self.started.elapsed());
        debug!(
            category = %self.category,
            processed = progress.processed,
            total = progress.total,
            "refresh batch committed"
        );
        self.log.emit(
            IngestStage::Batch,
            "refresh.batch",
            fields([
                ("processed", progress.processed.to_string()),
                ("written", written.to_string()),
                ("skipped", skipped.to_string()),
            ]),
        );
        Ok(Tick::Batch(progress))
    }

    fn finish(&mut self, store: &mut LookupStore) -> Result<Tick, EngineError> {
        let deleted = store.finish_sweep(&self.category)? as u64;
        self.log.emit(
            IngestStage::SweepEnd,
            "refresh.sweep_end",
            fields([("deleted", deleted.to_string())]),
        );
        self.log.emit(
            IngestStage::Finalize,
            "refresh.complete",
            fields([
                ("count", self.upserted.to_string()),
                ("version", self.version.clone()),
            ]),
        );
        self.phase = Phase::Finished;
        info!(
            category = %self.category,
            count = self.upserted,
            skipped = self.skipped,
            deleted,
            version = %self.version,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "refresh complete"
        );
        Ok(Tick::Complete(RefreshOutcome {
            summary: RefreshSummary {
                count: self.upserted,
                version: self.version.clone(),
            },
            skipped: self.skipped,
            deleted,
            events: self.log.events().to_vec(),
        }))
    }
}

/// Drives `job` to the end on the current thread, reporting progress after
/// every committed chunk.
pub fn run_to_completion(
    mut job: RefreshJob,
    store: &mut LookupStore,
    normalizer: &dyn RecordNormalizer,
    on_progress: &mut dyn FnMut(&Progress),
) -> Result<RefreshOutcome, EngineError> {
    loop {
        match job.tick(store, normalizer)? {
            Tick::SweepStarted { .. } => {}
            Tick::Batch(progress) => on_progress(&progress),
            Tick::Complete(outcome) => return Ok(outcome),
        }
    }
}
