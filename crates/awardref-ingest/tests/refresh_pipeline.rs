// SPDX-License-Identifier: Apache-2.0

use std::cell::Cell;

use awardref_core::{EngineError, ProcessError};
use awardref_ingest::{
    run_to_completion, FieldRoles, IngestStage, Payload, RawRecord, RecordNormalizer, RefreshJob,
    RefreshOptions, Tick,
};
use awardref_model::{LookupRecord, Progress, RecordDraft};
use awardref_store::LookupStore;

fn payload(keys: impl IntoIterator<Item = usize>, label: &str) -> Payload {
    Payload {
        version: Some(format!("v-{label}")),
        records: keys
            .into_iter()
            .map(|i| {
                RawRecord::from_pairs([
                    ("ref".to_string(), format!("K-{i:05}")),
                    ("name".to_string(), format!("Park {i} {label}")),
                    ("lat".to_string(), format!("{}", 40.0 + (i % 100) as f64 / 100.0)),
                    ("lon".to_string(), format!("{}", -70.0 - (i % 50) as f64 / 50.0)),
                ])
            })
            .collect(),
    }
}

fn options(chunk_size: usize) -> RefreshOptions {
    RefreshOptions {
        chunk_size,
        fallback_version: "fallback".to_string(),
        allow_empty: false,
    }
}

fn all_rows(store: &LookupStore, category: &str) -> Vec<LookupRecord> {
    store.find_all_by_text(category, None, "")
}

fn refresh(
    store: &mut LookupStore,
    payload: Payload,
    chunk_size: usize,
    progress: &mut Vec<Progress>,
) -> Result<awardref_ingest::RefreshOutcome, EngineError> {
    let job = RefreshJob::new("pota", payload, options(chunk_size));
    run_to_completion(job, store, &FieldRoles::default(), &mut |p: &Progress| {
        progress.push(*p)
    })
}

#[test]
fn ten_thousand_records_in_chunks_of_500_report_twenty_times() {
    let mut store = LookupStore::open_in_memory().expect("store");
    let mut progress = Vec::new();
    let outcome = refresh(&mut store, payload(0..10_000, "a"), 500, &mut progress).expect("refresh");

    assert_eq!(progress.len(), 20);
    assert_eq!(outcome.summary.count, 10_000);
    assert_eq!(outcome.summary.version, "v-a");
    assert_eq!(store.count("pota").expect("count"), 10_000);
    assert_eq!(progress.last().map(|p| p.processed), Some(10_000));
}

#[test]
fn progress_is_monotonic_and_bounded() {
    let mut store = LookupStore::open_in_memory().expect("store");
    let mut progress = Vec::new();
    refresh(&mut store, payload(0..1_234, "a"), 100, &mut progress).expect("refresh");

    assert_eq!(progress.len(), 13);
    for pair in progress.windows(2) {
        assert!(pair[0].processed <= pair[1].processed);
        assert!(pair[0].percent <= pair[1].percent);
    }
    for p in &progress {
        assert!((0.0..=1.0).contains(&p.percent));
        assert!(p.eta_seconds >= 0.0);
        assert_eq!(p.total, 1_234);
    }
    assert_eq!(progress.last().map(|p| p.percent), Some(1.0));
}

#[test]
fn identical_payload_twice_yields_identical_rows() {
    let mut store = LookupStore::open_in_memory().expect("store");
    let mut progress = Vec::new();
    refresh(&mut store, payload(0..750, "a"), 200, &mut progress).expect("first");
    let first = all_rows(&store, "pota");
    let second_outcome =
        refresh(&mut store, payload(0..750, "a"), 200, &mut progress).expect("second");
    let second = all_rows(&store, "pota");

    assert_eq!(first.len(), 750);
    assert_eq!(first, second);
    assert_eq!(second_outcome.deleted, 0);
    assert_eq!(store.unswept_count("pota").expect("unswept"), 0);
}

#[test]
fn keys_missing_from_new_payload_are_swept() {
    let mut store = LookupStore::open_in_memory().expect("store");
    let mut progress = Vec::new();
    refresh(&mut store, payload(0..100, "a"), 30, &mut progress).expect("first");

    let dropped = [7_usize, 42, 99];
    let keep = (0..100).filter(|i| !dropped.contains(i));
    let outcome = refresh(&mut store, payload(keep, "a"), 30, &mut progress).expect("second");

    assert_eq!(outcome.deleted, 3);
    for i in dropped {
        let key = format!("K-{i:05}");
        assert!(store.find_one_by_key("pota", &key).is_none(), "{key} survived");
        assert!(store.find_all_by_text("pota", None, &key).is_empty());
    }
    assert_eq!(store.count("pota").expect("count"), 97);
    assert_eq!(
        store.find_one_by_key("pota", "K-00008").map(|r| r.name),
        Some("Park 8 a".to_string())
    );
}

#[test]
fn failure_in_batch_five_keeps_committed_and_old_rows() {
    let mut store = LookupStore::open_in_memory().expect("store");
    let mut progress = Vec::new();
    // Old dataset: K-00050..K-00149, half overlapping the new payload.
    refresh(&mut store, payload(50..150, "old"), 25, &mut progress).expect("seed");
    assert_eq!(store.count("pota").expect("count"), 100);

    let roles = FieldRoles::default();
    let calls = Cell::new(0_usize);
    let failing = |raw: &RawRecord| -> Result<Option<RecordDraft>, ProcessError> {
        calls.set(calls.get() + 1);
        if raw.get("ref") == Some("K-00045") {
            return Err(ProcessError("corrupt row".to_string()));
        }
        roles.normalize(raw)
    };
    let mut batches = Vec::new();
    let job = RefreshJob::new("pota", payload(0..100, "new"), options(10));
    let err = run_to_completion(job, &mut store, &failing, &mut |p: &Progress| {
        batches.push(*p)
    })
    .expect_err("batch five fails");

    assert!(matches!(err, EngineError::Process(_)));
    assert!(err.to_string().contains("record 46"), "unexpected: {err}");
    assert_eq!(batches.len(), 4);
    assert_eq!(calls.get(), 46);

    // Batches 1-4 committed.
    for i in 0..40 {
        let row = store
            .find_one_by_key("pota", &format!("K-{i:05}"))
            .expect("committed row");
        assert!(row.name.ends_with("new"));
    }
    // Batch 5 rolled back as a whole.
    for i in 40..50 {
        assert!(store.find_one_by_key("pota", &format!("K-{i:05}")).is_none());
    }
    // Nothing deleted: every old row is still there with its old content.
    for i in 50..150 {
        let row = store
            .find_one_by_key("pota", &format!("K-{i:05}"))
            .expect("old row kept");
        assert!(row.name.ends_with("old"));
    }
    assert_eq!(store.count("pota").expect("count"), 140);
    assert_eq!(store.unswept_count("pota").expect("unswept"), 100);

    // The next successful run reconciles everything.
    let outcome = refresh(&mut store, payload(0..100, "new"), 10, &mut progress).expect("retry");
    assert_eq!(outcome.deleted, 50);
    assert_eq!(store.count("pota").expect("count"), 100);
    assert_eq!(store.unswept_count("pota").expect("unswept"), 0);
}

#[test]
fn failed_job_refuses_further_ticks() {
    let mut store = LookupStore::open_in_memory().expect("store");
    let always_fail = |_: &RawRecord| -> Result<Option<RecordDraft>, ProcessError> {
        Err(ProcessError("nope".to_string()))
    };
    let mut job = RefreshJob::new("pota", payload(0..5, "a"), options(2));
    assert!(matches!(
        job.tick(&mut store, &always_fail),
        Ok(Tick::SweepStarted { flagged: 0 })
    ));
    assert!(job.tick(&mut store, &always_fail).is_err());
    assert!(job.is_finished());
    assert!(job.tick(&mut store, &FieldRoles::default()).is_err());
}

#[test]
fn empty_payload_is_refused_unless_allowed() {
    let mut store = LookupStore::open_in_memory().expect("store");
    let mut progress = Vec::new();
    refresh(&mut store, payload(0..10, "a"), 5, &mut progress).expect("seed");

    let err = refresh(&mut store, payload(0..0, "a"), 5, &mut progress).expect_err("empty");
    assert!(err.to_string().contains("no records"));
    assert_eq!(store.count("pota").expect("count"), 10);

    let job = RefreshJob::new(
        "pota",
        Payload::default(),
        RefreshOptions {
            allow_empty: true,
            ..options(5)
        },
    );
    let outcome = run_to_completion(job, &mut store, &FieldRoles::default(), &mut |_: &Progress| {})
        .expect("allowed");
    assert_eq!(outcome.summary.count, 0);
    assert_eq!(outcome.summary.version, "fallback");
    assert_eq!(outcome.deleted, 10);
}

#[test]
fn skipped_rows_are_not_counted_and_event_log_covers_every_stage() {
    let mut store = LookupStore::open_in_memory().expect("store");
    let mut records = payload(0..4, "a").records;
    records.push(RawRecord::from_pairs([("name", "no key")]));
    let job = RefreshJob::new(
        "pota",
        Payload {
            version: None,
            records,
        },
        options(2),
    );
    assert_eq!(job.chunk_count(), 3);
    let outcome = run_to_completion(job, &mut store, &FieldRoles::default(), &mut |_: &Progress| {})
        .expect("refresh");
    assert_eq!(outcome.summary.count, 4);
    assert_eq!(outcome.skipped, 1);
    assert_eq!(outcome.summary.version, "fallback");

    let stages: Vec<_> = outcome.events.iter().map(|e| e.stage.clone()).collect();
    assert_eq!(stages.first(), Some(&IngestStage::Prepare));
    assert_eq!(stages.iter().filter(|s| **s == IngestStage::Batch).count(), 3);
    assert_eq!(stages.last(), Some(&IngestStage::Finalize));
}

#[test]
fn other_categories_are_untouched_by_a_refresh() {
    let mut store = LookupStore::open_in_memory().expect("store");
    store
        .upsert_batch(&[RecordDraft::new("G/LD-001", "Scafell Pike").into_record("sota")])
        .expect("seed sota");
    let mut progress = Vec::new();
    refresh(&mut store, payload(0..10, "a"), 5, &mut progress).expect("refresh");
    refresh(&mut store, payload(0..5, "a"), 5, &mut progress).expect("refresh");
    assert!(store.find_one_by_key("sota", "G/LD-001").is_some());
}
