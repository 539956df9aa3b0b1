// SPDX-License-Identifier: Apache-2.0

use awardref_ingest::{
    run_to_completion, FieldRoles, Payload, RawRecord, RefreshJob, RefreshOptions,
};
use awardref_model::Progress;
use awardref_store::LookupStore;
use proptest::prelude::*;
use proptest::test_runner::Config;

fn payload(rows: usize) -> Payload {
    Payload {
        version: None,
        records: (0..rows)
            .map(|i| {
                RawRecord::from_pairs([
                    ("ref".to_string(), format!("K-{i:05}")),
                    ("name".to_string(), format!("Park {i}")),
                ])
            })
            .collect(),
    }
}

proptest! {
    #![proptest_config(Config::with_cases(64))]
    #[test]
    fn progress_climbs_once_per_chunk_to_completion(
        rows in 1_usize..400,
        chunk_size in 1_usize..64
    ) {
        let mut store = LookupStore::open_in_memory().expect("store");
        let job = RefreshJob::new(
            "pota",
            payload(rows),
            RefreshOptions {
                chunk_size,
                fallback_version: "fallback".to_string(),
                allow_empty: false,
            },
        );
        let mut progress: Vec<Progress> = Vec::new();
        let mut record = |p: &Progress| progress.push(*p);
        let outcome = run_to_completion(job, &mut store, &FieldRoles::default(), &mut record)
            .expect("refresh");
        let total = rows as u64;

        prop_assert_eq!(progress.len(), rows.div_ceil(chunk_size));
        for pair in progress.windows(2) {
            prop_assert!(pair[0].processed < pair[1].processed);
            prop_assert!(pair[0].percent <= pair[1].percent);
        }
        for p in &progress {
            prop_assert_eq!(p.total, total);
            prop_assert!((0.0..=1.0).contains(&p.percent));
            prop_assert!(p.eta_seconds >= 0.0);
        }
        prop_assert_eq!(progress.last().map(|p| p.processed), Some(total));
        prop_assert_eq!(outcome.summary.count, total);
        prop_assert_eq!(store.count("pota").expect("count"), total);
    }
}
