use awardref_ingest::{
    run_to_completion, DelimitedFormat, FieldRoles, Payload, RawRecord, RefreshJob,
    RefreshOptions,
};
use awardref_model::Progress;
use awardref_store::LookupStore;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn synthetic_payload(n: usize) -> Payload {
    Payload {
        version: Some("bench".to_string()),
        records: (0..n)
            .map(|i| {
                RawRecord::from_pairs([
                    ("ref".to_string(), format!("US-{i:05}")),
                    ("name".to_string(), format!("Reference {i}")),
                    ("grid".to_string(), "FN31pr".to_string()),
                ])
            })
            .collect(),
    }
}

fn synthetic_csv(n: usize) -> Vec<u8> {
    let mut out = String::from("ref,name,lat,lon\n");
    for i in 0..n {
        out.push_str(&format!(
            "US-{i:05},\"Reference {i}, Somewhere\",{},{}\n",
            40.0 + (i % 90) as f64 / 10.0,
            -80.0 + (i % 90) as f64 / 10.0
        ));
    }
    out.into_bytes()
}

fn bench_refresh_10k(c: &mut Criterion) {
    let payload = synthetic_payload(10_000);
    c.bench_function("refresh_10k_records_chunk_500", |b| {
        b.iter(|| {
            let mut store = LookupStore::open_in_memory().expect("store");
            let job = RefreshJob::new(
                "pota",
                payload.clone(),
                RefreshOptions {
                    chunk_size: 500,
                    ..RefreshOptions::default()
                },
            );
            let mut ignore = |_: &Progress| {};
            let outcome = run_to_completion(job, &mut store, &FieldRoles::default(), &mut ignore)
                .expect("refresh");
            black_box(outcome.summary.count);
        });
    });
}

fn bench_csv_parse(c: &mut Criterion) {
    let bytes = synthetic_csv(10_000);
    let format = DelimitedFormat::default();
    c.bench_function("parse_csv_10k_rows", |b| {
        b.iter(|| black_box(format.parse_bytes(&bytes).expect("parse").records.len()));
    });
}

criterion_group!(benches, bench_refresh_10k, bench_csv_parse);
criterion_main!(benches);
