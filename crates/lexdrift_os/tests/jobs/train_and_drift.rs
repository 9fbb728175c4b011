#![forbid(unsafe_code)]

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use lexdrift_contracts::corpus::CorpusRecord;
use lexdrift_contracts::UnixTimeMs;
use lexdrift_engines::drift::{DriftError, DriftThresholds};
use lexdrift_os::{DriftJob, JobError, LiveFeaturizer, TrainingJob};
use lexdrift_storage::{ArtifactStore, FeatureLog, ReportSink, StorageError};

fn temp_root(name: &str) -> PathBuf {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(1);
    std::env::temp_dir().join(format!("lexdrift-jobs-test-{name}-{suffix}"))
}

fn essay(i: usize, words: usize) -> String {
    const VOCAB: [&str; 10] = [
        "students", "write", "about", "climate", "policy", "and", "the", "ocean", "today",
        "carefully",
    ];
    let mut out = format!("Essay {i}:");
    for w in 0..words {
        out.push(' ');
        out.push_str(VOCAB[(i * 3 + w) % VOCAB.len()]);
        if w % 8 == 7 {
            out.push('.');
        }
    }
    out.push('.');
    out
}

fn short_essays(n: usize) -> Vec<String> {
    (0..n).map(|i| essay(i, 12 + i % 9)).collect()
}

fn corpus() -> Vec<CorpusRecord> {
    short_essays(60)
        .into_iter()
        .enumerate()
        .map(|(i, t)| CorpusRecord::labeled(t, if i % 3 == 0 { "ai" } else { "human" }))
        .collect()
}

fn thresholds() -> DriftThresholds {
    let mut t = DriftThresholds::mvp_v1();
    t.critical_fields.insert("word_count".to_string());
    t
}

#[test]
fn at_jobs_it_01_train_featurize_and_detect() {
    let root = temp_root("e2e");
    let store = ArtifactStore::open(root.join("artifacts")).unwrap();
    let features = FeatureLog::open(root.join("features.jsonl")).unwrap();
    let sink = ReportSink::open(root.join("reports.jsonl")).unwrap();

    let outcome = TrainingJob::mvp_v1("v")
        .run(&corpus(), &store, UnixTimeMs(1_000), true)
        .unwrap();
    assert!(outcome.promoted);
    assert_eq!(outcome.manifest.version, "v1000");
    assert_eq!(outcome.summary.label_counts.get("ai"), Some(&20));

    let live = LiveFeaturizer::from_store(&store, features.clone()).unwrap();
    let calm: Vec<String> = short_essays(40);
    let batch = live.featurize_batch(&calm, UnixTimeMs(2_000)).unwrap();
    assert_eq!(batch.logged, 40);
    assert!(batch.failures.is_empty());

    let job = DriftJob::new(thresholds(), Some(Duration::from_secs(30))).unwrap();
    let report = job
        .run(&store, &features, &sink, UnixTimeMs(2_000), UnixTimeMs(2_999))
        .unwrap();
    assert_eq!(report.window_size, 40);
    assert!(!report.field("word_count").unwrap().drifted);

    let long: Vec<String> = (0..40).map(|i| essay(i, 300 + i)).collect();
    live.featurize_batch(&long, UnixTimeMs(3_000)).unwrap();
    let report = job
        .run(&store, &features, &sink, UnixTimeMs(3_000), UnixTimeMs(3_999))
        .unwrap();
    assert!(report.field("word_count").unwrap().drifted);
    assert!(report.aggregate.alert);

    assert_eq!(sink.read_all().unwrap().len(), 2);
    fs::remove_dir_all(root).unwrap();
}

#[test]
fn at_jobs_it_02_rejected_corpus_publishes_nothing() {
    let root = temp_root("rejected");
    let store = ArtifactStore::open(&root).unwrap();
    let tiny: Vec<CorpusRecord> = corpus().into_iter().take(3).collect();
    let err = TrainingJob::mvp_v1("v")
        .run(&tiny, &store, UnixTimeMs(1), true)
        .unwrap_err();
    assert!(matches!(err, JobError::InvalidCorpus { .. }));
    assert!(store.list_schemas().unwrap().is_empty());
    assert!(store.current().unwrap().is_none());
    fs::remove_dir_all(root).unwrap();
}

#[test]
fn at_jobs_it_03_drift_without_promotion_is_not_found() {
    let root = temp_root("unpromoted");
    let store = ArtifactStore::open(root.join("artifacts")).unwrap();
    let features = FeatureLog::open(root.join("features.jsonl")).unwrap();
    let sink = ReportSink::open(root.join("reports.jsonl")).unwrap();
    TrainingJob::mvp_v1("v")
        .run(&corpus(), &store, UnixTimeMs(1), false)
        .unwrap();
    let err = DriftJob::new(thresholds(), None)
        .unwrap()
        .run(&store, &features, &sink, UnixTimeMs(0), UnixTimeMs(10))
        .unwrap_err();
    assert!(matches!(
        err,
        JobError::Storage(StorageError::NotFound { .. })
    ));
    assert!(!err.is_retryable());
    fs::remove_dir_all(root).unwrap();
}

#[test]
fn at_jobs_it_04_binary_payloads_fail_per_record() {
    let root = temp_root("binary");
    let store = ArtifactStore::open(root.join("artifacts")).unwrap();
    let features = FeatureLog::open(root.join("features.jsonl")).unwrap();
    TrainingJob::mvp_v1("v")
        .run(&corpus(), &store, UnixTimeMs(1), true)
        .unwrap();
    let live = LiveFeaturizer::from_store(&store, features.clone()).unwrap();
    let payloads: Vec<Vec<u8>> = vec![
        b"A normal short essay about the ocean.".to_vec(),
        vec![0x89, b'P', b'N', b'G', 0x00, 0x1a],
    ];
    let batch = live.featurize_batch(&payloads, UnixTimeMs(5)).unwrap();
    assert_eq!(batch.logged, 1);
    assert_eq!(batch.failures.len(), 1);
    assert_eq!(batch.failures[0].index, 1);
    assert!(live.featurize(&payloads[1], UnixTimeMs(5)).is_err());
    fs::remove_dir_all(root).unwrap();
}

#[test]
fn at_jobs_it_05_timeout_is_retryable() {
    let err = JobError::Drift(DriftError::Timeout {
        fields_done: 3,
        fields_total: 70,
    });
    assert!(err.is_retryable());
    assert!(err.to_string().contains("3/70"));
}
