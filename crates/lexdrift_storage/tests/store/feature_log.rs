#![forbid(unsafe_code)]

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use lexdrift_contracts::report::{
    AggregateDrift, AggregatePolicy, DriftReport, DriftStatisticKind, FieldDrift,
};
use lexdrift_contracts::schema::{FeatureSchema, FieldDomain, SchemaId};
use lexdrift_contracts::vector::FeatureVector;
use lexdrift_contracts::UnixTimeMs;
use lexdrift_storage::{FeatureLog, ReportSink, StorageError};

fn temp_dir(name: &str) -> PathBuf {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(1);
    std::env::temp_dir().join(format!("lexdrift-log-test-{name}-{suffix}"))
}

fn schema(name: &str) -> FeatureSchema {
    FeatureSchema::v1(vec![(name.to_string(), FieldDomain::Real)]).unwrap()
}

fn vector(schema: &FeatureSchema, v: f64) -> FeatureVector {
    FeatureVector::new(schema.schema_id().clone(), vec![v])
}

#[test]
fn at_log_it_01_read_window_filters_by_time_and_schema() {
    let dir = temp_dir("window");
    let log = FeatureLog::open(dir.join("nested").join("features.jsonl")).unwrap();
    let ours = schema("x");
    let theirs = schema("y");
    for t in 0..10u64 {
        log.append(UnixTimeMs(t * 100), &vector(&ours, t as f64)).unwrap();
    }
    log.append(UnixTimeMs(450), &vector(&theirs, 1.0)).unwrap();

    let read = log
        .read_window(ours.schema_id(), UnixTimeMs(200), UnixTimeMs(500))
        .unwrap();
    let values: Vec<f64> = read.window.vectors.iter().map(|v| v.values[0]).collect();
    assert_eq!(values, vec![2.0, 3.0, 4.0, 5.0]);
    assert_eq!(read.skipped_foreign, 1);
    assert_eq!(read.corrupt_lines, 0);
    assert_eq!(read.window.window_start, UnixTimeMs(200));
    fs::remove_dir_all(dir).unwrap();
}

#[test]
fn at_log_it_02_corrupt_lines_are_counted_not_merged() {
    let dir = temp_dir("corrupt");
    let path = dir.join("features.jsonl");
    let log = FeatureLog::open(&path).unwrap();
    let s = schema("x");
    log.append(UnixTimeMs(10), &vector(&s, 1.0)).unwrap();
    {
        let mut f = OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(b"{\"logged_at_ms\": 11, \"schema_id\": \n").unwrap();
        f.write_all(b"not json at all\n\n").unwrap();
    }
    log.append(UnixTimeMs(12), &vector(&s, 2.0)).unwrap();

    let read = log
        .read_window(s.schema_id(), UnixTimeMs(0), UnixTimeMs(100))
        .unwrap();
    assert_eq!(read.window.len(), 2);
    assert_eq!(read.corrupt_lines, 2);
    fs::remove_dir_all(dir).unwrap();
}

#[test]
fn at_log_it_03_missing_log_is_an_empty_window() {
    let dir = temp_dir("missing");
    let log = FeatureLog::open(dir.join("features.jsonl")).unwrap();
    let s = schema("x");
    let read = log
        .read_window(s.schema_id(), UnixTimeMs(0), UnixTimeMs(1))
        .unwrap();
    assert!(read.window.is_empty());
    assert!(matches!(
        log.read_window(s.schema_id(), UnixTimeMs(5), UnixTimeMs(1)),
        Err(StorageError::Contract(_))
    ));
    fs::remove_dir_all(dir).unwrap();
}

fn report(alert: bool) -> DriftReport {
    DriftReport {
        schema_id: SchemaId::new("lexdrift.v1-0011223344556677").unwrap(),
        reference_id: "ref-1".to_string(),
        window_start: UnixTimeMs(0),
        window_end: UnixTimeMs(60_000),
        window_size: 42,
        statistic: DriftStatisticKind::KolmogorovSmirnov,
        per_field: vec![FieldDrift {
            name: "word_count".to_string(),
            statistic: 0.123_456_789_012_345_6,
            threshold: 0.2,
            drifted: false,
            insufficient_sample: false,
            critical: true,
        }],
        aggregate: AggregateDrift {
            policy: AggregatePolicy::FractionOrCritical,
            alert_fraction: 0.3,
            evaluated_fields: 1,
            drifted_fields: 0,
            drifted_fraction: 0.0,
            triggered_by: vec![],
            insufficient_sample: false,
            alert,
        },
        warnings: vec![],
    }
}

#[test]
fn at_log_it_04_report_sink_appends_in_order() {
    let dir = temp_dir("reports");
    let sink = ReportSink::open(dir.join("reports.jsonl")).unwrap();
    assert!(sink.read_all().unwrap().is_empty());
    sink.write(&report(false)).unwrap();
    sink.write(&report(true)).unwrap();
    let all = sink.read_all().unwrap();
    assert_eq!(all, vec![report(false), report(true)]);
    fs::remove_dir_all(dir).unwrap();
}

#[test]
fn at_log_it_05_concurrent_appends_keep_every_record_whole() {
    let dir = temp_dir("concurrent");
    let path = dir.join("features.jsonl");
    let shared = FeatureLog::open(&path).unwrap();
    let wide = FeatureSchema::v1(
        (0..64)
            .map(|i| (format!("f{i}"), FieldDomain::Real))
            .collect(),
    )
    .unwrap();
    let per_thread = 150usize;

    std::thread::scope(|scope| {
        for t in 0..8usize {
            // Half the writers share one handle, half open their own.
            let log = if t % 2 == 0 {
                shared.clone()
            } else {
                FeatureLog::open(&path).unwrap()
            };
            let wide = &wide;
            scope.spawn(move || {
                for i in 0..per_thread {
                    let values: Vec<f64> =
                        (0..64).map(|f| (t * 1_000 + i) as f64 + f as f64 / 64.0).collect();
                    let v = FeatureVector::new(wide.schema_id().clone(), values);
                    log.append(UnixTimeMs(1 + i as u64), &v).unwrap();
                }
            });
        }
    });

    let read = shared
        .read_window(wide.schema_id(), UnixTimeMs(0), UnixTimeMs(10_000))
        .unwrap();
    assert_eq!(read.corrupt_lines, 0);
    assert_eq!(read.skipped_foreign, 0);
    assert_eq!(read.window.len(), 8 * per_thread);
    fs::remove_dir_all(dir).unwrap();
}
