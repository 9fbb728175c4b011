#![forbid(unsafe_code)]

use lexdrift_contracts::corpus::CorpusRecord;
use lexdrift_contracts::reference::ReferenceDistribution;
use lexdrift_contracts::report::DriftWarning;
use lexdrift_contracts::schema::{FeatureSchema, FieldDomain};
use lexdrift_contracts::vector::FeatureVector;
use lexdrift_contracts::window::DriftWindow;
use lexdrift_contracts::UnixTimeMs;
use lexdrift_engines::baseline::{build_reference, probit, summary_from_moments};
use lexdrift_engines::drift::{compare, ks_distance, DriftDetector, DriftError, DriftThresholds};
use lexdrift_engines::pipeline::{FeatureFamilies, FeaturePipeline, FittedPipeline, PipelineConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn word_count_schema() -> FeatureSchema {
    FeatureSchema::v1(vec![("word_count".to_string(), FieldDomain::Count)]).unwrap()
}

fn single_field_window(schema: &FeatureSchema, values: &[f64]) -> DriftWindow {
    let vectors = values
        .iter()
        .map(|v| FeatureVector::new(schema.schema_id().clone(), vec![*v]))
        .collect();
    DriftWindow::v1(
        schema.schema_id().clone(),
        UnixTimeMs(1_000),
        UnixTimeMs(61_000),
        vectors,
    )
    .unwrap()
}

fn probit_spaced(n: usize, mean: f64, std_dev: f64) -> Vec<f64> {
    (0..n)
        .map(|i| (mean + std_dev * probit((i as f64 + 0.5) / n as f64)).round())
        .collect()
}

fn normal(rng: &mut StdRng, mean: f64, std_dev: f64) -> f64 {
    // Box-Muller; u1 is kept away from 0.
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen();
    mean + std_dev * (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

fn moments_reference(schema: &FeatureSchema) -> ReferenceDistribution {
    ReferenceDistribution::v1(
        schema.schema_id().clone(),
        "ref-word-count",
        UnixTimeMs(0),
        vec![summary_from_moments("word_count", 50.0, 10.0, 1000, 21).unwrap()],
    )
    .unwrap()
}

fn critical_word_count() -> DriftThresholds {
    let mut t = DriftThresholds::mvp_v1();
    t.critical_fields.insert("word_count".to_string());
    t
}

#[test]
fn at_drift_it_01_window_near_reference_is_not_drifted() {
    let schema = word_count_schema();
    let window = single_field_window(&schema, &probit_spaced(40, 50.0, 10.0));
    let report = compare(&moments_reference(&schema), &window, &critical_word_count()).unwrap();
    let wc = report.field("word_count").unwrap();
    assert!(!wc.drifted, "statistic {}", wc.statistic);
    assert!(!wc.insufficient_sample);
    assert!(!report.aggregate.alert);
    assert!(report.warnings.is_empty());
}

#[test]
fn at_drift_it_02_window_far_from_reference_alerts_on_critical_field() {
    let schema = word_count_schema();
    let window = single_field_window(&schema, &probit_spaced(40, 500.0, 10.0));
    let report = compare(&moments_reference(&schema), &window, &critical_word_count()).unwrap();
    let wc = report.field("word_count").unwrap();
    assert!(wc.drifted);
    assert_eq!(wc.statistic, 1.0);
    assert!(report.aggregate.alert);
    assert_eq!(report.aggregate.triggered_by, vec!["word_count".to_string()]);
}

#[test]
fn at_drift_it_03_ks_never_decreases_as_the_window_shifts_away() {
    let schema = word_count_schema();
    let reference = moments_reference(&schema);
    let summary = &reference.fields[0];
    let base: Vec<f64> = (0..200)
        .map(|i| 50.0 + 10.0 * probit((i as f64 + 0.5) / 200.0))
        .collect();
    let mut prev = ks_distance(summary, &base);
    for step in 1..=40 {
        let shifted: Vec<f64> = base.iter().map(|v| v + step as f64 * 2.5).collect();
        let d = ks_distance(summary, &shifted);
        assert!(d + 1e-12 >= prev, "offset {}: {d} < {prev}", step as f64 * 2.5);
        prev = d;
    }
    assert_eq!(prev, 1.0);
}

#[test]
fn at_drift_it_04_same_distribution_stays_below_threshold_over_seeded_trials() {
    let schema =
        FeatureSchema::v1(vec![("avg_word_length".to_string(), FieldDomain::NonNegative)])
            .unwrap();
    let mut rng = StdRng::seed_from_u64(0x1e8d_0001);
    let sample = |rng: &mut StdRng| normal(rng, 5.0, 1.0).max(0.0);
    let reference_vectors: Vec<FeatureVector> = (0..1000)
        .map(|_| FeatureVector::new(schema.schema_id().clone(), vec![sample(&mut rng)]))
        .collect();
    let reference =
        build_reference(&schema, &reference_vectors, "ref-sampled", UnixTimeMs(0), 101).unwrap();
    let detector = DriftDetector::new(DriftThresholds::mvp_v1()).unwrap();

    let trials = 25;
    let mut total = 0.0;
    for _ in 0..trials {
        let values: Vec<f64> = (0..200).map(|_| sample(&mut rng)).collect();
        let report = detector
            .compare(&reference, &single_field_window(&schema, &values))
            .unwrap();
        let field = report.field("avg_word_length").unwrap();
        assert!(!field.drifted, "false positive: statistic {}", field.statistic);
        total += field.statistic;
    }
    let mean = total / trials as f64;
    assert!(mean < 0.1, "mean statistic {mean}");
}

#[test]
fn at_drift_it_05_insufficient_window_never_alerts() {
    let schema = word_count_schema();
    let window = single_field_window(&schema, &probit_spaced(29, 500.0, 10.0));
    let report = compare(&moments_reference(&schema), &window, &critical_word_count()).unwrap();
    let wc = report.field("word_count").unwrap();
    assert!(wc.insufficient_sample);
    assert!(!wc.drifted);
    assert!(!report.aggregate.alert);
    assert!(report.aggregate.insufficient_sample);
    assert_eq!(
        report.warnings,
        vec![DriftWarning::InsufficientSample {
            got: 29,
            required: 30
        }]
    );
}

fn generated_texts(n: usize, base_words: usize, offset: usize) -> Vec<String> {
    const WORDS: [&str; 12] = [
        "the", "model", "writes", "short", "essays", "about", "rivers", "and", "quiet",
        "towns", "every", "day",
    ];
    (0..n)
        .map(|i| {
            let len = base_words + ((i + offset) * 7 % 11);
            let mut text = String::new();
            for w in 0..len {
                if w > 0 {
                    text.push(' ');
                }
                text.push_str(WORDS[(i + w) % WORDS.len()]);
                if w % 6 == 5 {
                    text.push('.');
                }
            }
            text.push('.');
            text
        })
        .collect()
}

fn fit_generated() -> FittedPipeline {
    let corpus: Vec<CorpusRecord> = generated_texts(110, 5, 0)
        .into_iter()
        .enumerate()
        .map(|(i, t)| CorpusRecord::new(format!("{t} Entry {i}.")))
        .collect();
    FeaturePipeline::new(PipelineConfig::mvp_v1())
        .unwrap()
        .fit(&corpus)
        .unwrap()
}

fn window_from_texts(fitted: &FittedPipeline, texts: &[String]) -> DriftWindow {
    let vectors = texts.iter().map(|t| fitted.transform(t)).collect();
    DriftWindow::v1(
        fitted.schema_id().clone(),
        UnixTimeMs(10),
        UnixTimeMs(20),
        vectors,
    )
    .unwrap()
}

#[test]
fn at_drift_it_06_pipeline_to_report_end_to_end() {
    let fitted = fit_generated();
    let reference_texts = generated_texts(110, 5, 0);
    let reference_vectors: Vec<FeatureVector> =
        reference_texts.iter().map(|t| fitted.transform(t)).collect();
    let reference = build_reference(
        fitted.schema(),
        &reference_vectors,
        "ref-generated",
        UnixTimeMs(5),
        21,
    )
    .unwrap();

    let thresholds = critical_word_count();
    let calm = window_from_texts(&fitted, &generated_texts(44, 5, 3));
    let report = compare(&reference, &calm, &thresholds).unwrap();
    assert!(!report.field("word_count").unwrap().drifted);
    assert_eq!(report.per_field.len(), fitted.schema().len());

    let long = window_from_texts(&fitted, &generated_texts(44, 400, 0));
    let report = compare(&reference, &long, &thresholds).unwrap();
    assert!(report.field("word_count").unwrap().drifted);
    assert!(report.aggregate.alert);
    assert!(report
        .aggregate
        .triggered_by
        .contains(&"word_count".to_string()));
}

#[test]
fn at_drift_it_07_windows_from_another_schema_are_rejected() {
    let fitted = fit_generated();
    let mut cfg = PipelineConfig::mvp_v1();
    cfg.families = FeatureFamilies {
        hashed_embedding: false,
        ..FeatureFamilies::all()
    };
    let corpus: Vec<CorpusRecord> = generated_texts(20, 5, 0)
        .into_iter()
        .enumerate()
        .map(|(i, t)| CorpusRecord::new(format!("{t} {i}")))
        .collect();
    let other = FeaturePipeline::new(cfg).unwrap().fit(&corpus).unwrap();

    let reference_vectors: Vec<FeatureVector> = generated_texts(40, 5, 0)
        .iter()
        .map(|t| fitted.transform(t))
        .collect();
    let reference =
        build_reference(fitted.schema(), &reference_vectors, "ref", UnixTimeMs(0), 21).unwrap();
    let foreign = window_from_texts(&other, &generated_texts(40, 5, 0));
    let err = compare(&reference, &foreign, &DriftThresholds::mvp_v1()).unwrap_err();
    assert!(matches!(err, DriftError::SchemaMismatch { .. }));
    assert!(err.to_string().contains(fitted.schema_id().as_str()));
}
