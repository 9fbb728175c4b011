#![forbid(unsafe_code)]

use std::fs;
use std::path::Path;

use lexdrift_contracts::schema::SchemaId;
use lexdrift_contracts::vector::{csv_header, FeatureVector};
use lexdrift_contracts::UnixTimeMs;
use lexdrift_engines::artifact::{deserialize, serialize};
use lexdrift_engines::baseline::build_reference;
use lexdrift_engines::corpus::{usable_texts, validate_corpus, CorpusRules};
use lexdrift_engines::drift::DriftThresholds;
use lexdrift_engines::pipeline::{transform_batch, FeaturePipeline, FittedPipeline, PipelineConfig};
use lexdrift_os::{DriftJob, LiveFeaturizer, RuntimeConfig, TrainingJob};
use lexdrift_storage::fsutil::atomic_write;
use lexdrift_storage::{ArtifactStore, FeatureLog, ReportSink};

use crate::corpus_io::{read_corpus, read_payload_lines, InputLine};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Jsonl,
    Csv,
}

#[derive(serde::Serialize)]
struct TransformedRow<'a> {
    line: usize,
    #[serde(flatten)]
    vector: &'a FeatureVector,
}

#[derive(serde::Serialize)]
struct FailedRow {
    line: usize,
    error: String,
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("failed to encode output: {e}"))
}

fn load_artifact(path: &Path) -> Result<FittedPipeline, String> {
    let bytes =
        fs::read(path).map_err(|e| format!("failed to read artifact '{}': {e}", path.display()))?;
    deserialize(&bytes).map_err(|e| format!("artifact '{}': {e}", path.display()))
}

fn payloads(lines: &[InputLine]) -> Vec<&[u8]> {
    lines.iter().map(|l| l.payload.as_slice()).collect()
}

fn open_store(config: &RuntimeConfig) -> Result<ArtifactStore, String> {
    ArtifactStore::open(&config.artifact_root).map_err(|e| e.to_string())
}

/// Prints the validation report. A rejected corpus is an error carrying the
/// same report.
pub fn validate_corpus_command(corpus_path: &Path, rules: &CorpusRules) -> Result<String, String> {
    let corpus = read_corpus(corpus_path)?;
    let validation = validate_corpus(&corpus, rules);
    let out = to_json(&validation)?;
    if validation.is_valid {
        Ok(out)
    } else {
        Err(format!("corpus rejected:\n{out}"))
    }
}

pub fn fit_command(
    corpus_path: &Path,
    out_path: &Path,
    config: &PipelineConfig,
) -> Result<String, String> {
    let corpus = read_corpus(corpus_path)?;
    let fitted = FeaturePipeline::new(config.clone())
        .and_then(|p| p.fit(&corpus))
        .map_err(|e| e.to_string())?;
    let bytes = serialize(&fitted).map_err(|e| e.to_string())?;
    atomic_write(out_path, &bytes).map_err(|e| e.to_string())?;
    log::info!(
        "artifact written: path={} schema_id={} bytes={}",
        out_path.display(),
        fitted.schema_id(),
        bytes.len()
    );
    Ok(format!(
        "schema_id={} fields={} vocabulary={} documents_used={} artifact={}",
        fitted.schema_id(),
        fitted.schema().len(),
        fitted.vocabulary().len(),
        fitted.summary().documents_used,
        out_path.display()
    ))
}

/// One output row per non-blank input line, carrying its 1-based `line`.
/// JSONL also emits `{"line", "error"}` rows for lines that could not be
/// transformed; CSV leaves them out and they are logged.
pub fn transform_command(
    artifact_path: &Path,
    input_path: &Path,
    format: OutputFormat,
) -> Result<String, String> {
    let fitted = load_artifact(artifact_path)?;
    let lines = read_payload_lines(input_path)?;
    let batch = transform_batch(&payloads(&lines), &fitted);
    for f in &batch.failures {
        log::warn!("input line {} skipped: {}", lines[f.index].line_no, f.error);
    }

    let mut rows: Vec<(usize, String)> = Vec::with_capacity(lines.len());
    match format {
        OutputFormat::Csv => {
            for (index, v) in &batch.vectors {
                let line = lines[*index].line_no;
                rows.push((line, format!("{line},{}", v.to_csv_row())));
            }
        }
        OutputFormat::Jsonl => {
            for (index, vector) in &batch.vectors {
                let line = lines[*index].line_no;
                let row = serde_json::to_string(&TransformedRow { line, vector })
                    .map_err(|e| e.to_string())?;
                rows.push((line, row));
            }
            for f in &batch.failures {
                let line = lines[f.index].line_no;
                let row = serde_json::to_string(&FailedRow {
                    line,
                    error: f.error.to_string(),
                })
                .map_err(|e| e.to_string())?;
                rows.push((line, row));
            }
        }
    }
    rows.sort_by_key(|(line, _)| *line);

    let mut out = Vec::with_capacity(rows.len() + 1);
    if format == OutputFormat::Csv {
        out.push(format!("line,{}", csv_header(fitted.schema())));
    }
    out.extend(rows.into_iter().map(|(_, row)| row));
    Ok(out.join("\n"))
}

pub fn baseline_command(
    artifact_path: &Path,
    corpus_path: &Path,
    out_path: &Path,
    reference_id: Option<&str>,
    quantile_points: usize,
    now: UnixTimeMs,
) -> Result<String, String> {
    let fitted = load_artifact(artifact_path)?;
    let corpus = read_corpus(corpus_path)?;
    let vectors: Vec<_> = usable_texts(&corpus, fitted.config().min_text_chars)
        .into_iter()
        .map(|text| fitted.transform(text))
        .collect();
    let reference_id = reference_id
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}@{}", fitted.schema_id(), now.0));
    let reference = build_reference(fitted.schema(), &vectors, &reference_id, now, quantile_points)
        .map_err(|e| e.to_string())?;
    let json = to_json(&reference)?;
    atomic_write(out_path, json.as_bytes()).map_err(|e| e.to_string())?;
    Ok(format!(
        "reference_id={} sample_size={} fields={} out={}",
        reference.reference_id,
        vectors.len(),
        reference.fields.len(),
        out_path.display()
    ))
}

pub fn train_command(
    config: &RuntimeConfig,
    corpus_path: &Path,
    promote: bool,
    now: UnixTimeMs,
) -> Result<String, String> {
    let corpus = read_corpus(corpus_path)?;
    let store = open_store(config)?;
    let outcome = TrainingJob::mvp_v1(config.version_prefix.clone())
        .run(&corpus, &store, now, promote)
        .map_err(|e| e.to_string())?;
    to_json(&outcome.manifest).map(|manifest| {
        format!(
            "{manifest}\npromoted={} documents_used={}",
            outcome.promoted, outcome.summary.documents_used
        )
    })
}

pub fn promote_command(
    config: &RuntimeConfig,
    schema_id: &str,
    version: &str,
) -> Result<String, String> {
    let schema_id = SchemaId::new(schema_id).map_err(|e| e.to_string())?;
    let store = open_store(config)?;
    let pointer = store.promote(&schema_id, version).map_err(|e| e.to_string())?;
    to_json(&pointer)
}

pub fn status_command(config: &RuntimeConfig) -> Result<String, String> {
    let store = open_store(config)?;
    let mut lines = Vec::new();
    match store.current().map_err(|e| e.to_string())? {
        Some(p) => lines.push(format!("current {} {}", p.schema_id, p.version)),
        None => lines.push("current none".to_string()),
    }
    for schema_id in store.list_schemas().map_err(|e| e.to_string())? {
        let versions = store.list_versions(&schema_id).map_err(|e| e.to_string())?;
        lines.push(format!("{schema_id} {}", versions.join(",")));
    }
    Ok(lines.join("\n"))
}

/// Transforms each input line with the promoted pipeline and appends the
/// vectors to the configured feature log.
pub fn featurize_command(
    config: &RuntimeConfig,
    input_path: &Path,
    now: UnixTimeMs,
) -> Result<String, String> {
    let store = open_store(config)?;
    let features = FeatureLog::open(&config.feature_log_path).map_err(|e| e.to_string())?;
    let live = LiveFeaturizer::from_store(&store, features).map_err(|e| e.to_string())?;
    let lines = read_payload_lines(input_path)?;
    let batch = live
        .featurize_batch(&payloads(&lines), now)
        .map_err(|e| e.to_string())?;
    let failed: Vec<String> = batch
        .failures
        .iter()
        .map(|f| {
            let line = lines[f.index].line_no;
            log::warn!("input line {line} skipped: {}", f.error);
            line.to_string()
        })
        .collect();
    if failed.is_empty() {
        Ok(format!("logged={} failed=0", batch.logged))
    } else {
        Ok(format!(
            "logged={} failed={} failed_lines={}",
            batch.logged,
            failed.len(),
            failed.join(",")
        ))
    }
}

/// `min_window_size` and the timeout come from the runtime config.
pub fn drift_command(
    config: &RuntimeConfig,
    mut thresholds: DriftThresholds,
    window_start: UnixTimeMs,
    window_end: UnixTimeMs,
) -> Result<String, String> {
    thresholds.min_window_size = config.min_window_size;
    let job = DriftJob::new(thresholds, config.drift_timeout).map_err(|e| e.to_string())?;
    let store = open_store(config)?;
    let features = FeatureLog::open(&config.feature_log_path).map_err(|e| e.to_string())?;
    let sink = ReportSink::open(&config.report_log_path).map_err(|e| e.to_string())?;
    let report = job
        .run(&store, &features, &sink, window_start, window_end)
        .map_err(|e| e.to_string())?;
    to_json(&report)
}
