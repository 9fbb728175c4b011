#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use lexdrift_contracts::report::{AggregatePolicy, DriftStatisticKind};
use lexdrift_contracts::UnixTimeMs;
use lexdrift_engines::baseline::DEFAULT_QUANTILE_POINTS;
use lexdrift_engines::corpus::CorpusRules;
use lexdrift_engines::drift::{DriftThresholds, DEFAULT_DRIFT_THRESHOLD};
use lexdrift_engines::pipeline::PipelineConfig;
use lexdrift_os::logging::init_logging;
use lexdrift_os::RuntimeConfig;
use lexdrift_storage::fsutil::now_unix_ms;
use lexdrift_tools::cli::{self, OutputFormat};

#[derive(Parser, Debug)]
#[command(name = "lexdrift")]
#[command(about = "Text feature pipeline and drift detection")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check a training corpus against the acceptance rules.
    ValidateCorpus {
        #[arg(long)]
        corpus: PathBuf,
        #[arg(long, value_delimiter = ',')]
        allowed_labels: Vec<String>,
    },
    /// Fit a pipeline and write the serialized artifact.
    Fit {
        #[arg(long)]
        corpus: PathBuf,
        #[arg(long)]
        out: PathBuf,
        #[arg(long)]
        vocabulary_size: Option<usize>,
        #[arg(long)]
        embedding_dim: Option<usize>,
    },
    Transform {
        #[arg(long)]
        artifact: PathBuf,
        #[arg(long)]
        input: PathBuf,
        #[arg(long, value_enum, default_value = "jsonl")]
        format: Format,
    },
    /// Build a reference distribution from a corpus with a fitted artifact.
    Baseline {
        #[arg(long)]
        artifact: PathBuf,
        #[arg(long)]
        corpus: PathBuf,
        #[arg(long)]
        out: PathBuf,
        #[arg(long)]
        reference_id: Option<String>,
        #[arg(long, default_value_t = DEFAULT_QUANTILE_POINTS)]
        quantile_points: usize,
    },
    /// Validate, fit, baseline and publish a bundle to the artifact store.
    Train {
        #[arg(long)]
        corpus: PathBuf,
        #[arg(long)]
        promote: bool,
    },
    Promote {
        #[arg(long)]
        schema_id: String,
        #[arg(long)]
        version: String,
    },
    Status,
    /// Transform live inputs with the promoted pipeline and log the vectors.
    Featurize {
        #[arg(long)]
        input: PathBuf,
    },
    /// Compare a feature-log window against the promoted reference.
    Drift {
        #[arg(long)]
        window_start_ms: u64,
        #[arg(long)]
        window_end_ms: Option<u64>,
        #[arg(long, value_enum, default_value = "ks")]
        statistic: Statistic,
        #[arg(long, value_enum, default_value = "fraction-or-critical")]
        policy: Policy,
        #[arg(long, default_value_t = DEFAULT_DRIFT_THRESHOLD)]
        threshold: f64,
        #[arg(long, value_delimiter = ',')]
        critical: Vec<String>,
        /// Per-field overrides as `name=threshold`.
        #[arg(long = "field-threshold", value_parser = parse_field_threshold)]
        field_thresholds: Vec<(String, f64)>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Format {
    Jsonl,
    Csv,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Statistic {
    Ks,
    Psi,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Policy {
    Fraction,
    Critical,
    FractionOrCritical,
}

fn parse_field_threshold(raw: &str) -> Result<(String, f64), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=threshold, got '{raw}'"))?;
    let value: f64 = value
        .parse()
        .map_err(|e| format!("invalid threshold for '{name}': {e}"))?;
    Ok((name.to_string(), value))
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(2);
    }
}

fn run() -> Result<(), String> {
    let args = Args::parse();
    let config = RuntimeConfig::from_env().map_err(|e| e.to_string())?;
    init_logging(config.log_level);
    log::debug!(
        "environment={} artifact_root={}",
        config.environment,
        config.artifact_root.display()
    );

    let output = match args.command {
        Command::ValidateCorpus {
            corpus,
            allowed_labels,
        } => {
            let mut rules = CorpusRules::mvp_v1();
            rules.allowed_labels = allowed_labels.into_iter().collect();
            cli::validate_corpus_command(&corpus, &rules)?
        }
        Command::Fit {
            corpus,
            out,
            vocabulary_size,
            embedding_dim,
        } => {
            let mut pipeline = PipelineConfig::mvp_v1();
            if let Some(n) = vocabulary_size {
                pipeline.vocabulary_size = n;
            }
            if let Some(n) = embedding_dim {
                pipeline.embedding_dim = n;
            }
            cli::fit_command(&corpus, &out, &pipeline)?
        }
        Command::Transform {
            artifact,
            input,
            format,
        } => {
            let format = match format {
                Format::Jsonl => OutputFormat::Jsonl,
                Format::Csv => OutputFormat::Csv,
            };
            cli::transform_command(&artifact, &input, format)?
        }
        Command::Baseline {
            artifact,
            corpus,
            out,
            reference_id,
            quantile_points,
        } => cli::baseline_command(
            &artifact,
            &corpus,
            &out,
            reference_id.as_deref(),
            quantile_points,
            now_unix_ms(),
        )?,
        Command::Train { corpus, promote } => {
            cli::train_command(&config, &corpus, promote, now_unix_ms())?
        }
        Command::Promote { schema_id, version } => {
            cli::promote_command(&config, &schema_id, &version)?
        }
        Command::Status => cli::status_command(&config)?,
        Command::Featurize { input } => cli::featurize_command(&config, &input, now_unix_ms())?,
        Command::Drift {
            window_start_ms,
            window_end_ms,
            statistic,
            policy,
            threshold,
            critical,
            field_thresholds,
        } => {
            let thresholds = DriftThresholds {
                statistic: match statistic {
                    Statistic::Ks => DriftStatisticKind::KolmogorovSmirnov,
                    Statistic::Psi => DriftStatisticKind::PopulationStability,
                },
                policy: match policy {
                    Policy::Fraction => AggregatePolicy::Fraction,
                    Policy::Critical => AggregatePolicy::Critical,
                    Policy::FractionOrCritical => AggregatePolicy::FractionOrCritical,
                },
                default_threshold: threshold,
                critical_fields: critical.into_iter().collect::<BTreeSet<_>>(),
                field_thresholds: field_thresholds.into_iter().collect::<BTreeMap<_, _>>(),
                ..DriftThresholds::mvp_v1()
            };
            let end = window_end_ms.map(UnixTimeMs).unwrap_or_else(now_unix_ms);
            cli::drift_command(&config, thresholds, UnixTimeMs(window_start_ms), end)?
        }
    };
    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}
