#![forbid(unsafe_code)]

use lexdrift_contracts::corpus::CorpusRecord;
use lexdrift_contracts::vector::FeatureVector;
use lexdrift_contracts::UnixTimeMs;
use lexdrift_engines::baseline::{build_reference, DEFAULT_QUANTILE_POINTS};
use lexdrift_engines::corpus::{usable_texts, validate_corpus, CorpusRules, CorpusValidation};
use lexdrift_engines::pipeline::{FeaturePipeline, FitSummary, FittedPipeline, PipelineConfig};
use lexdrift_storage::artifact_store::version_label;
use lexdrift_storage::{ArtifactManifest, ArtifactStore};

use crate::error::JobError;

#[derive(Debug, Clone)]
pub struct TrainingJob {
    pub pipeline: PipelineConfig,
    pub rules: CorpusRules,
    pub quantile_points: usize,
    pub version_prefix: String,
}

#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub manifest: ArtifactManifest,
    pub validation: CorpusValidation,
    pub summary: FitSummary,
    pub promoted: bool,
}

impl TrainingJob {
    pub fn mvp_v1(version_prefix: impl Into<String>) -> Self {
        Self {
            pipeline: PipelineConfig::mvp_v1(),
            rules: CorpusRules::mvp_v1(),
            quantile_points: DEFAULT_QUANTILE_POINTS,
            version_prefix: version_prefix.into(),
        }
    }

    /// validate -> fit -> reference from the training vectors -> publish,
    /// then optionally promote. Nothing is published for a rejected corpus.
    pub fn run(
        &self,
        corpus: &[CorpusRecord],
        store: &ArtifactStore,
        now: UnixTimeMs,
        promote: bool,
    ) -> Result<TrainingOutcome, JobError> {
        let validation = validate_corpus(corpus, &self.rules);
        for w in &validation.warnings {
            log::warn!("corpus warning: {w}");
        }
        if !validation.is_valid {
            return Err(JobError::InvalidCorpus {
                errors: validation.errors,
            });
        }

        let fitted = FeaturePipeline::new(self.pipeline.clone())?.fit(corpus)?;
        let vectors = training_vectors(corpus, &fitted);
        let version = version_label(&self.version_prefix, now);
        let reference_id = format!("{}@{version}", fitted.schema_id());
        let reference = build_reference(
            fitted.schema(),
            &vectors,
            &reference_id,
            now,
            self.quantile_points,
        )?;

        let manifest = store.publish(&fitted, &reference, &version)?;
        if promote {
            store.promote(&manifest.schema_id, &manifest.version)?;
        }
        log::info!(
            "training finished: schema_id={} version={} reference_vectors={} promoted={promote}",
            manifest.schema_id,
            manifest.version,
            vectors.len()
        );
        Ok(TrainingOutcome {
            manifest,
            validation,
            summary: fitted.summary().clone(),
            promoted: promote,
        })
    }
}

/// Vectors for the same documents fitting used.
fn training_vectors(corpus: &[CorpusRecord], fitted: &FittedPipeline) -> Vec<FeatureVector> {
    usable_texts(corpus, fitted.config().min_text_chars)
        .into_iter()
        .map(|text| fitted.transform(text))
        .collect()
}
