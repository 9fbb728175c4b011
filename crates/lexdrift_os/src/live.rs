#![forbid(unsafe_code)]

use std::sync::Arc;

use lexdrift_contracts::vector::FeatureVector;
use lexdrift_contracts::UnixTimeMs;
use lexdrift_engines::pipeline::{transform_batch, transform_bytes, FittedPipeline, RecordFailure};
use lexdrift_storage::{ArtifactStore, FeatureLog};

use crate::error::JobError;

/// Serving-side featurizer: transforms live payloads with the promoted
/// pipeline and appends the vectors to the feature log. Cheap to clone.
#[derive(Debug, Clone)]
pub struct LiveFeaturizer {
    pipeline: Arc<FittedPipeline>,
    log: FeatureLog,
}

#[derive(Debug, Clone, Default)]
pub struct LiveBatch {
    pub logged: usize,
    pub failures: Vec<RecordFailure>,
}

impl LiveFeaturizer {
    pub fn new(pipeline: Arc<FittedPipeline>, log: FeatureLog) -> Self {
        Self { pipeline, log }
    }

    pub fn from_store(store: &ArtifactStore, log: FeatureLog) -> Result<Self, JobError> {
        let bundle = store.load_promoted()?;
        Ok(Self::new(Arc::new(bundle.pipeline), log))
    }

    pub fn pipeline(&self) -> &FittedPipeline {
        &self.pipeline
    }

    pub fn featurize(&self, payload: &[u8], at: UnixTimeMs) -> Result<FeatureVector, JobError> {
        let vector = transform_bytes(payload, &self.pipeline)?;
        self.log.append(at, &vector)?;
        Ok(vector)
    }

    /// Bad payloads are reported, good ones are still logged.
    pub fn featurize_batch<T: AsRef<[u8]>>(
        &self,
        payloads: &[T],
        at: UnixTimeMs,
    ) -> Result<LiveBatch, JobError> {
        let batch = transform_batch(payloads, &self.pipeline);
        for (_, vector) in &batch.vectors {
            self.log.append(at, vector)?;
        }
        Ok(LiveBatch {
            logged: batch.vectors.len(),
            failures: batch.failures,
        })
    }
}
