#![forbid(unsafe_code)]

pub mod artifact;
pub mod baseline;
pub mod corpus;
pub mod drift;
pub mod pipeline;
pub mod text_stats;

pub use artifact::{deserialize, serialize, ArtifactError};
pub use baseline::{build_reference, summary_from_moments, BaselineError};
pub use drift::{DriftDetector, DriftError, DriftThresholds};
pub use pipeline::{
    transform, transform_batch, transform_bytes, FeaturePipeline, FittedPipeline, PipelineConfig,
    PipelineError,
};
