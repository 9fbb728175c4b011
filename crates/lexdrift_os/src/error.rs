#![forbid(unsafe_code)]

use std::fmt;

use lexdrift_engines::baseline::BaselineError;
use lexdrift_engines::drift::DriftError;
use lexdrift_engines::pipeline::PipelineError;
use lexdrift_storage::StorageError;

use crate::config::ConfigError;

#[derive(Debug)]
pub enum JobError {
    InvalidCorpus { errors: Vec<String> },
    Pipeline(PipelineError),
    Baseline(BaselineError),
    Drift(DriftError),
    Storage(StorageError),
    Config(ConfigError),
}

impl JobError {
    /// Only a drift deadline is worth retrying unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Drift(e) if e.is_retryable())
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidCorpus { errors } => {
                write!(f, "corpus rejected: {}", errors.join("; "))
            }
            Self::Pipeline(e) => write!(f, "pipeline: {e}"),
            Self::Baseline(e) => write!(f, "baseline: {e}"),
            Self::Drift(e) => write!(f, "drift: {e}"),
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
        }
    }
}

impl std::error::Error for JobError {}

impl From<PipelineError> for JobError {
    fn from(value: PipelineError) -> Self {
        Self::Pipeline(value)
    }
}

impl From<BaselineError> for JobError {
    fn from(value: BaselineError) -> Self {
        Self::Baseline(value)
    }
}

impl From<DriftError> for JobError {
    fn from(value: DriftError) -> Self {
        Self::Drift(value)
    }
}

impl From<StorageError> for JobError {
    fn from(value: StorageError) -> Self {
        Self::Storage(value)
    }
}

impl From<ConfigError> for JobError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}
