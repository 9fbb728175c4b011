#![forbid(unsafe_code)]

pub mod config;
pub mod drift_job;
pub mod error;
pub mod live;
pub mod logging;
pub mod training;

pub use config::{ConfigError, RuntimeConfig};
pub use drift_job::DriftJob;
pub use error::JobError;
pub use live::{LiveBatch, LiveFeaturizer};
pub use training::{TrainingJob, TrainingOutcome};
