#![forbid(unsafe_code)]

pub mod artifact_store;
pub mod error;
pub mod feature_log;
pub mod fsutil;
pub mod report_sink;

pub use artifact_store::{ArtifactManifest, ArtifactStore, CurrentPointer, LoadedBundle};
pub use error::StorageError;
pub use feature_log::{FeatureLog, FeatureLogRecord, WindowRead};
pub use report_sink::ReportSink;
