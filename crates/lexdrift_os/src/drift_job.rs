#![forbid(unsafe_code)]

use std::time::{Duration, Instant};

use lexdrift_contracts::report::DriftReport;
use lexdrift_contracts::UnixTimeMs;
use lexdrift_engines::drift::{DriftDetector, DriftThresholds};
use lexdrift_storage::{ArtifactStore, FeatureLog, ReportSink};

use crate::error::JobError;

/// One scheduled comparison of the promoted reference against a window of
/// the feature log. The report is persisted before it is returned.
#[derive(Debug, Clone)]
pub struct DriftJob {
    detector: DriftDetector,
    timeout: Option<Duration>,
}

impl DriftJob {
    pub fn new(thresholds: DriftThresholds, timeout: Option<Duration>) -> Result<Self, JobError> {
        Ok(Self {
            detector: DriftDetector::new(thresholds)?,
            timeout,
        })
    }

    pub fn run(
        &self,
        store: &ArtifactStore,
        features: &FeatureLog,
        sink: &ReportSink,
        window_start: UnixTimeMs,
        window_end: UnixTimeMs,
    ) -> Result<DriftReport, JobError> {
        let bundle = store.load_promoted()?;
        let read = features.read_window(bundle.pipeline.schema_id(), window_start, window_end)?;
        if read.skipped_foreign > 0 || read.corrupt_lines > 0 {
            log::warn!(
                "feature window incomplete: schema_id={} skipped_foreign={} corrupt_lines={}",
                bundle.pipeline.schema_id(),
                read.skipped_foreign,
                read.corrupt_lines
            );
        }

        let report = match self.timeout {
            Some(t) => {
                self.detector
                    .compare_with_deadline(&bundle.reference, &read.window, Instant::now() + t)?
            }
            None => self.detector.compare(&bundle.reference, &read.window)?,
        };
        sink.write(&report)?;
        if report.aggregate.alert {
            log::warn!(
                "drift alert: schema_id={} reference_id={} triggered_by={:?}",
                report.schema_id,
                report.reference_id,
                report.aggregate.triggered_by
            );
        }
        Ok(report)
    }
}
