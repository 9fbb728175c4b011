#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};

use lexdrift_contracts::report::DriftReport;
use lexdrift_contracts::Validate;

use crate::error::StorageError;
use crate::fsutil::{append_line, ensure_parent};

/// Drift reports, one JSON object per line, in write order.
#[derive(Debug, Clone)]
pub struct ReportSink {
    path: PathBuf,
}

impl ReportSink {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        ensure_parent(&path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, report: &DriftReport) -> Result<(), StorageError> {
        report.validate()?;
        let line = serde_json::to_string(report).map_err(|source| StorageError::Json {
            path: self.path.clone(),
            source,
        })?;
        append_line(&self.path, &line)
    }

    pub fn read_all(&self) -> Result<Vec<DriftReport>, StorageError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StorageError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        let mut out = Vec::new();
        for (line_no, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let report = serde_json::from_str(line).map_err(|e| StorageError::CorruptRecord {
                path: self.path.clone(),
                line_no: line_no + 1,
                reason: e.to_string(),
            })?;
            out.push(report);
        }
        Ok(out)
    }
}
