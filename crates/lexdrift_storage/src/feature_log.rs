#![forbid(unsafe_code)]

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use lexdrift_contracts::schema::SchemaId;
use lexdrift_contracts::vector::FeatureVector;
use lexdrift_contracts::window::DriftWindow;
use lexdrift_contracts::{UnixTimeMs, Validate};
use serde::{Deserialize, Serialize};

use crate::error::{io_at, StorageError};
use crate::fsutil::{append_line, ensure_parent};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureLogRecord {
    pub logged_at_ms: UnixTimeMs,
    pub schema_id: SchemaId,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WindowRead {
    pub window: DriftWindow,
    /// Lines in range carrying another schema id.
    pub skipped_foreign: usize,
    pub corrupt_lines: usize,
}

/// Append-only JSON-lines log of live feature vectors. Clones share one
/// append lock.
#[derive(Debug, Clone)]
pub struct FeatureLog {
    path: PathBuf,
    append_lock: Arc<Mutex<()>>,
}

impl FeatureLog {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        ensure_parent(&path)?;
        Ok(Self {
            path,
            append_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, logged_at: UnixTimeMs, vector: &FeatureVector) -> Result<(), StorageError> {
        vector.validate()?;
        let record = FeatureLogRecord {
            logged_at_ms: logged_at,
            schema_id: vector.schema_id.clone(),
            values: vector.values.clone(),
        };
        let line = serde_json::to_string(&record).map_err(|source| StorageError::Json {
            path: self.path.clone(),
            source,
        })?;
        let _guard = self
            .append_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        append_line(&self.path, &line)
    }

    /// Collects `schema_id` records with `start <= logged_at_ms <= end`.
    /// Unparseable lines are counted, never merged into the window.
    pub fn read_window(
        &self,
        schema_id: &SchemaId,
        start: UnixTimeMs,
        end: UnixTimeMs,
    ) -> Result<WindowRead, StorageError> {
        let mut vectors = Vec::new();
        let mut skipped_foreign = 0usize;
        let mut corrupt_lines = 0usize;

        let file = match File::open(&self.path) {
            Ok(f) => Some(f),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(source) => {
                return Err(StorageError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        if let Some(file) = file {
            for (line_no, line) in BufReader::new(file).lines().enumerate() {
                let line = line.map_err(io_at(&self.path))?;
                if line.trim().is_empty() {
                    continue;
                }
                let record: FeatureLogRecord = match serde_json::from_str(&line) {
                    Ok(r) => r,
                    Err(err) => {
                        corrupt_lines += 1;
                        log::warn!(
                            "feature log line skipped: path={} line={} error={err}",
                            self.path.display(),
                            line_no + 1
                        );
                        continue;
                    }
                };
                if record.logged_at_ms < start || record.logged_at_ms > end {
                    continue;
                }
                if &record.schema_id != schema_id {
                    skipped_foreign += 1;
                    continue;
                }
                let vector = FeatureVector::new(record.schema_id, record.values);
                if vector.validate().is_err() {
                    corrupt_lines += 1;
                    continue;
                }
                vectors.push(vector);
            }
        }

        let window = DriftWindow::v1(schema_id.clone(), start, end, vectors)?;
        log::info!(
            "feature window read: schema_id={schema_id} size={} skipped_foreign={skipped_foreign} corrupt_lines={corrupt_lines}",
            window.len()
        );
        Ok(WindowRead {
            window,
            skipped_foreign,
            corrupt_lines,
        })
    }
}
