#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::schema::SchemaId;
use crate::vector::FeatureVector;
use crate::{ContractViolation, UnixTimeMs, Validate};

/// Immutable snapshot of live-traffic vectors for one schema and time range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftWindow {
    pub schema_id: SchemaId,
    pub window_start: UnixTimeMs,
    pub window_end: UnixTimeMs,
    pub vectors: Vec<FeatureVector>,
}

impl DriftWindow {
    pub fn v1(
        schema_id: SchemaId,
        window_start: UnixTimeMs,
        window_end: UnixTimeMs,
        vectors: Vec<FeatureVector>,
    ) -> Result<Self, ContractViolation> {
        let w = Self {
            schema_id,
            window_start,
            window_end,
            vectors,
        };
        w.validate()?;
        Ok(w)
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Values of one field across the window. Vectors too short to hold
    /// `index` are skipped.
    pub fn column(&self, index: usize) -> Vec<f64> {
        self.vectors
            .iter()
            .filter_map(|v| v.values.get(index).copied())
            .collect()
    }
}

impl Validate for DriftWindow {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.schema_id.validate()?;
        if self.window_start > self.window_end {
            return Err(ContractViolation::InvalidValue {
                field: "drift_window.window_start",
                reason: "must be <= window_end",
            });
        }
        for v in &self.vectors {
            v.validate()?;
            if v.schema_id != self.schema_id {
                return Err(ContractViolation::InvalidValue {
                    field: "drift_window.vectors.schema_id",
                    reason: "must match the window schema id",
                });
            }
        }
        Ok(())
    }
}
