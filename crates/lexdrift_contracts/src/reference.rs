#![forbid(unsafe_code)]

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::common::validate_finite;
use crate::schema::SchemaId;
use crate::{ContractViolation, UnixTimeMs, Validate};

pub const MAX_QUANTILE_POINTS: usize = 1001;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuantilePoint {
    /// Cumulative probability in [0, 1].
    pub p: f64,
    pub value: f64,
}

/// Compact training-time summary of one feature field.
///
/// The quantile points define a reference CDF: 0 below the first point, linear
/// between points, 1 at and above the last point. Repeated values form a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSummary {
    pub name: String,
    pub count: u64,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub quantiles: Vec<QuantilePoint>,
}

impl FieldSummary {
    /// Summary of a sample in which every value equals `value`.
    pub fn point_mass(name: impl Into<String>, value: f64, count: u64) -> Self {
        Self {
            name: name.into(),
            count,
            mean: value,
            std_dev: 0.0,
            min: value,
            max: value,
            quantiles: vec![
                QuantilePoint { p: 0.0, value },
                QuantilePoint { p: 1.0, value },
            ],
        }
    }

    pub fn is_point_mass(&self) -> bool {
        match (self.quantiles.first(), self.quantiles.last()) {
            (Some(first), Some(last)) => first.value == last.value,
            _ => false,
        }
    }

    /// Reference CDF at `x` (right-continuous).
    pub fn cdf(&self, x: f64) -> f64 {
        let q = &self.quantiles;
        // Last point whose value is <= x.
        let upto = q.partition_point(|pt| pt.value <= x);
        if upto == 0 {
            return 0.0;
        }
        if upto == q.len() {
            return 1.0;
        }
        interpolate(q[upto - 1], q[upto], x)
    }

    /// Left limit of the reference CDF at `x`.
    pub fn cdf_left(&self, x: f64) -> f64 {
        let q = &self.quantiles;
        // First point whose value is >= x.
        let from = q.partition_point(|pt| pt.value < x);
        if from == 0 {
            return 0.0;
        }
        if from == q.len() {
            return 1.0;
        }
        interpolate(q[from - 1], q[from], x)
    }
}

fn interpolate(lo: QuantilePoint, hi: QuantilePoint, x: f64) -> f64 {
    let span = hi.value - lo.value;
    if span <= 0.0 {
        return hi.p;
    }
    let t = ((x - lo.value) / span).clamp(0.0, 1.0);
    lo.p + (hi.p - lo.p) * t
}

impl Validate for FieldSummary {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.name.is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "field_summary.name",
                reason: "must not be empty",
            });
        }
        if self.count == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "field_summary.count",
                reason: "must be > 0",
            });
        }
        validate_finite("field_summary.mean", self.mean)?;
        validate_finite("field_summary.std_dev", self.std_dev)?;
        validate_finite("field_summary.min", self.min)?;
        validate_finite("field_summary.max", self.max)?;
        if self.std_dev < 0.0 {
            return Err(ContractViolation::InvalidRange {
                field: "field_summary.std_dev",
                min: 0.0,
                max: f64::MAX,
                got: self.std_dev,
            });
        }
        if self.min > self.max {
            return Err(ContractViolation::InvalidValue {
                field: "field_summary.min",
                reason: "must be <= max",
            });
        }
        if self.quantiles.len() < 2 || self.quantiles.len() > MAX_QUANTILE_POINTS {
            return Err(ContractViolation::InvalidValue {
                field: "field_summary.quantiles",
                reason: "must contain 2..=1001 points",
            });
        }
        for pt in &self.quantiles {
            validate_finite("field_summary.quantiles.value", pt.value)?;
            if !(0.0..=1.0).contains(&pt.p) {
                return Err(ContractViolation::InvalidRange {
                    field: "field_summary.quantiles.p",
                    min: 0.0,
                    max: 1.0,
                    got: pt.p,
                });
            }
        }
        for pair in self.quantiles.windows(2) {
            if pair[1].p <= pair[0].p {
                return Err(ContractViolation::InvalidValue {
                    field: "field_summary.quantiles.p",
                    reason: "must be strictly increasing",
                });
            }
            if pair[1].value < pair[0].value {
                return Err(ContractViolation::InvalidValue {
                    field: "field_summary.quantiles.value",
                    reason: "must be non-decreasing",
                });
            }
        }
        Ok(())
    }
}

/// Per-field training baseline for one schema. Immutable once published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceDistribution {
    pub schema_id: SchemaId,
    pub reference_id: String,
    pub created_at: UnixTimeMs,
    pub fields: Vec<FieldSummary>,
}

impl ReferenceDistribution {
    pub fn v1(
        schema_id: SchemaId,
        reference_id: impl Into<String>,
        created_at: UnixTimeMs,
        fields: Vec<FieldSummary>,
    ) -> Result<Self, ContractViolation> {
        let r = Self {
            schema_id,
            reference_id: reference_id.into(),
            created_at,
            fields,
        };
        r.validate()?;
        Ok(r)
    }

    pub fn field(&self, name: &str) -> Option<&FieldSummary> {
        self.fields.iter().find(|f| f.name == name)
    }
}

impl Validate for ReferenceDistribution {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.schema_id.validate()?;
        if self.reference_id.is_empty() || self.reference_id.len() > 128 {
            return Err(ContractViolation::InvalidValue {
                field: "reference_distribution.reference_id",
                reason: "must be 1..=128 bytes",
            });
        }
        if self.fields.is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "reference_distribution.fields",
                reason: "must not be empty",
            });
        }
        let mut seen = BTreeSet::new();
        for f in &self.fields {
            f.validate()?;
            if !seen.insert(f.name.as_str()) {
                return Err(ContractViolation::InvalidValue {
                    field: "reference_distribution.fields.name",
                    reason: "must be unique",
                });
            }
        }
        Ok(())
    }
}
