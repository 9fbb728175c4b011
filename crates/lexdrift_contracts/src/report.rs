#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::common::validate_finite;
use crate::schema::SchemaId;
use crate::{ContractViolation, UnixTimeMs, Validate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DriftStatisticKind {
    /// Kolmogorov-Smirnov distance, in [0, 1].
    #[serde(rename = "ks")]
    KolmogorovSmirnov,
    /// Population stability index over reference quantile bins, capped.
    #[serde(rename = "psi")]
    PopulationStability,
}

/// How per-field drift flags turn into the overall alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregatePolicy {
    /// Alert when the drifted fraction of evaluated fields exceeds `alert_fraction`.
    Fraction,
    /// Alert when any field configured as critical drifted.
    Critical,
    FractionOrCritical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDrift {
    pub name: String,
    pub statistic: f64,
    pub threshold: f64,
    pub drifted: bool,
    pub insufficient_sample: bool,
    pub critical: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateDrift {
    pub policy: AggregatePolicy,
    pub alert_fraction: f64,
    pub evaluated_fields: usize,
    pub drifted_fields: usize,
    pub drifted_fraction: f64,
    /// Field names that caused the alert, in schema order.
    pub triggered_by: Vec<String>,
    pub insufficient_sample: bool,
    pub alert: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DriftWarning {
    InsufficientSample { got: usize, required: usize },
    /// A threshold override or critical field names no schema field.
    UnknownField { name: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftReport {
    pub schema_id: SchemaId,
    pub reference_id: String,
    pub window_start: UnixTimeMs,
    pub window_end: UnixTimeMs,
    pub window_size: usize,
    pub statistic: DriftStatisticKind,
    pub per_field: Vec<FieldDrift>,
    pub aggregate: AggregateDrift,
    pub warnings: Vec<DriftWarning>,
}

impl DriftReport {
    pub fn field(&self, name: &str) -> Option<&FieldDrift> {
        self.per_field.iter().find(|f| f.name == name)
    }

    pub fn drifted_field_names(&self) -> Vec<&str> {
        self.per_field
            .iter()
            .filter(|f| f.drifted)
            .map(|f| f.name.as_str())
            .collect()
    }
}

impl Validate for DriftReport {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.schema_id.validate()?;
        for f in &self.per_field {
            validate_finite("drift_report.per_field.statistic", f.statistic)?;
            validate_finite("drift_report.per_field.threshold", f.threshold)?;
            if f.drifted && f.insufficient_sample {
                return Err(ContractViolation::InvalidValue {
                    field: "drift_report.per_field.drifted",
                    reason: "must be false when insufficient_sample=true",
                });
            }
        }
        validate_finite(
            "drift_report.aggregate.drifted_fraction",
            self.aggregate.drifted_fraction,
        )?;
        if !(0.0..=1.0).contains(&self.aggregate.drifted_fraction) {
            return Err(ContractViolation::InvalidRange {
                field: "drift_report.aggregate.drifted_fraction",
                min: 0.0,
                max: 1.0,
                got: self.aggregate.drifted_fraction,
            });
        }
        if self.aggregate.drifted_fields > self.aggregate.evaluated_fields {
            return Err(ContractViolation::InvalidValue {
                field: "drift_report.aggregate.drifted_fields",
                reason: "must be <= evaluated_fields",
            });
        }
        Ok(())
    }
}
