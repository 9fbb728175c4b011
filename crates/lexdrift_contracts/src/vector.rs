#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::schema::{FeatureSchema, SchemaId};
use crate::{ContractViolation, Validate};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub schema_id: SchemaId,
    pub values: Vec<f64>,
}

impl FeatureVector {
    pub fn new(schema_id: SchemaId, values: Vec<f64>) -> Self {
        Self { schema_id, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, schema: &FeatureSchema, name: &str) -> Option<f64> {
        if schema.schema_id() != &self.schema_id {
            return None;
        }
        schema
            .field_index(name)
            .and_then(|idx| self.values.get(idx).copied())
    }

    /// Checks id, width and per-field domain against `schema`.
    pub fn validate_against(&self, schema: &FeatureSchema) -> Result<(), ContractViolation> {
        self.validate()?;
        if &self.schema_id != schema.schema_id() {
            return Err(ContractViolation::InvalidValue {
                field: "feature_vector.schema_id",
                reason: "must match the schema id",
            });
        }
        if self.values.len() != schema.len() {
            return Err(ContractViolation::InvalidValue {
                field: "feature_vector.values",
                reason: "length must equal the schema field count",
            });
        }
        for (value, spec) in self.values.iter().zip(schema.fields()) {
            if !spec.domain.admits(*value) {
                return Err(ContractViolation::InvalidValue {
                    field: "feature_vector.values",
                    reason: "value is outside the field domain",
                });
            }
        }
        Ok(())
    }

    pub fn to_csv_row(&self) -> String {
        self.values
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl Validate for FeatureVector {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.schema_id.validate()?;
        if self.values.iter().any(|v| !v.is_finite()) {
            return Err(ContractViolation::NotFinite {
                field: "feature_vector.values",
            });
        }
        Ok(())
    }
}

/// Header row in schema order. Names with separators or quotes are quoted.
pub fn csv_header(schema: &FeatureSchema) -> String {
    schema
        .field_names()
        .map(csv_escape)
        .collect::<Vec<_>>()
        .join(",")
}

fn csv_escape(raw: &str) -> String {
    if raw.contains(&[',', '"', '\n', '\r'][..]) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}
