#![forbid(unsafe_code)]

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::common::sha256_hex;
use crate::{ContractViolation, SchemaVersion, Validate};

/// Feature-family semantics. Bump when a family's computation rules change.
pub const FEATURE_SCHEMA_VERSION: SchemaVersion = SchemaVersion(1);

/// Reported for readability indices when the text has no sentence or no word.
pub const READABILITY_UNDEFINED: f64 = -1000.0;

pub const MAX_SCHEMA_FIELDS: usize = 8192;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaId(String);

impl SchemaId {
    pub fn new(raw: impl Into<String>) -> Result<Self, ContractViolation> {
        let id = Self(raw.into());
        id.validate()?;
        Ok(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for SchemaId {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.0.is_empty() || self.0.len() > 128 {
            return Err(ContractViolation::InvalidValue {
                field: "schema_id",
                reason: "must be 1..=128 bytes",
            });
        }
        if !self.0.chars().all(|c| c.is_ascii_graphic()) {
            return Err(ContractViolation::InvalidValue {
                field: "schema_id",
                reason: "must be printable ascii without spaces",
            });
        }
        Ok(())
    }
}

impl fmt::Display for SchemaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldDomain {
    /// Non-negative integer.
    Count,
    /// Real within [0, 1].
    Ratio,
    NonNegative,
    Real,
    /// Real, or exactly [`READABILITY_UNDEFINED`].
    Readability,
}

impl FieldDomain {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldDomain::Count => "count",
            FieldDomain::Ratio => "ratio",
            FieldDomain::NonNegative => "non_negative",
            FieldDomain::Real => "real",
            FieldDomain::Readability => "readability",
        }
    }

    pub fn admits(&self, value: f64) -> bool {
        if !value.is_finite() {
            return false;
        }
        match self {
            FieldDomain::Count => value >= 0.0 && value.fract() == 0.0,
            FieldDomain::Ratio => (0.0..=1.0).contains(&value),
            FieldDomain::NonNegative => value >= 0.0,
            FieldDomain::Real | FieldDomain::Readability => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub index: usize,
    pub domain: FieldDomain,
}

/// Ordered, immutable field layout shared by every vector, reference and
/// window that carries its id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    schema_id: SchemaId,
    version: SchemaVersion,
    fields: Vec<FieldSpec>,
}

impl FeatureSchema {
    pub fn v1(fields: Vec<(String, FieldDomain)>) -> Result<Self, ContractViolation> {
        Self::with_version(FEATURE_SCHEMA_VERSION, fields)
    }

    pub fn with_version(
        version: SchemaVersion,
        fields: Vec<(String, FieldDomain)>,
    ) -> Result<Self, ContractViolation> {
        let fields = fields
            .into_iter()
            .enumerate()
            .map(|(index, (name, domain))| FieldSpec {
                name,
                index,
                domain,
            })
            .collect::<Vec<_>>();
        let schema = Self {
            schema_id: fingerprint(version, &fields)?,
            version,
            fields,
        };
        schema.validate()?;
        Ok(schema)
    }

    pub fn schema_id(&self) -> &SchemaId {
        &self.schema_id
    }

    pub fn version(&self) -> SchemaVersion {
        self.version
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }
}

impl Validate for FeatureSchema {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.schema_id.validate()?;
        if self.fields.is_empty() || self.fields.len() > MAX_SCHEMA_FIELDS {
            return Err(ContractViolation::InvalidValue {
                field: "feature_schema.fields",
                reason: "must contain 1..=8192 fields",
            });
        }
        let mut seen = BTreeSet::new();
        for (position, spec) in self.fields.iter().enumerate() {
            if spec.name.is_empty() || spec.name.len() > 128 {
                return Err(ContractViolation::InvalidValue {
                    field: "feature_schema.fields.name",
                    reason: "must be 1..=128 bytes",
                });
            }
            if spec.index != position {
                return Err(ContractViolation::InvalidValue {
                    field: "feature_schema.fields.index",
                    reason: "must equal the field position",
                });
            }
            if !seen.insert(spec.name.as_str()) {
                return Err(ContractViolation::InvalidValue {
                    field: "feature_schema.fields.name",
                    reason: "must be unique",
                });
            }
        }
        if fingerprint(self.version, &self.fields)? != self.schema_id {
            return Err(ContractViolation::InvalidValue {
                field: "feature_schema.schema_id",
                reason: "must match the fingerprint of version and fields",
            });
        }
        Ok(())
    }
}

fn fingerprint(
    version: SchemaVersion,
    fields: &[FieldSpec],
) -> Result<SchemaId, ContractViolation> {
    let mut canonical = String::new();
    for spec in fields {
        canonical.push_str(&spec.name);
        canonical.push('\u{1f}');
        canonical.push_str(spec.domain.as_str());
        canonical.push('\u{1e}');
    }
    let digest = sha256_hex(canonical.as_bytes());
    SchemaId::new(format!("lexdrift.v{}-{}", version.0, &digest[..16]))
}
