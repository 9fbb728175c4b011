#![forbid(unsafe_code)]

use std::fmt;

use lexdrift_contracts::reference::{
    FieldSummary, QuantilePoint, ReferenceDistribution, MAX_QUANTILE_POINTS,
};
use lexdrift_contracts::schema::{FeatureSchema, SchemaId};
use lexdrift_contracts::vector::FeatureVector;
use lexdrift_contracts::{ContractViolation, UnixTimeMs, Validate};

pub const DEFAULT_QUANTILE_POINTS: usize = 21;

/// Tail probabilities used in place of 0 and 1 for normal approximations.
pub const NORMAL_TAIL_P: f64 = 0.001;

#[derive(Debug, Clone, PartialEq)]
pub enum BaselineError {
    InsufficientData { required: usize, got: usize },
    SchemaMismatch {
        expected: SchemaId,
        found: SchemaId,
        record_index: usize,
    },
    InvalidVector {
        record_index: usize,
        violation: ContractViolation,
    },
    Contract(ContractViolation),
}

impl fmt::Display for BaselineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientData { required, got } => write!(
                f,
                "insufficient data: {got} reference vectors, at least {required} required"
            ),
            Self::SchemaMismatch {
                expected,
                found,
                record_index,
            } => write!(
                f,
                "schema mismatch at record {record_index}: expected {expected}, found {found}"
            ),
            Self::InvalidVector {
                record_index,
                violation,
            } => write!(f, "invalid vector at record {record_index}: {violation}"),
            Self::Contract(v) => write!(f, "contract violation: {v}"),
        }
    }
}

impl std::error::Error for BaselineError {}

impl From<ContractViolation> for BaselineError {
    fn from(value: ContractViolation) -> Self {
        Self::Contract(value)
    }
}

/// Builds the per-field training baseline from vectors of one schema.
pub fn build_reference(
    schema: &FeatureSchema,
    vectors: &[FeatureVector],
    reference_id: &str,
    created_at: UnixTimeMs,
    quantile_points: usize,
) -> Result<ReferenceDistribution, BaselineError> {
    validate_quantile_points(quantile_points)?;
    if vectors.is_empty() {
        return Err(BaselineError::InsufficientData {
            required: 1,
            got: 0,
        });
    }
    for (record_index, v) in vectors.iter().enumerate() {
        if &v.schema_id != schema.schema_id() {
            return Err(BaselineError::SchemaMismatch {
                expected: schema.schema_id().clone(),
                found: v.schema_id.clone(),
                record_index,
            });
        }
        v.validate_against(schema)
            .map_err(|violation| BaselineError::InvalidVector {
                record_index,
                violation,
            })?;
    }

    let mut fields = Vec::with_capacity(schema.len());
    let mut column = Vec::with_capacity(vectors.len());
    for spec in schema.fields() {
        column.clear();
        column.extend(vectors.iter().map(|v| v.values[spec.index]));
        column.sort_by(f64::total_cmp);
        fields.push(summarize_sorted(&spec.name, &column, quantile_points));
    }

    let reference = ReferenceDistribution::v1(
        schema.schema_id().clone(),
        reference_id,
        created_at,
        fields,
    )?;
    log::info!(
        "reference built: schema_id={} reference_id={} fields={} sample={}",
        reference.schema_id,
        reference.reference_id,
        reference.fields.len(),
        vectors.len()
    );
    Ok(reference)
}

fn summarize_sorted(name: &str, sorted: &[f64], quantile_points: usize) -> FieldSummary {
    let n = sorted.len();
    let min = sorted[0];
    let max = sorted[n - 1];
    let mean = sorted.iter().sum::<f64>() / n as f64;
    if min == max {
        return FieldSummary::point_mass(name, min, n as u64);
    }
    let variance = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;

    let last = (quantile_points - 1) as f64;
    let quantiles = (0..quantile_points)
        .map(|i| {
            let p = i as f64 / last;
            QuantilePoint {
                p,
                value: quantile_type7(sorted, p),
            }
        })
        .collect();
    FieldSummary {
        name: name.to_string(),
        count: n as u64,
        mean: mean.clamp(min, max),
        std_dev: variance.sqrt(),
        min,
        max,
        quantiles,
    }
}

/// Linear interpolation between closest ranks (Hyndman-Fan type 7).
fn quantile_type7(sorted: &[f64], p: f64) -> f64 {
    let h = (sorted.len() - 1) as f64 * p;
    let lo = h.floor() as usize;
    let hi = (lo + 1).min(sorted.len() - 1);
    let t = h - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * t
}

/// Normal-approximation summary for a field known only by its moments.
/// A zero standard deviation yields a point mass.
pub fn summary_from_moments(
    name: &str,
    mean: f64,
    std_dev: f64,
    count: u64,
    quantile_points: usize,
) -> Result<FieldSummary, ContractViolation> {
    validate_quantile_points(quantile_points)?;
    if !mean.is_finite() || !std_dev.is_finite() {
        return Err(ContractViolation::NotFinite {
            field: "field_summary.moments",
        });
    }
    if std_dev < 0.0 {
        return Err(ContractViolation::InvalidRange {
            field: "field_summary.std_dev",
            min: 0.0,
            max: f64::MAX,
            got: std_dev,
        });
    }
    if std_dev == 0.0 {
        let s = FieldSummary::point_mass(name, mean, count);
        s.validate()?;
        return Ok(s);
    }

    let last = (quantile_points - 1) as f64;
    let quantiles: Vec<QuantilePoint> = (0..quantile_points)
        .map(|i| {
            let p = i as f64 / last;
            let tail = p.clamp(NORMAL_TAIL_P, 1.0 - NORMAL_TAIL_P);
            QuantilePoint {
                p,
                value: mean + std_dev * probit(tail),
            }
        })
        .collect();
    let min = quantiles[0].value;
    let max = quantiles[quantiles.len() - 1].value;
    let s = FieldSummary {
        name: name.to_string(),
        count,
        mean,
        std_dev,
        min,
        max,
        quantiles,
    };
    s.validate()?;
    Ok(s)
}

fn validate_quantile_points(k: usize) -> Result<(), ContractViolation> {
    if !(2..=MAX_QUANTILE_POINTS).contains(&k) {
        return Err(ContractViolation::InvalidValue {
            field: "baseline.quantile_points",
            reason: "must be within 2..=1001",
        });
    }
    Ok(())
}

/// Inverse standard normal CDF (Acklam's rational approximation, relative
/// error below 1.2e-9). `p` must lie strictly inside (0, 1).
pub fn probit(p: f64) -> f64 {
    const A: [f64; 6] = [
        -3.969_683_028_665_376e1,
        2.209_460_984_245_205e2,
        -2.759_285_104_469_687e2,
        1.383_577_518_672_690e2,
        -3.066_479_806_614_716e1,
        2.506_628_277_459_239,
    ];
    const B: [f64; 5] = [
        -5.447_609_879_822_406e1,
        1.615_858_368_580_409e2,
        -1.556_989_798_598_866e2,
        6.680_131_188_771_972e1,
        -1.328_068_155_288_572e1,
    ];
    const C: [f64; 6] = [
        -7.784_894_002_430_293e-3,
        -3.223_964_580_411_365e-1,
        -2.400_758_277_161_838,
        -2.549_732_539_343_734,
        4.374_664_141_464_968,
        2.938_163_982_698_783,
    ];
    const D: [f64; 4] = [
        7.784_695_709_041_462e-3,
        3.224_671_290_700_398e-1,
        2.445_134_137_142_996,
        3.754_408_661_907_416,
    ];
    const P_LOW: f64 = 0.024_25;

    if p < P_LOW {
        let q = (-2.0 * p.ln()).sqrt();
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    } else if p <= 1.0 - P_LOW {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        let q = (-2.0 * (1.0 - p).ln()).sqrt();
        -(((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    }
}
