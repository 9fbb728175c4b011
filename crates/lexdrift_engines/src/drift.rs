#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Instant;

use lexdrift_contracts::reference::{FieldSummary, ReferenceDistribution};
use lexdrift_contracts::report::{
    AggregateDrift, AggregatePolicy, DriftReport, DriftStatisticKind, DriftWarning, FieldDrift,
};
use lexdrift_contracts::schema::SchemaId;
use lexdrift_contracts::window::DriftWindow;
use lexdrift_contracts::{ContractViolation, Validate};
use serde::{Deserialize, Serialize};

pub const DEFAULT_DRIFT_THRESHOLD: f64 = 0.2;
pub const DEFAULT_ALERT_FRACTION: f64 = 0.3;
pub const DEFAULT_MIN_WINDOW_SIZE: usize = 30;
pub const PSI_CAP: f64 = 10.0;
pub const PSI_EPSILON: f64 = 1e-4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftThresholds {
    pub statistic: DriftStatisticKind,
    pub default_threshold: f64,
    /// Per-field overrides of `default_threshold`, keyed by field name.
    pub field_thresholds: BTreeMap<String, f64>,
    pub critical_fields: BTreeSet<String>,
    pub policy: AggregatePolicy,
    pub alert_fraction: f64,
    pub min_window_size: usize,
}

impl DriftThresholds {
    pub fn mvp_v1() -> Self {
        Self {
            statistic: DriftStatisticKind::KolmogorovSmirnov,
            default_threshold: DEFAULT_DRIFT_THRESHOLD,
            field_thresholds: BTreeMap::new(),
            critical_fields: BTreeSet::new(),
            policy: AggregatePolicy::FractionOrCritical,
            alert_fraction: DEFAULT_ALERT_FRACTION,
            min_window_size: DEFAULT_MIN_WINDOW_SIZE,
        }
    }

    pub fn threshold_for(&self, field: &str) -> f64 {
        self.field_thresholds
            .get(field)
            .copied()
            .unwrap_or(self.default_threshold)
    }
}

impl Validate for DriftThresholds {
    fn validate(&self) -> Result<(), ContractViolation> {
        if !self.default_threshold.is_finite() || self.default_threshold < 0.0 {
            return Err(ContractViolation::InvalidValue {
                field: "drift_thresholds.default_threshold",
                reason: "must be finite and >= 0",
            });
        }
        for t in self.field_thresholds.values() {
            if !t.is_finite() || *t < 0.0 {
                return Err(ContractViolation::InvalidValue {
                    field: "drift_thresholds.field_thresholds",
                    reason: "must be finite and >= 0",
                });
            }
        }
        if !(0.0..=1.0).contains(&self.alert_fraction) {
            return Err(ContractViolation::InvalidRange {
                field: "drift_thresholds.alert_fraction",
                min: 0.0,
                max: 1.0,
                got: self.alert_fraction,
            });
        }
        if self.min_window_size == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "drift_thresholds.min_window_size",
                reason: "must be >= 1",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DriftError {
    SchemaMismatch {
        reference: SchemaId,
        window: SchemaId,
        record_index: Option<usize>,
    },
    WidthMismatch {
        expected: usize,
        found: usize,
        record_index: usize,
    },
    /// The deadline passed between fields. No partial report is produced.
    Timeout { fields_done: usize, fields_total: usize },
    Contract(ContractViolation),
}

impl DriftError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl fmt::Display for DriftError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SchemaMismatch {
                reference,
                window,
                record_index: Some(i),
            } => write!(
                f,
                "schema mismatch at window record {i}: reference {reference}, record {window}"
            ),
            Self::SchemaMismatch {
                reference, window, ..
            } => write!(f, "schema mismatch: reference {reference}, window {window}"),
            Self::WidthMismatch {
                expected,
                found,
                record_index,
            } => write!(
                f,
                "width mismatch at window record {record_index}: expected {expected} values, found {found}"
            ),
            Self::Timeout {
                fields_done,
                fields_total,
            } => write!(
                f,
                "drift comparison timed out after {fields_done}/{fields_total} fields"
            ),
            Self::Contract(v) => write!(f, "contract violation: {v}"),
        }
    }
}

impl std::error::Error for DriftError {}

impl From<ContractViolation> for DriftError {
    fn from(value: ContractViolation) -> Self {
        Self::Contract(value)
    }
}

/// Stateless comparison of live windows against a reference baseline.
#[derive(Debug, Clone)]
pub struct DriftDetector {
    thresholds: DriftThresholds,
}

impl DriftDetector {
    pub fn new(thresholds: DriftThresholds) -> Result<Self, DriftError> {
        thresholds.validate()?;
        Ok(Self { thresholds })
    }

    pub fn thresholds(&self) -> &DriftThresholds {
        &self.thresholds
    }

    pub fn compare(
        &self,
        reference: &ReferenceDistribution,
        window: &DriftWindow,
    ) -> Result<DriftReport, DriftError> {
        self.run(reference, window, None)
    }

    pub fn compare_with_deadline(
        &self,
        reference: &ReferenceDistribution,
        window: &DriftWindow,
        deadline: Instant,
    ) -> Result<DriftReport, DriftError> {
        self.run(reference, window, Some(deadline))
    }

    fn run(
        &self,
        reference: &ReferenceDistribution,
        window: &DriftWindow,
        deadline: Option<Instant>,
    ) -> Result<DriftReport, DriftError> {
        let t = &self.thresholds;
        check_compatible(reference, window)?;

        let mut warnings = Vec::new();
        let known: BTreeSet<&str> = reference.fields.iter().map(|f| f.name.as_str()).collect();
        let configured: BTreeSet<&str> = t
            .field_thresholds
            .keys()
            .chain(t.critical_fields.iter())
            .map(String::as_str)
            .collect();
        for name in configured.difference(&known) {
            warnings.push(DriftWarning::UnknownField {
                name: (*name).to_string(),
            });
        }

        let insufficient = window.len() < t.min_window_size;
        if insufficient {
            warnings.push(DriftWarning::InsufficientSample {
                got: window.len(),
                required: t.min_window_size,
            });
        }

        let fields_total = reference.fields.len();
        let mut per_field = Vec::with_capacity(fields_total);
        for (index, summary) in reference.fields.iter().enumerate() {
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    log::warn!(
                        "drift comparison timed out: schema_id={} reference_id={} fields_done={index}/{fields_total}",
                        reference.schema_id,
                        reference.reference_id
                    );
                    return Err(DriftError::Timeout {
                        fields_done: index,
                        fields_total,
                    });
                }
            }
            let mut column = window.column(index);
            column.sort_by(f64::total_cmp);
            let statistic = match t.statistic {
                DriftStatisticKind::KolmogorovSmirnov => ks_distance(summary, &column),
                DriftStatisticKind::PopulationStability => psi(summary, &column),
            };
            let threshold = t.threshold_for(&summary.name);
            per_field.push(FieldDrift {
                name: summary.name.clone(),
                statistic,
                threshold,
                drifted: !insufficient && statistic > threshold,
                insufficient_sample: insufficient,
                critical: t.critical_fields.contains(&summary.name),
            });
        }

        let aggregate = aggregate_fields(&per_field, t, insufficient);
        let report = DriftReport {
            schema_id: reference.schema_id.clone(),
            reference_id: reference.reference_id.clone(),
            window_start: window.window_start,
            window_end: window.window_end,
            window_size: window.len(),
            statistic: t.statistic,
            per_field,
            aggregate,
            warnings,
        };
        log::info!(
            "drift compared: schema_id={} reference_id={} window_size={} drifted={}/{} alert={}",
            report.schema_id,
            report.reference_id,
            report.window_size,
            report.aggregate.drifted_fields,
            report.aggregate.evaluated_fields,
            report.aggregate.alert
        );
        Ok(report)
    }
}

pub fn compare(
    reference: &ReferenceDistribution,
    window: &DriftWindow,
    thresholds: &DriftThresholds,
) -> Result<DriftReport, DriftError> {
    DriftDetector::new(thresholds.clone())?.compare(reference, window)
}

fn check_compatible(
    reference: &ReferenceDistribution,
    window: &DriftWindow,
) -> Result<(), DriftError> {
    reference.validate()?;
    if reference.schema_id != window.schema_id {
        return Err(DriftError::SchemaMismatch {
            reference: reference.schema_id.clone(),
            window: window.schema_id.clone(),
            record_index: None,
        });
    }
    if window.window_start > window.window_end {
        return Err(DriftError::Contract(ContractViolation::InvalidValue {
            field: "drift_window.window_start",
            reason: "must be <= window_end",
        }));
    }
    let width = reference.fields.len();
    for (record_index, v) in window.vectors.iter().enumerate() {
        if v.schema_id != reference.schema_id {
            return Err(DriftError::SchemaMismatch {
                reference: reference.schema_id.clone(),
                window: v.schema_id.clone(),
                record_index: Some(record_index),
            });
        }
        if v.values.len() != width {
            return Err(DriftError::WidthMismatch {
                expected: width,
                found: v.values.len(),
                record_index,
            });
        }
        v.validate()?;
    }
    Ok(())
}

fn aggregate_fields(per_field: &[FieldDrift], t: &DriftThresholds, insufficient: bool) -> AggregateDrift {
    let evaluated: Vec<&FieldDrift> = per_field.iter().filter(|f| !f.insufficient_sample).collect();
    let drifted_fields = evaluated.iter().filter(|f| f.drifted).count();
    let drifted_fraction = if evaluated.is_empty() {
        0.0
    } else {
        drifted_fields as f64 / evaluated.len() as f64
    };
    let fraction_hit = !evaluated.is_empty() && drifted_fraction > t.alert_fraction;
    let critical_hit = evaluated.iter().any(|f| f.drifted && f.critical);

    let (alert, triggered_by) = match t.policy {
        AggregatePolicy::Fraction => (fraction_hit, triggers(&evaluated, fraction_hit, false)),
        AggregatePolicy::Critical => (critical_hit, triggers(&evaluated, false, critical_hit)),
        AggregatePolicy::FractionOrCritical => (
            fraction_hit || critical_hit,
            triggers(&evaluated, fraction_hit, critical_hit),
        ),
    };

    AggregateDrift {
        policy: t.policy,
        alert_fraction: t.alert_fraction,
        evaluated_fields: evaluated.len(),
        drifted_fields,
        drifted_fraction,
        triggered_by,
        insufficient_sample: insufficient,
        alert,
    }
}

fn triggers(evaluated: &[&FieldDrift], by_fraction: bool, by_critical: bool) -> Vec<String> {
    evaluated
        .iter()
        .filter(|f| f.drifted && (by_fraction || (by_critical && f.critical)))
        .map(|f| f.name.clone())
        .collect()
}

/// Sup distance between the window's empirical CDF and the reference CDF.
/// `sorted` must be ascending. An empty window scores 0.
pub fn ks_distance(reference: &FieldSummary, sorted: &[f64]) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let n = sorted.len() as f64;
    let mut sup = 0.0f64;
    // Both CDFs are monotone and the reference is linear between knots, so the
    // supremum is reached at a window value or a knot, from the right or the left.
    let candidates = sorted
        .iter()
        .copied()
        .chain(reference.quantiles.iter().map(|q| q.value));
    for x in candidates {
        let at_or_below = sorted.partition_point(|v| *v <= x) as f64 / n;
        let below = sorted.partition_point(|v| *v < x) as f64 / n;
        sup = sup
            .max((at_or_below - reference.cdf(x)).abs())
            .max((below - reference.cdf_left(x)).abs());
    }
    sup.clamp(0.0, 1.0)
}

/// Population stability index over bins cut at the distinct reference
/// quantile values, with open bins below and above the reference range.
pub fn psi(reference: &FieldSummary, sorted: &[f64]) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let mut edges: Vec<f64> = reference.quantiles.iter().map(|q| q.value).collect();
    edges.dedup();

    let bins = if edges.len() == 1 { 3 } else { edges.len() + 1 };
    let mut expected = vec![0.0f64; bins];
    if edges.len() == 1 {
        expected[1] = 1.0;
    } else {
        let inner = edges.len() - 1;
        for i in 0..inner {
            let upper = if i + 1 == inner {
                reference.cdf(edges[i + 1])
            } else {
                reference.cdf_left(edges[i + 1])
            };
            expected[1 + i] = (upper - reference.cdf_left(edges[i])).max(0.0);
        }
    }

    let mut actual = vec![0.0f64; bins];
    for &x in sorted {
        actual[psi_bin(&edges, x)] += 1.0;
    }
    let n = sorted.len() as f64;

    let mut total = 0.0;
    for (a, e) in actual.iter().zip(expected.iter()) {
        let a = (a / n).max(PSI_EPSILON);
        let e = e.max(PSI_EPSILON);
        total += (a - e) * (a / e).ln();
    }
    if total.is_finite() {
        total.clamp(0.0, PSI_CAP)
    } else {
        PSI_CAP
    }
}

fn psi_bin(edges: &[f64], x: f64) -> usize {
    let last = edges.len() - 1;
    if x < edges[0] {
        return 0;
    }
    if x > edges[last] {
        return if last == 0 { 2 } else { edges.len() };
    }
    if last == 0 {
        return 1;
    }
    let at_or_below = edges.partition_point(|e| *e <= x);
    1 + (at_or_below - 1).min(last - 1)
}
