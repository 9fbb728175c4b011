#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet};

use lexdrift_contracts::corpus::CorpusRecord;
use lexdrift_contracts::{ContractViolation, Validate};
use serde::{Deserialize, Serialize};

/// Acceptance rules for a training corpus, checked before fitting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusRules {
    pub min_rows: usize,
    pub min_text_chars: usize,
    pub max_text_chars: usize,
    /// Empty means any label (or none) is accepted.
    pub allowed_labels: BTreeSet<String>,
}

impl CorpusRules {
    pub fn mvp_v1() -> Self {
        Self {
            min_rows: 10,
            min_text_chars: 10,
            max_text_chars: 100_000,
            allowed_labels: BTreeSet::new(),
        }
    }
}

impl Validate for CorpusRules {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.min_rows == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "corpus_rules.min_rows",
                reason: "must be >= 1",
            });
        }
        if self.max_text_chars < self.min_text_chars || self.max_text_chars == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "corpus_rules.max_text_chars",
                reason: "must be > 0 and >= min_text_chars",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CorpusValidation {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub row_count: usize,
    pub usable_count: usize,
    pub duplicate_count: usize,
    pub label_counts: BTreeMap<String, usize>,
}

/// Collects every problem instead of stopping at the first. Row numbers in
/// messages are zero-based input positions.
pub fn validate_corpus(corpus: &[CorpusRecord], rules: &CorpusRules) -> CorpusValidation {
    let mut out = CorpusValidation {
        row_count: corpus.len(),
        ..CorpusValidation::default()
    };
    let mut seen = BTreeSet::new();
    let mut short_rows = Vec::new();
    let mut long_rows = Vec::new();

    for (row, rec) in corpus.iter().enumerate() {
        if let Some(label) = &rec.label {
            *out.label_counts.entry(label.clone()).or_insert(0) += 1;
            if !rules.allowed_labels.is_empty() && !rules.allowed_labels.contains(label) {
                out.errors
                    .push(format!("row {row}: label {label:?} is not allowed"));
            }
        }
        let chars = rec.text.trim().chars().count();
        if chars == 0 || chars < rules.min_text_chars {
            short_rows.push(row);
            continue;
        }
        if chars > rules.max_text_chars {
            long_rows.push(row);
            continue;
        }
        if !seen.insert(rec.text.as_str()) {
            out.duplicate_count += 1;
            continue;
        }
        out.usable_count += 1;
    }

    if corpus.len() < rules.min_rows {
        out.errors.push(format!(
            "corpus has {} rows, at least {} required",
            corpus.len(),
            rules.min_rows
        ));
    }
    if !short_rows.is_empty() {
        out.errors.push(format!(
            "{} texts shorter than {} characters (first at row {})",
            short_rows.len(),
            rules.min_text_chars,
            short_rows[0]
        ));
    }
    if !long_rows.is_empty() {
        out.errors.push(format!(
            "{} texts longer than {} characters (first at row {})",
            long_rows.len(),
            rules.max_text_chars,
            long_rows[0]
        ));
    }
    if out.duplicate_count > 0 {
        out.warnings
            .push(format!("{} duplicate texts", out.duplicate_count));
    }
    out.is_valid = out.errors.is_empty();
    log::info!(
        "corpus validated: rows={} usable={} duplicates={} errors={} warnings={}",
        out.row_count,
        out.usable_count,
        out.duplicate_count,
        out.errors.len(),
        out.warnings.len()
    );
    out
}

/// The documents fitting learns from: non-blank, at least `min_text_chars`
/// after trimming, first occurrence of each exact text, in input order.
pub fn usable_texts(corpus: &[CorpusRecord], min_text_chars: usize) -> Vec<&str> {
    let mut seen = BTreeSet::new();
    corpus
        .iter()
        .map(|r| r.text.as_str())
        .filter(|text| {
            let chars = text.trim().chars().count();
            chars > 0 && chars >= min_text_chars
        })
        .filter(|text| seen.insert(*text))
        .collect()
}
