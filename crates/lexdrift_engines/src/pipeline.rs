#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use lexdrift_contracts::common::{hex_lower, validate_sha256};
use lexdrift_contracts::corpus::CorpusRecord;
use lexdrift_contracts::schema::{FeatureSchema, FieldDomain, SchemaId, READABILITY_UNDEFINED};
use lexdrift_contracts::vector::FeatureVector;
use lexdrift_contracts::{ContractViolation, Validate};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::text_stats::{symbol_counts, TextStats};

pub mod field_names {
    pub const CHAR_COUNT: &str = "char_count";
    pub const WORD_COUNT: &str = "word_count";
    pub const SENTENCE_COUNT: &str = "sentence_count";
    pub const AVG_WORD_LENGTH: &str = "avg_word_length";
    pub const TTR: &str = "ttr";
    pub const FLESCH_READING_EASE: &str = "flesch_reading_ease";
    pub const FLESCH_KINCAID_GRADE: &str = "flesch_kincaid_grade";
    pub const AUTOMATED_READABILITY_INDEX: &str = "automated_readability_index";

    pub fn punct_density(symbol: char) -> String {
        format!("punct_density[{symbol}]")
    }

    pub fn tfidf(term: &str) -> String {
        format!("tfidf[{term}]")
    }

    pub fn embed(index: usize) -> String {
        format!("embed[{index}]")
    }
}

/// Computed readability indices are clamped to this magnitude so that they can
/// never collide with [`READABILITY_UNDEFINED`].
pub const READABILITY_CLAMP: f64 = 999.0;

pub const MAX_VOCABULARY_SIZE: usize = 4096;
pub const MAX_EMBEDDING_DIM: usize = 1024;
pub const MAX_TERM_BYTES: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFamilies {
    pub lexical_counts: bool,
    pub punctuation: bool,
    pub readability: bool,
    pub term_weights: bool,
    pub hashed_embedding: bool,
}

impl FeatureFamilies {
    pub fn all() -> Self {
        Self {
            lexical_counts: true,
            punctuation: true,
            readability: true,
            term_weights: true,
            hashed_embedding: true,
        }
    }

    pub fn any(&self) -> bool {
        self.lexical_counts
            || self.punctuation
            || self.readability
            || self.term_weights
            || self.hashed_embedding
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub families: FeatureFamilies,
    pub punctuation_symbols: Vec<char>,
    /// Top-K terms kept for the term-weight family.
    pub vocabulary_size: usize,
    pub min_document_frequency: u32,
    pub embedding_dim: usize,
    /// Fit refuses corpora with fewer usable distinct documents.
    pub min_corpus_size: usize,
    pub min_text_chars: usize,
    pub max_input_bytes: usize,
}

impl PipelineConfig {
    pub fn mvp_v1() -> Self {
        Self {
            families: FeatureFamilies::all(),
            punctuation_symbols: vec!['.', ',', '!', '?', ';', ':', '\'', '"', '-', '(', ')'],
            vocabulary_size: 32,
            min_document_frequency: 2,
            embedding_dim: 16,
            min_corpus_size: 10,
            min_text_chars: 1,
            max_input_bytes: 1 << 20,
        }
    }
}

impl Validate for PipelineConfig {
    fn validate(&self) -> Result<(), ContractViolation> {
        if !self.families.any() {
            return Err(ContractViolation::InvalidValue {
                field: "pipeline_config.families",
                reason: "at least one feature family must be enabled",
            });
        }
        if self.families.punctuation {
            if self.punctuation_symbols.is_empty() {
                return Err(ContractViolation::InvalidValue {
                    field: "pipeline_config.punctuation_symbols",
                    reason: "must not be empty when the punctuation family is enabled",
                });
            }
            let unique: BTreeSet<char> = self.punctuation_symbols.iter().copied().collect();
            if unique.len() != self.punctuation_symbols.len() {
                return Err(ContractViolation::InvalidValue {
                    field: "pipeline_config.punctuation_symbols",
                    reason: "must be unique",
                });
            }
            if self.punctuation_symbols.iter().any(|c| c.is_alphanumeric()) {
                return Err(ContractViolation::InvalidValue {
                    field: "pipeline_config.punctuation_symbols",
                    reason: "must not contain alphanumeric characters",
                });
            }
        }
        if self.families.term_weights {
            if self.vocabulary_size == 0 || self.vocabulary_size > MAX_VOCABULARY_SIZE {
                return Err(ContractViolation::InvalidValue {
                    field: "pipeline_config.vocabulary_size",
                    reason: "must be within 1..=4096",
                });
            }
            if self.min_document_frequency == 0 {
                return Err(ContractViolation::InvalidValue {
                    field: "pipeline_config.min_document_frequency",
                    reason: "must be >= 1",
                });
            }
        }
        if self.families.hashed_embedding
            && (self.embedding_dim == 0 || self.embedding_dim > MAX_EMBEDDING_DIM)
        {
            return Err(ContractViolation::InvalidValue {
                field: "pipeline_config.embedding_dim",
                reason: "must be within 1..=1024",
            });
        }
        if self.min_corpus_size == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "pipeline_config.min_corpus_size",
                reason: "must be >= 1",
            });
        }
        if self.max_input_bytes == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "pipeline_config.max_input_bytes",
                reason: "must be > 0",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocabularyTerm {
    pub term: String,
    pub document_frequency: u32,
    pub idf: f64,
}

/// Corpus-fitted terms in rank order (document frequency desc, then term asc).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Vocabulary {
    pub documents: u64,
    pub terms: Vec<VocabularyTerm>,
}

impl Vocabulary {
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FitSummary {
    pub documents_seen: u64,
    pub documents_used: u64,
    pub duplicates_skipped: u64,
    pub too_short_skipped: u64,
    pub label_counts: BTreeMap<String, u64>,
}

/// Immutable artifact bundle produced by [`FeaturePipeline::fit`]. Read-only
/// after construction and safe to share across threads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedPipeline {
    schema: FeatureSchema,
    config: PipelineConfig,
    vocabulary: Vocabulary,
    corpus_sha256: String,
    summary: FitSummary,
}

impl FittedPipeline {
    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn schema_id(&self) -> &SchemaId {
        self.schema.schema_id()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn corpus_sha256(&self) -> &str {
        &self.corpus_sha256
    }

    pub fn summary(&self) -> &FitSummary {
        &self.summary
    }

    pub fn transform(&self, text: &str) -> FeatureVector {
        transform(text, self)
    }
}

impl Validate for FittedPipeline {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.config.validate()?;
        self.schema.validate()?;
        validate_sha256("fitted_pipeline.corpus_sha256", &self.corpus_sha256)?;
        for t in &self.vocabulary.terms {
            if !t.idf.is_finite() || t.idf <= 0.0 {
                return Err(ContractViolation::NotFinite {
                    field: "fitted_pipeline.vocabulary.idf",
                });
            }
        }
        if schema_for(&self.config, &self.vocabulary)? != self.schema {
            return Err(ContractViolation::InvalidValue {
                field: "fitted_pipeline.schema",
                reason: "must match the schema derived from config and vocabulary",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    InsufficientData { required: usize, got: usize },
    MalformedInput { reason: String },
    Contract(ContractViolation),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientData { required, got } => write!(
                f,
                "insufficient data: {got} usable documents, at least {required} required"
            ),
            Self::MalformedInput { reason } => write!(f, "malformed input: {reason}"),
            Self::Contract(v) => write!(f, "contract violation: {v}"),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<ContractViolation> for PipelineError {
    fn from(value: ContractViolation) -> Self {
        Self::Contract(value)
    }
}

/// Field layout implied by `config` and a fitted vocabulary.
pub fn schema_for(
    config: &PipelineConfig,
    vocabulary: &Vocabulary,
) -> Result<FeatureSchema, ContractViolation> {
    let mut fields = Vec::new();
    if config.families.lexical_counts {
        fields.push((field_names::CHAR_COUNT.to_string(), FieldDomain::Count));
        fields.push((field_names::WORD_COUNT.to_string(), FieldDomain::Count));
        fields.push((field_names::SENTENCE_COUNT.to_string(), FieldDomain::Count));
        fields.push((
            field_names::AVG_WORD_LENGTH.to_string(),
            FieldDomain::NonNegative,
        ));
        fields.push((field_names::TTR.to_string(), FieldDomain::Ratio));
    }
    if config.families.punctuation {
        for sym in &config.punctuation_symbols {
            fields.push((field_names::punct_density(*sym), FieldDomain::Ratio));
        }
    }
    if config.families.readability {
        for name in [
            field_names::FLESCH_READING_EASE,
            field_names::FLESCH_KINCAID_GRADE,
            field_names::AUTOMATED_READABILITY_INDEX,
        ] {
            fields.push((name.to_string(), FieldDomain::Readability));
        }
    }
    if config.families.term_weights {
        for t in &vocabulary.terms {
            fields.push((field_names::tfidf(&t.term), FieldDomain::NonNegative));
        }
    }
    if config.families.hashed_embedding {
        for i in 0..config.embedding_dim {
            fields.push((field_names::embed(i), FieldDomain::Real));
        }
    }
    FeatureSchema::v1(fields)
}

#[derive(Debug, Clone)]
pub struct FeaturePipeline {
    config: PipelineConfig,
}

impl FeaturePipeline {
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Fits corpus-dependent artifacts and freezes the schema.
    ///
    /// Documents shorter than `min_text_chars` (after trimming) are skipped;
    /// exact duplicates count once. The corpus hash covers every record as
    /// given, in order.
    pub fn fit(&self, corpus: &[CorpusRecord]) -> Result<FittedPipeline, PipelineError> {
        let cfg = &self.config;
        let corpus_sha256 = corpus_digest(corpus);

        let mut summary = FitSummary {
            documents_seen: corpus.len() as u64,
            ..FitSummary::default()
        };
        let mut seen = BTreeSet::new();
        let mut usable: Vec<&str> = Vec::new();
        for rec in corpus {
            if let Some(label) = &rec.label {
                *summary.label_counts.entry(label.clone()).or_insert(0) += 1;
            }
            let trimmed_chars = rec.text.trim().chars().count();
            if trimmed_chars == 0 || trimmed_chars < cfg.min_text_chars {
                summary.too_short_skipped += 1;
                continue;
            }
            if !seen.insert(rec.text.as_str()) {
                summary.duplicates_skipped += 1;
                continue;
            }
            usable.push(rec.text.as_str());
        }
        summary.documents_used = usable.len() as u64;

        if usable.len() < cfg.min_corpus_size {
            log::warn!(
                "fit refused: usable_documents={} min_corpus_size={} documents_seen={}",
                usable.len(),
                cfg.min_corpus_size,
                corpus.len()
            );
            return Err(PipelineError::InsufficientData {
                required: cfg.min_corpus_size,
                got: usable.len(),
            });
        }

        let vocabulary = if cfg.families.term_weights {
            fit_vocabulary(&usable, cfg)
        } else {
            Vocabulary::default()
        };
        let schema = schema_for(cfg, &vocabulary)?;
        log::info!(
            "fit complete: schema_id={} fields={} documents_used={} vocabulary={} corpus_sha256={}",
            schema.schema_id(),
            schema.len(),
            summary.documents_used,
            vocabulary.len(),
            corpus_sha256
        );

        Ok(FittedPipeline {
            schema,
            config: cfg.clone(),
            vocabulary,
            corpus_sha256,
            summary,
        })
    }
}

pub fn fit(corpus: &[CorpusRecord], config: &PipelineConfig) -> Result<FittedPipeline, PipelineError> {
    FeaturePipeline::new(config.clone())?.fit(corpus)
}

fn corpus_digest(corpus: &[CorpusRecord]) -> String {
    let mut hasher = Sha256::new();
    for rec in corpus {
        hasher.update((rec.text.len() as u64).to_le_bytes());
        hasher.update(rec.text.as_bytes());
    }
    hex_lower(&hasher.finalize())
}

fn fit_vocabulary(documents: &[&str], cfg: &PipelineConfig) -> Vocabulary {
    let mut df: BTreeMap<String, u32> = BTreeMap::new();
    for doc in documents {
        let stats = TextStats::analyze(doc);
        let distinct: BTreeSet<&str> = stats.words.iter().map(String::as_str).collect();
        for term in distinct {
            if term.len() > MAX_TERM_BYTES {
                continue;
            }
            *df.entry(term.to_string()).or_insert(0) += 1;
        }
    }

    let mut ranked = df
        .into_iter()
        .filter(|(_, count)| *count >= cfg.min_document_frequency)
        .collect::<Vec<_>>();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(cfg.vocabulary_size);

    let n = documents.len() as f64;
    let terms = ranked
        .into_iter()
        .map(|(term, document_frequency)| VocabularyTerm {
            idf: ((1.0 + n) / (1.0 + f64::from(document_frequency))).ln() + 1.0,
            term,
            document_frequency,
        })
        .collect();
    Vocabulary {
        documents: documents.len() as u64,
        terms,
    }
}

/// Pure function of `text` and `fitted`. Degenerate text yields zeros for
/// counts and ratios and [`READABILITY_UNDEFINED`] for readability indices.
pub fn transform(text: &str, fitted: &FittedPipeline) -> FeatureVector {
    let cfg = &fitted.config;
    let stats = TextStats::analyze(text);
    let mut values = Vec::with_capacity(fitted.schema.len());

    if cfg.families.lexical_counts {
        push_lexical_counts(&stats, &mut values);
    }
    if cfg.families.punctuation {
        let denom = stats.char_count.max(1) as f64;
        for count in symbol_counts(text, &cfg.punctuation_symbols) {
            values.push(count as f64 / denom);
        }
    }
    if cfg.families.readability {
        push_readability(&stats, &mut values);
    }
    if cfg.families.term_weights {
        push_term_weights(&stats, &fitted.vocabulary, &mut values);
    }
    if cfg.families.hashed_embedding {
        push_embedding(&stats, cfg.embedding_dim, &mut values);
    }

    for v in values.iter_mut() {
        if !v.is_finite() {
            *v = 0.0;
        }
    }
    FeatureVector::new(fitted.schema.schema_id().clone(), values)
}

/// Byte-level entry point for payloads that may not be text.
pub fn transform_bytes(bytes: &[u8], fitted: &FittedPipeline) -> Result<FeatureVector, PipelineError> {
    let limit = fitted.config.max_input_bytes;
    if bytes.len() > limit {
        return Err(PipelineError::MalformedInput {
            reason: format!("payload of {} bytes exceeds limit {limit}", bytes.len()),
        });
    }
    if let Some(pos) = bytes.iter().position(|b| *b == 0) {
        return Err(PipelineError::MalformedInput {
            reason: format!("binary payload: NUL byte at offset {pos}"),
        });
    }
    let text = std::str::from_utf8(bytes).map_err(|e| PipelineError::MalformedInput {
        reason: format!("invalid utf-8 after {} bytes", e.valid_up_to()),
    })?;
    Ok(transform(text, fitted))
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordFailure {
    pub index: usize,
    pub error: PipelineError,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BatchTransform {
    /// Successful vectors with their input index, in input order.
    pub vectors: Vec<(usize, FeatureVector)>,
    pub failures: Vec<RecordFailure>,
}

/// One bad record never aborts the batch.
pub fn transform_batch<T: AsRef<[u8]>>(records: &[T], fitted: &FittedPipeline) -> BatchTransform {
    let mut out = BatchTransform::default();
    for (index, rec) in records.iter().enumerate() {
        match transform_bytes(rec.as_ref(), fitted) {
            Ok(v) => out.vectors.push((index, v)),
            Err(error) => {
                log::warn!(
                    "transform failed: schema_id={} record_index={index} error={error}",
                    fitted.schema_id()
                );
                out.failures.push(RecordFailure { index, error });
            }
        }
    }
    out
}

fn push_lexical_counts(stats: &TextStats, values: &mut Vec<f64>) {
    let words = stats.word_count();
    values.push(stats.char_count as f64);
    values.push(words as f64);
    values.push(stats.sentence_count as f64);
    if words == 0 {
        values.push(0.0);
        values.push(0.0);
        return;
    }
    values.push(stats.letter_count as f64 / words as f64);
    values.push(stats.term_counts().len() as f64 / words as f64);
}

fn push_readability(stats: &TextStats, values: &mut Vec<f64>) {
    let words = stats.word_count();
    if words == 0 || stats.sentence_count == 0 {
        values.extend([READABILITY_UNDEFINED; 3]);
        return;
    }
    let words_per_sentence = words as f64 / stats.sentence_count as f64;
    let syllables_per_word = stats.syllable_count as f64 / words as f64;
    let letters_per_word = stats.letter_count as f64 / words as f64;

    let reading_ease = 206.835 - 1.015 * words_per_sentence - 84.6 * syllables_per_word;
    let kincaid_grade = 0.39 * words_per_sentence + 11.8 * syllables_per_word - 15.59;
    let ari = 4.71 * letters_per_word + 0.5 * words_per_sentence - 21.43;
    for v in [reading_ease, kincaid_grade, ari] {
        values.push(v.clamp(-READABILITY_CLAMP, READABILITY_CLAMP));
    }
}

fn push_term_weights(stats: &TextStats, vocabulary: &Vocabulary, values: &mut Vec<f64>) {
    let words = stats.word_count();
    let counts = stats.term_counts();
    for t in &vocabulary.terms {
        let tf = match (counts.get(t.term.as_str()), words) {
            (Some(c), w) if w > 0 => f64::from(*c) / w as f64,
            _ => 0.0,
        };
        values.push(tf * t.idf);
    }
}

/// Signed feature hashing of words into `dim` buckets, L2-normalised.
fn push_embedding(stats: &TextStats, dim: usize, values: &mut Vec<f64>) {
    let mut acc = vec![0.0f64; dim];
    for w in &stats.words {
        let h = fnv1a64(w.as_bytes());
        let bucket = (h % dim as u64) as usize;
        let sign = if h >> 63 == 0 { 1.0 } else { -1.0 };
        acc[bucket] += sign;
    }
    let norm = acc.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm > 0.0 {
        for v in acc.iter_mut() {
            *v /= norm;
        }
    }
    values.extend(acc);
}

fn fnv1a64(bytes: &[u8]) -> u64 {
    // FNV-1a 64-bit; stable across platforms and releases.
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut h = OFFSET;
    for &b in bytes {
        h ^= u64::from(b);
        h = h.wrapping_mul(PRIME);
    }
    h
}
