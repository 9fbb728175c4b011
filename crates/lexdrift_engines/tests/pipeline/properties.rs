#![forbid(unsafe_code)]

use std::sync::Arc;

use lexdrift_contracts::corpus::CorpusRecord;
use lexdrift_contracts::schema::READABILITY_UNDEFINED;
use lexdrift_contracts::vector::csv_header;
use lexdrift_engines::artifact::{deserialize, serialize};
use lexdrift_engines::pipeline::{
    fit, field_names, transform, FeaturePipeline, FittedPipeline, PipelineConfig,
};

const TRAINING: &[&str] = &[
    "The committee reviewed the proposal and approved the budget for next year.",
    "Honestly, I didn't expect the ending; it surprised everyone in the room!",
    "Photosynthesis converts light energy into chemical energy stored in glucose.",
    "Can you believe how fast the season went by? It feels like yesterday.",
    "The museum opened a new exhibit about ancient maritime trade routes.",
    "Our team fixed the bug, wrote tests, and shipped the release on Friday.",
    "In conclusion, renewable energy offers a sustainable path for the future.",
    "She walked along the river, listening to the birds and the quiet water.",
    "The recipe calls for flour, sugar, butter, and a pinch of salt.",
    "Researchers found that sleep strongly affects memory and learning.",
    "The essay argues that the novel reflects the anxieties of its era.",
    "Traffic was heavy downtown, so the bus arrived twenty minutes late.",
];

const PROBES: &[&str] = &[
    "",
    "   ",
    "?!...",
    "A single sentence without a terminator",
    "The committee approved the budget. The team shipped the release!",
    "Ünïcödé wörds and émojis 🎉 are handled too.",
    "Numbers like 42 and 3.14 appear here; do they count?",
    "don't won't can't shouldn't",
];

fn training_corpus() -> Vec<CorpusRecord> {
    TRAINING.iter().map(|t| CorpusRecord::new(*t)).collect()
}

fn fitted() -> FittedPipeline {
    FeaturePipeline::new(PipelineConfig::mvp_v1())
        .unwrap()
        .fit(&training_corpus())
        .unwrap()
}

#[test]
fn at_pipeline_it_01_fit_and_transform_are_deterministic() {
    let a = fitted();
    let b = fit(&training_corpus(), &PipelineConfig::mvp_v1()).unwrap();
    assert_eq!(a.schema_id(), b.schema_id());
    assert_eq!(a.corpus_sha256(), b.corpus_sha256());
    assert_eq!(serialize(&a).unwrap(), serialize(&b).unwrap());
    for probe in PROBES {
        let x = transform(probe, &a);
        let y = transform(probe, &b);
        assert_eq!(
            x.values.iter().map(|v| v.to_bits()).collect::<Vec<_>>(),
            y.values.iter().map(|v| v.to_bits()).collect::<Vec<_>>(),
            "probe {probe:?}"
        );
    }
}

#[test]
fn at_pipeline_it_02_artifact_round_trip_is_bit_identical_on_probes() {
    let f = fitted();
    let back = deserialize(&serialize(&f).unwrap()).unwrap();
    assert_eq!(back.schema_id(), f.schema_id());
    for probe in PROBES {
        let x = f.transform(probe);
        let y = back.transform(probe);
        for (a, b) in x.values.iter().zip(y.values.iter()) {
            assert_eq!(a.to_bits(), b.to_bits(), "probe {probe:?}");
        }
    }
}

#[test]
fn at_pipeline_it_03_every_probe_yields_a_valid_vector() {
    let f = fitted();
    for probe in PROBES {
        let v = f.transform(probe);
        assert_eq!(v.len(), f.schema().len());
        v.validate_against(f.schema())
            .unwrap_or_else(|e| panic!("probe {probe:?}: {e}"));
    }
}

#[test]
fn at_pipeline_it_04_whitespace_only_is_the_sentinel_vector() {
    let f = fitted();
    let v = f.transform("   ");
    let s = f.schema();
    for (spec, value) in s.fields().iter().zip(v.values.iter()) {
        if spec.name == "char_count" {
            assert_eq!(*value, 3.0);
        } else if spec.name.starts_with("flesch") || spec.name == "automated_readability_index" {
            assert_eq!(*value, READABILITY_UNDEFINED, "{}", spec.name);
        } else {
            assert_eq!(*value, 0.0, "{}", spec.name);
        }
    }
}

#[test]
fn at_pipeline_it_05_schema_is_stable_for_identical_inputs_and_moves_with_corpus() {
    let a = fitted();
    let mut other = training_corpus();
    other.push(CorpusRecord::new("Zebras zebras zebras roam the zebra plains daily."));
    other.push(CorpusRecord::new("A zebra herd crossed the river at dawn."));
    let b = fit(&other, &PipelineConfig::mvp_v1()).unwrap();
    assert_ne!(a.corpus_sha256(), b.corpus_sha256());
    let a_terms: Vec<&str> = a.vocabulary().terms.iter().map(|t| t.term.as_str()).collect();
    let b_terms: Vec<&str> = b.vocabulary().terms.iter().map(|t| t.term.as_str()).collect();
    assert_eq!(a_terms == b_terms, a.schema_id() == b.schema_id());
}

#[test]
fn at_pipeline_it_06_field_order_is_family_order() {
    let f = fitted();
    let names: Vec<&str> = f.schema().field_names().collect();
    assert_eq!(&names[..5], &["char_count", "word_count", "sentence_count", "avg_word_length", "ttr"]);
    assert_eq!(names[5], "punct_density[.]");
    let fre = names
        .iter()
        .position(|n| *n == field_names::FLESCH_READING_EASE)
        .unwrap();
    let first_tfidf = names.iter().position(|n| n.starts_with("tfidf[")).unwrap();
    let first_embed = names.iter().position(|n| n.starts_with("embed[")).unwrap();
    assert!(fre < first_tfidf && first_tfidf < first_embed);
    assert_eq!(names.last().copied(), Some("embed[15]"));
    assert!(csv_header(f.schema()).starts_with("char_count,word_count"));
}

#[test]
fn at_pipeline_it_07_shared_pipeline_transforms_concurrently() {
    let f = Arc::new(fitted());
    let expected: Vec<_> = PROBES.iter().map(|p| f.transform(p)).collect();
    std::thread::scope(|scope| {
        for _ in 0..4 {
            let f = Arc::clone(&f);
            let expected = &expected;
            scope.spawn(move || {
                for (probe, want) in PROBES.iter().zip(expected.iter()) {
                    assert_eq!(&f.transform(probe), want);
                }
            });
        }
    });
}
