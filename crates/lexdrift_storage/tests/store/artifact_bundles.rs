#![forbid(unsafe_code)]

use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use lexdrift_contracts::corpus::CorpusRecord;
use lexdrift_contracts::reference::ReferenceDistribution;
use lexdrift_contracts::vector::FeatureVector;
use lexdrift_contracts::UnixTimeMs;
use lexdrift_engines::baseline::build_reference;
use lexdrift_engines::pipeline::{FeaturePipeline, FittedPipeline, PipelineConfig};
use lexdrift_storage::artifact_store::{version_label, PIPELINE_FILE};
use lexdrift_storage::{ArtifactStore, StorageError};

fn temp_root(name: &str) -> PathBuf {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(1);
    std::env::temp_dir().join(format!("lexdrift-store-test-{name}-{suffix}"))
}

fn corpus(tag: &str) -> Vec<CorpusRecord> {
    (0..15)
        .map(|i| {
            CorpusRecord::new(format!(
                "Sample {tag} document {i} describes the harbour, the boats and the tide."
            ))
        })
        .collect()
}

fn fitted_with_reference(tag: &str) -> (FittedPipeline, ReferenceDistribution) {
    let c = corpus(tag);
    let fitted = FeaturePipeline::new(PipelineConfig::mvp_v1())
        .unwrap()
        .fit(&c)
        .unwrap();
    let vectors: Vec<FeatureVector> = c.iter().map(|r| fitted.transform(&r.text)).collect();
    let reference = build_reference(
        fitted.schema(),
        &vectors,
        &format!("ref-{tag}"),
        UnixTimeMs(7),
        21,
    )
    .unwrap();
    (fitted, reference)
}

#[test]
fn at_store_it_01_publish_then_load_round_trips_the_bundle() {
    let root = temp_root("publish");
    let store = ArtifactStore::open(&root).unwrap();
    let (fitted, reference) = fitted_with_reference("a");

    let manifest = store.publish(&fitted, &reference, "v1").unwrap();
    assert_eq!(&manifest.schema_id, fitted.schema_id());
    assert_eq!(manifest.corpus_sha256, fitted.corpus_sha256());

    let loaded = store.load(fitted.schema_id(), "v1").unwrap();
    assert_eq!(loaded.pipeline, fitted);
    assert_eq!(loaded.reference, reference);
    assert_eq!(loaded.manifest, manifest);
    assert_eq!(
        store.list_versions(fitted.schema_id()).unwrap(),
        vec!["v1".to_string()]
    );
    fs::remove_dir_all(root).unwrap();
}

#[test]
fn at_store_it_02_published_versions_are_immutable() {
    let root = temp_root("immutable");
    let store = ArtifactStore::open(&root).unwrap();
    let (fitted, reference) = fitted_with_reference("a");
    store.publish(&fitted, &reference, "v1").unwrap();
    assert!(matches!(
        store.publish(&fitted, &reference, "v1"),
        Err(StorageError::AlreadyExists { .. })
    ));
    fs::remove_dir_all(root).unwrap();
}

#[test]
fn at_store_it_03_promote_moves_current_and_load_promoted_follows() {
    let root = temp_root("promote");
    let store = ArtifactStore::open(&root).unwrap();
    assert!(store.current().unwrap().is_none());
    assert!(matches!(
        store.load_promoted(),
        Err(StorageError::NotFound { .. })
    ));

    let (a, ref_a) = fitted_with_reference("a");
    let (b, ref_b) = fitted_with_reference("b");
    let va = version_label("v", UnixTimeMs(1_000));
    let vb = version_label("v", UnixTimeMs(2_000));
    store.publish(&a, &ref_a, &va).unwrap();
    store.publish(&b, &ref_b, &vb).unwrap();

    store.promote(a.schema_id(), &va).unwrap();
    assert_eq!(store.load_promoted().unwrap().reference.reference_id, "ref-a");
    let pointer = store.promote(b.schema_id(), &vb).unwrap();
    assert_eq!(store.current().unwrap(), Some(pointer));
    assert_eq!(store.load_promoted().unwrap().reference.reference_id, "ref-b");
    assert!(!root.join("CURRENT.tmp").exists());
    fs::remove_dir_all(root).unwrap();
}

#[test]
fn at_store_it_04_tampered_artifact_is_detected_and_not_promotable() {
    let root = temp_root("tamper");
    let store = ArtifactStore::open(&root).unwrap();
    let (fitted, reference) = fitted_with_reference("a");
    store.publish(&fitted, &reference, "v1").unwrap();

    let path = store.bundle_dir(fitted.schema_id(), "v1").join(PIPELINE_FILE);
    let mut bytes = fs::read(&path).unwrap();
    let last = bytes.len() - 3;
    bytes[last] ^= 0x20;
    fs::write(&path, bytes).unwrap();

    assert!(matches!(
        store.load(fitted.schema_id(), "v1"),
        Err(StorageError::ChecksumMismatch { .. })
    ));
    assert!(store.promote(fitted.schema_id(), "v1").is_err());
    assert!(store.current().unwrap().is_none());
    fs::remove_dir_all(root).unwrap();
}

#[test]
fn at_store_it_05_reference_for_another_schema_is_rejected() {
    let root = temp_root("mismatch");
    let store = ArtifactStore::open(&root).unwrap();
    let (a, _) = fitted_with_reference("a");
    let mut cfg = PipelineConfig::mvp_v1();
    cfg.embedding_dim = 8;
    let other = FeaturePipeline::new(cfg).unwrap().fit(&corpus("a")).unwrap();
    let vectors: Vec<FeatureVector> = corpus("a").iter().map(|r| other.transform(&r.text)).collect();
    let foreign = build_reference(other.schema(), &vectors, "ref-x", UnixTimeMs(1), 21).unwrap();

    assert!(matches!(
        store.publish(&a, &foreign, "v1"),
        Err(StorageError::Contract(_))
    ));
    assert!(!store.bundle_dir(a.schema_id(), "v1").exists());
    fs::remove_dir_all(root).unwrap();
}

#[test]
fn at_store_it_06_missing_bundle_is_not_found() {
    let root = temp_root("missing");
    let store = ArtifactStore::open(&root).unwrap();
    let (fitted, _) = fitted_with_reference("a");
    let err = store.load(fitted.schema_id(), "v9").unwrap_err();
    assert!(matches!(err, StorageError::NotFound { .. }));
    assert!(err.to_string().contains("v9"));
    fs::remove_dir_all(root).unwrap();
}
