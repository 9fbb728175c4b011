#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};

use lexdrift_contracts::common::sha256_hex;
use lexdrift_contracts::reference::ReferenceDistribution;
use lexdrift_contracts::schema::SchemaId;
use lexdrift_contracts::{ContractViolation, SchemaVersion, UnixTimeMs, Validate};
use lexdrift_engines::artifact;
use lexdrift_engines::pipeline::FittedPipeline;
use serde::{Deserialize, Serialize};

use crate::error::{io_at, json_at, StorageError};
use crate::fsutil::{atomic_write, now_unix_ms, unique_suffix, write_synced};

pub const PIPELINE_FILE: &str = "pipeline.bin";
pub const REFERENCE_FILE: &str = "reference.json";
pub const MANIFEST_FILE: &str = "manifest.json";
pub const CURRENT_FILE: &str = "CURRENT";

const BUNDLES_DIR: &str = "bundles";
const STAGING_DIR: &str = "staging";

/// Describes one published bundle. Written last inside the staged directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub schema_id: SchemaId,
    pub schema_version: SchemaVersion,
    pub version: String,
    pub reference_id: String,
    pub corpus_sha256: String,
    pub artifact_sha256: String,
    pub created_at_ms: UnixTimeMs,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentPointer {
    pub schema_id: SchemaId,
    pub version: String,
    pub promoted_at_ms: UnixTimeMs,
}

#[derive(Debug, Clone)]
pub struct LoadedBundle {
    pub manifest: ArtifactManifest,
    pub pipeline: FittedPipeline,
    pub reference: ReferenceDistribution,
}

/// Immutable versioned bundles under `<root>/bundles/<schema_id>/<version>/`
/// plus a `CURRENT` pointer naming the promoted one.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        for dir in [root.join(BUNDLES_DIR), root.join(STAGING_DIR)] {
            fs::create_dir_all(&dir).map_err(io_at(&dir))?;
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn bundle_dir(&self, schema_id: &SchemaId, version: &str) -> PathBuf {
        self.root
            .join(BUNDLES_DIR)
            .join(schema_id.as_str())
            .join(version)
    }

    /// Stages the bundle in a private directory and renames it into place, so
    /// a bundle directory is either absent or complete.
    pub fn publish(
        &self,
        pipeline: &FittedPipeline,
        reference: &ReferenceDistribution,
        version: &str,
    ) -> Result<ArtifactManifest, StorageError> {
        validate_version(version)?;
        pipeline.validate()?;
        reference.validate()?;
        if &reference.schema_id != pipeline.schema_id() {
            return Err(StorageError::Contract(ContractViolation::InvalidValue {
                field: "artifact_bundle.reference.schema_id",
                reason: "must match the pipeline schema id",
            }));
        }
        let target = self.bundle_dir(pipeline.schema_id(), version);
        if target.exists() {
            return Err(StorageError::AlreadyExists { path: target });
        }

        let bytes = artifact::serialize(pipeline).map_err(|source| StorageError::Artifact {
            path: target.join(PIPELINE_FILE),
            source,
        })?;
        let manifest = ArtifactManifest {
            schema_id: pipeline.schema_id().clone(),
            schema_version: pipeline.schema().version(),
            version: version.to_string(),
            reference_id: reference.reference_id.clone(),
            corpus_sha256: pipeline.corpus_sha256().to_string(),
            artifact_sha256: sha256_hex(&bytes),
            created_at_ms: now_unix_ms(),
        };

        let staged = self
            .root
            .join(STAGING_DIR)
            .join(format!("{version}-{}", unique_suffix()));
        fs::create_dir_all(&staged).map_err(io_at(&staged))?;
        let written = self.write_staged(&staged, &bytes, reference, &manifest);
        if let Err(err) = written {
            let _ = fs::remove_dir_all(&staged);
            return Err(err);
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(io_at(parent))?;
        }
        if let Err(source) = fs::rename(&staged, &target) {
            let _ = fs::remove_dir_all(&staged);
            return Err(StorageError::Io {
                path: target,
                source,
            });
        }
        log::info!(
            "bundle published: schema_id={} version={} artifact_sha256={}",
            manifest.schema_id,
            manifest.version,
            manifest.artifact_sha256
        );
        Ok(manifest)
    }

    fn write_staged(
        &self,
        staged: &Path,
        bytes: &[u8],
        reference: &ReferenceDistribution,
        manifest: &ArtifactManifest,
    ) -> Result<(), StorageError> {
        write_synced(&staged.join(PIPELINE_FILE), bytes)?;
        let reference_path = staged.join(REFERENCE_FILE);
        let reference_json =
            serde_json::to_vec_pretty(reference).map_err(json_at(&reference_path))?;
        write_synced(&reference_path, &reference_json)?;
        let manifest_path = staged.join(MANIFEST_FILE);
        let manifest_json = serde_json::to_vec_pretty(manifest).map_err(json_at(&manifest_path))?;
        write_synced(&manifest_path, &manifest_json)
    }

    /// Loads and verifies a bundle: checksum, envelope, and that pipeline,
    /// reference and manifest agree on the schema id.
    pub fn load(&self, schema_id: &SchemaId, version: &str) -> Result<LoadedBundle, StorageError> {
        validate_version(version)?;
        let dir = self.bundle_dir(schema_id, version);
        if !dir.is_dir() {
            return Err(StorageError::NotFound {
                what: format!("bundle {schema_id}/{version}"),
            });
        }

        let manifest_path = dir.join(MANIFEST_FILE);
        let manifest: ArtifactManifest = read_json(&manifest_path)?;

        let pipeline_path = dir.join(PIPELINE_FILE);
        let bytes = fs::read(&pipeline_path).map_err(io_at(&pipeline_path))?;
        let found = sha256_hex(&bytes);
        if found != manifest.artifact_sha256 {
            return Err(StorageError::ChecksumMismatch {
                path: pipeline_path,
                expected: manifest.artifact_sha256,
                found,
            });
        }
        let pipeline = artifact::deserialize(&bytes).map_err(|source| StorageError::Artifact {
            path: pipeline_path.clone(),
            source,
        })?;

        let reference_path = dir.join(REFERENCE_FILE);
        let reference: ReferenceDistribution = read_json(&reference_path)?;
        reference.validate()?;

        if pipeline.schema_id() != schema_id
            || &manifest.schema_id != schema_id
            || &reference.schema_id != schema_id
        {
            return Err(StorageError::Contract(ContractViolation::InvalidValue {
                field: "artifact_bundle.schema_id",
                reason: "pipeline, reference and manifest must share the bundle schema id",
            }));
        }
        Ok(LoadedBundle {
            manifest,
            pipeline,
            reference,
        })
    }

    /// Verifies the bundle, then atomically repoints `CURRENT` at it.
    pub fn promote(&self, schema_id: &SchemaId, version: &str) -> Result<CurrentPointer, StorageError> {
        self.load(schema_id, version)?;
        let pointer = CurrentPointer {
            schema_id: schema_id.clone(),
            version: version.to_string(),
            promoted_at_ms: now_unix_ms(),
        };
        let path = self.root.join(CURRENT_FILE);
        let json = serde_json::to_vec_pretty(&pointer).map_err(json_at(&path))?;
        atomic_write(&path, &json)?;
        log::info!("bundle promoted: schema_id={schema_id} version={version}");
        Ok(pointer)
    }

    pub fn current(&self) -> Result<Option<CurrentPointer>, StorageError> {
        let path = self.root.join(CURRENT_FILE);
        if !path.exists() {
            return Ok(None);
        }
        read_json(&path).map(Some)
    }

    pub fn load_promoted(&self) -> Result<LoadedBundle, StorageError> {
        let pointer = self.current()?.ok_or_else(|| StorageError::NotFound {
            what: format!("promoted bundle under '{}'", self.root.display()),
        })?;
        self.load(&pointer.schema_id, &pointer.version)
    }

    /// Published versions for one schema, sorted.
    pub fn list_versions(&self, schema_id: &SchemaId) -> Result<Vec<String>, StorageError> {
        list_dir_names(&self.root.join(BUNDLES_DIR).join(schema_id.as_str()))
    }

    pub fn list_schemas(&self) -> Result<Vec<SchemaId>, StorageError> {
        list_dir_names(&self.root.join(BUNDLES_DIR))?
            .into_iter()
            .map(|name| SchemaId::new(name).map_err(StorageError::from))
            .collect()
    }
}

/// `<prefix><unix_ms>`, e.g. `v1718000000000`.
pub fn version_label(prefix: &str, at: UnixTimeMs) -> String {
    format!("{prefix}{}", at.0)
}

fn validate_version(version: &str) -> Result<(), StorageError> {
    let ok = !version.is_empty()
        && version.len() <= 64
        && !version.starts_with('.')
        && version
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if !ok {
        return Err(StorageError::Contract(ContractViolation::InvalidValue {
            field: "artifact_bundle.version",
            reason: "must be 1..=64 chars of [A-Za-z0-9._-] not starting with '.'",
        }));
    }
    Ok(())
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, StorageError> {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(StorageError::NotFound {
                what: path.display().to_string(),
            })
        }
        Err(source) => {
            return Err(StorageError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    serde_json::from_slice(&bytes).map_err(json_at(path))
}

fn list_dir_names(dir: &Path) -> Result<Vec<String>, StorageError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_at(dir))? {
        let entry = entry.map_err(io_at(dir))?;
        if entry.path().is_dir() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}
