#![forbid(unsafe_code)]

use std::fmt;
use std::path::PathBuf;

use lexdrift_contracts::ContractViolation;
use lexdrift_engines::artifact::ArtifactError;

#[derive(Debug)]
pub enum StorageError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    CorruptRecord {
        path: PathBuf,
        line_no: usize,
        reason: String,
    },
    Artifact {
        path: PathBuf,
        source: ArtifactError,
    },
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },
    NotFound {
        what: String,
    },
    AlreadyExists {
        path: PathBuf,
    },
    Contract(ContractViolation),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "io error at '{}': {source}", path.display()),
            Self::Json { path, source } => {
                write!(f, "json error at '{}': {source}", path.display())
            }
            Self::CorruptRecord {
                path,
                line_no,
                reason,
            } => write!(
                f,
                "corrupt record in '{}' at line {line_no}: {reason}",
                path.display()
            ),
            Self::Artifact { path, source } => write!(f, "'{}': {source}", path.display()),
            Self::ChecksumMismatch {
                path,
                expected,
                found,
            } => write!(
                f,
                "checksum mismatch for '{}': manifest {expected}, file {found}",
                path.display()
            ),
            Self::NotFound { what } => write!(f, "not found: {what}"),
            Self::AlreadyExists { path } => {
                write!(f, "refusing to overwrite '{}'", path.display())
            }
            Self::Contract(v) => write!(f, "contract violation: {v}"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Json { source, .. } => Some(source),
            Self::Artifact { source, .. } => Some(source),
            Self::Contract(v) => Some(v),
            _ => None,
        }
    }
}

impl From<ContractViolation> for StorageError {
    fn from(value: ContractViolation) -> Self {
        Self::Contract(value)
    }
}

pub(crate) fn io_at(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> StorageError {
    let path = path.into();
    move |source| StorageError::Io { path, source }
}

pub(crate) fn json_at(path: impl Into<PathBuf>) -> impl FnOnce(serde_json::Error) -> StorageError {
    let path = path.into();
    move |source| StorageError::Json { path, source }
}
