#![forbid(unsafe_code)]

use std::fmt;

use lexdrift_contracts::schema::FEATURE_SCHEMA_VERSION;
use lexdrift_contracts::Validate;
use sha2::{Digest, Sha256};

use crate::pipeline::FittedPipeline;

pub const ARTIFACT_MAGIC: [u8; 4] = *b"LXDP";
pub const ARTIFACT_FORMAT_VERSION: u16 = 1;

const HEADER_LEN: usize = 4 + 2 + 4 + 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactError {
    Corrupt { reason: String },
    IncompatibleVersion {
        what: &'static str,
        found: u32,
        supported: u32,
    },
    Encode(String),
}

impl fmt::Display for ArtifactError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Corrupt { reason } => write!(f, "corrupt artifact: {reason}"),
            Self::IncompatibleVersion {
                what,
                found,
                supported,
            } => write!(
                f,
                "incompatible artifact {what} version {found} (supported: {supported})"
            ),
            Self::Encode(e) => write!(f, "artifact encode failed: {e}"),
        }
    }
}

impl std::error::Error for ArtifactError {}

/// Envelope layout:
/// `magic[4] | format_version u16 BE | schema_version u32 BE | sha256(payload)[32] | payload`
/// where the payload is the JSON form of the fitted pipeline.
pub fn serialize(fitted: &FittedPipeline) -> Result<Vec<u8>, ArtifactError> {
    let payload = serde_json::to_vec(fitted).map_err(|e| ArtifactError::Encode(e.to_string()))?;
    let digest = Sha256::digest(&payload);

    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&ARTIFACT_MAGIC);
    out.extend_from_slice(&ARTIFACT_FORMAT_VERSION.to_be_bytes());
    out.extend_from_slice(&fitted.schema().version().0.to_be_bytes());
    out.extend_from_slice(&digest);
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Rejects truncated, tampered or version-incompatible bytes before anything
/// is trusted.
pub fn deserialize(bytes: &[u8]) -> Result<FittedPipeline, ArtifactError> {
    if bytes.len() < HEADER_LEN {
        return Err(corrupt(format!(
            "{} bytes is shorter than the {HEADER_LEN}-byte header",
            bytes.len()
        )));
    }
    let (header, payload) = bytes.split_at(HEADER_LEN);
    if header[0..4] != ARTIFACT_MAGIC {
        return Err(corrupt("bad magic".to_string()));
    }
    let format_version = u16::from_be_bytes([header[4], header[5]]);
    if format_version != ARTIFACT_FORMAT_VERSION {
        return Err(ArtifactError::IncompatibleVersion {
            what: "format",
            found: u32::from(format_version),
            supported: u32::from(ARTIFACT_FORMAT_VERSION),
        });
    }
    let schema_version = u32::from_be_bytes([header[6], header[7], header[8], header[9]]);
    if schema_version != FEATURE_SCHEMA_VERSION.0 {
        return Err(ArtifactError::IncompatibleVersion {
            what: "schema",
            found: schema_version,
            supported: FEATURE_SCHEMA_VERSION.0,
        });
    }
    if Sha256::digest(payload).as_slice() != &header[10..HEADER_LEN] {
        return Err(corrupt("payload checksum mismatch".to_string()));
    }

    let fitted: FittedPipeline =
        serde_json::from_slice(payload).map_err(|e| corrupt(format!("payload decode: {e}")))?;
    if fitted.schema().version().0 != schema_version {
        return Err(corrupt("header and payload schema versions differ".to_string()));
    }
    fitted
        .validate()
        .map_err(|v| corrupt(format!("payload invariant: {v}")))?;
    Ok(fitted)
}

fn corrupt(reason: String) -> ArtifactError {
    ArtifactError::Corrupt { reason }
}
