//! Error taxonomy for the packaging and upload pipeline.
//!
//! Filesystem and key errors are raised before any remote call is made;
//! `Transfer` and `IncompleteMultipart` only surface after the single
//! automatic retry has been spent.

use std::path::PathBuf;

/// Boxed error returned by [`crate::contract::BundleResource`] implementations.
pub type ResourceError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    #[error("cannot read {}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("manifest artifacts must be built from a directory, got {}", path.display())]
    InvalidArtifactType { path: PathBuf },

    #[error("private key file not found: {}", path.display())]
    KeyNotFound { path: PathBuf },

    #[error("invalid private key: {0}")]
    InvalidKeyFormat(String),

    #[error("failed to compute checksum of {}", path.display())]
    ChecksumComputation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{operation} failed for {unit}")]
    Transfer {
        operation: &'static str,
        unit: String,
        #[source]
        source: ResourceError,
    },

    #[error("multipart upload {upload_id} for {unit} failed at part {part_number}")]
    IncompleteMultipart {
        unit: String,
        upload_id: String,
        part_number: u32,
        #[source]
        source: ResourceError,
    },

    #[error("failed to build archive")]
    Archive(#[from] zip::result::ZipError),

    #[error("failed to serialize manifest")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to sign payload")]
    Signing(#[from] rsa::signature::Error),
}

impl BundleError {
    pub(crate) fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BundleError::Filesystem {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = BundleError> = std::result::Result<T, E>;
