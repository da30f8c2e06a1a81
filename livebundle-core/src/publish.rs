//! High-level pipeline: orchestrates validate → package → upload → activate
//! for one bundle.
//!
//! This module provides the top-level orchestration logic for publishing a
//! live update bundle. It implements a fail-fast pipeline that:
//!   - Validates the bundle path and signing key before any remote call
//!   - Packages the payload: a content manifest (manifest mode) or an archive
//!     (zip mode)
//!   - Creates the bundle record and uploads its files via [`UploadCoordinator`]
//!   - Marks the bundle ready once every file has been acknowledged
//!
//! # Major Types
//! - [`PublishConfig`]: what to publish and how
//! - [`PublishReport`]: ids and checksums of everything that was uploaded
//!
//! # Error Handling
//! The first failing step returns immediately. A bundle whose files did not
//! all upload is never marked ready; remote multipart sessions opened before
//! the failure are left as they are.

use std::path::PathBuf;

use tracing::{error, info, warn};

use crate::assets::collect_assets;
use crate::config::UploadOptions;
use crate::contract::{ArtifactStatus, BundleResource, BundleUpdate, NewBundle};
use crate::error::{BundleError, Result};
use crate::integrity::PrivateKeyMaterial;
use crate::manifest::write_manifest;
use crate::package::{package, ArtifactSource, ArtifactType};
use crate::upload::{UploadCoordinator, UploadedFile};

pub const DEFAULT_ARCHIVE_NAME: &str = "bundle.zip";
const ENTRY_DOCUMENT: &str = "index.html";

/// Everything needed to publish one bundle.
#[derive(Debug, Clone)]
pub struct PublishConfig {
    /// Web-asset directory, or an existing `.zip` archive in zip mode.
    pub path: PathBuf,
    /// Inline PEM text or a path to a `.pem` file.
    pub private_key: Option<String>,
    pub upload: UploadOptions,
    /// Bundle metadata; its `artifact_type` selects the transfer mode.
    pub bundle: NewBundle,
}

#[derive(Debug)]
pub struct PublishReport {
    pub bundle_id: String,
    pub app_deployment_id: Option<String>,
    pub artifact_type: ArtifactType,
    pub files: Vec<UploadedFile>,
}

impl PublishReport {
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size_in_bytes).sum()
    }
}

enum Payload {
    Assets(Vec<crate::assets::FileDescriptor>),
    Archive { buffer: bytes::Bytes, name: String },
}

pub async fn publish<R>(config: &PublishConfig, resource: &R) -> Result<PublishReport>
where
    R: BundleResource + ?Sized,
{
    let artifact_type = config.bundle.artifact_type;
    info!(path = %config.path.display(), %artifact_type, "[PUBLISH] Starting bundle publish");

    // Step 1: validate local inputs before touching the network.
    let source = ArtifactSource::resolve(&config.path, artifact_type)?;
    let signing_key = match &config.private_key {
        Some(raw) => {
            let key = PrivateKeyMaterial::resolve(raw).map_err(|e| {
                error!(error = %e, "[PUBLISH][ERROR] Private key rejected");
                e
            })?;
            info!("[PUBLISH] Bundle files will be signed");
            Some(key)
        }
        None => None,
    };

    if let ArtifactSource::Directory(root) = &source {
        if !root.join(ENTRY_DOCUMENT).is_file() {
            warn!(path = %root.display(), "[PUBLISH] Bundle directory has no top-level index.html");
        }
    }

    // Step 2: build the payload. The manifest is written before any upload.
    let payload = match (&source, artifact_type) {
        (ArtifactSource::Directory(root), ArtifactType::Manifest) => {
            let manifest = write_manifest(root)?;
            let assets = collect_assets(root)?;
            info!(entries = manifest.len(), files = assets.len(), "[PUBLISH] Manifest generated");
            Payload::Assets(assets)
        }
        (ArtifactSource::Archive(path), ArtifactType::Manifest) => {
            return Err(BundleError::InvalidArtifactType { path: path.clone() });
        }
        (_, ArtifactType::Zip) => {
            let buffer = package(&source)?;
            let name = match &source {
                ArtifactSource::Archive(path) => path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| DEFAULT_ARCHIVE_NAME.to_string()),
                ArtifactSource::Directory(_) => DEFAULT_ARCHIVE_NAME.to_string(),
            };
            Payload::Archive { buffer, name }
        }
    };

    // Step 3: create the bundle record.
    let bundle = resource
        .create_bundle(config.bundle.clone())
        .await
        .map_err(|source| {
            error!(error = %source, "[PUBLISH][ERROR] create_bundle failed");
            BundleError::Transfer {
                operation: "create_bundle",
                unit: config.path.display().to_string(),
                source,
            }
        })?;
    info!(bundle_id = %bundle.id, "[PUBLISH] Bundle created");

    // Step 4: transfer.
    let coordinator = UploadCoordinator::new(resource, config.upload.clone(), signing_key.as_ref());
    let files = match payload {
        Payload::Assets(assets) => coordinator.upload_assets(&bundle.id, &assets).await,
        Payload::Archive { buffer, name } => coordinator
            .upload_archive(&bundle.id, buffer, &name)
            .await
            .map(|file| vec![file]),
    }
    .map_err(|e| {
        error!(bundle_id = %bundle.id, error = %e, "[PUBLISH][ERROR] Upload failed, bundle left pending");
        e
    })?;

    // Step 5: activate.
    let update = BundleUpdate {
        artifact_status: ArtifactStatus::Ready,
        channel_name: config.bundle.channel_name.clone(),
        rollout: config.bundle.rollout,
    };
    resource
        .update_bundle(&bundle.id, update)
        .await
        .map_err(|source| BundleError::Transfer {
            operation: "update_bundle",
            unit: bundle.id.clone(),
            source,
        })?;

    let report = PublishReport {
        bundle_id: bundle.id,
        app_deployment_id: bundle.app_deployment_id,
        artifact_type,
        files,
    };
    info!(
        bundle_id = %report.bundle_id,
        files = report.files.len(),
        bytes = report.total_bytes(),
        "[PUBLISH] Bundle ready"
    );
    Ok(report)
}
