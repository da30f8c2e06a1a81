//! # contract: remote bundle resource interface
//!
//! This module defines the [`BundleResource`] trait and the plain data types
//! exchanged with the backend when publishing a bundle: creating the bundle
//! record, creating files (inline or via multipart upload) and finally
//! marking the bundle ready.
//!
//! ## Interface & Extensibility
//! - Implement [`BundleResource`] for a transport (the CLI crate ships a
//!   reqwest client); core code only ever sees the trait.
//! - All methods are async and return boxed errors ([`ResourceError`]).
//!
//! ## Mocking & Testing
//! - The trait is annotated for `mockall`; `MockBundleResource` is exported
//!   under the `test-export-mocks` feature for downstream tests.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;
use serde::{Deserialize, Serialize};

use crate::package::ArtifactType;

pub use crate::error::ResourceError;

/// Metadata sent when creating a bundle record.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBundle {
    pub artifact_type: ArtifactType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_name: Option<String>,
    /// Fraction of devices receiving the bundle, `0.0..=1.0`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollout: Option<f64>,
    /// RFC 3339 timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_android_app_version_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_android_app_version_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_ios_app_version_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_ios_app_version_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_commit_sha: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_commit_message: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_properties: BTreeMap<String, String>,
}

/// The created bundle record.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    pub id: String,
    #[serde(default)]
    pub app_deployment_id: Option<String>,
}

/// One file of a bundle. `inline_bytes` is `None` when the payload will be
/// transferred with the multipart protocol.
#[derive(Debug, Clone, PartialEq)]
pub struct NewBundleFile {
    pub checksum: String,
    pub mime_type: String,
    pub name: String,
    pub href: Option<String>,
    pub signature: Option<String>,
    pub size_in_bytes: u64,
    pub inline_bytes: Option<Bytes>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BundleFile {
    pub id: String,
}

/// A multipart session opened for one bundle file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultipartUpload {
    pub upload_id: String,
    pub key: String,
}

/// An acknowledged part of a multipart session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedPart {
    pub part_number: u32,
    pub etag: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactStatus {
    Pending,
    Ready,
}

/// Sent once every file has been acknowledged.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleUpdate {
    pub artifact_status: ArtifactStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollout: Option<f64>,
}

/// Trait for publishing bundles to a backing service.
///
/// Implemented by the HTTP client in the CLI crate and by test mocks.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait BundleResource: Send + Sync {
    /// Create the bundle record. Called once, before any file is uploaded.
    async fn create_bundle(&self, req: NewBundle) -> Result<Bundle, ResourceError>;

    /// Create a file in a bundle, uploading `inline_bytes` when present.
    async fn create_file(
        &self,
        bundle_id: &str,
        req: NewBundleFile,
    ) -> Result<BundleFile, ResourceError>;

    /// Open a multipart session for a file created without inline bytes.
    async fn create_multipart_upload(
        &self,
        bundle_id: &str,
        file_id: &str,
    ) -> Result<MultipartUpload, ResourceError>;

    /// Upload one chunk of a multipart session.
    async fn upload_part(
        &self,
        bundle_id: &str,
        file_id: &str,
        upload_id: &str,
        part_number: u32,
        chunk: Bytes,
    ) -> Result<UploadedPart, ResourceError>;

    /// Close a multipart session. `parts` must reference every uploaded part.
    async fn complete_multipart_upload(
        &self,
        bundle_id: &str,
        file_id: &str,
        upload_id: &str,
        parts: Vec<UploadedPart>,
    ) -> Result<(), ResourceError>;

    /// Update the bundle record, typically to mark it ready.
    async fn update_bundle(&self, bundle_id: &str, req: BundleUpdate) -> Result<(), ResourceError>;
}
