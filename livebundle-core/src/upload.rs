//! Upload coordination: turns assets or an archive into remote bundle files.
//!
//! Payloads below [`UploadOptions::multipart_threshold`] are sent inline with
//! the create-file call. Larger payloads are created without inline bytes and
//! then streamed through a multipart session in fixed-size chunks.
//!
//! Every remote call is retried once with identical inputs and holds one
//! permit of a coordinator-wide semaphore, so no more than
//! [`UploadOptions::concurrency`] calls are ever in flight, even when a
//! large asset opens a nested part pool in manifest mode.

use std::future::Future;
use std::ops::Range;

use bytes::Bytes;
use tokio::sync::Semaphore;
use tracing::{debug, error, info};

use crate::assets::FileDescriptor;
use crate::config::UploadOptions;
use crate::contract::{BundleResource, NewBundleFile, UploadedPart};
use crate::error::{BundleError, ResourceError, Result};
use crate::integrity::{checksum, PrivateKeyMaterial};
use crate::pool::{with_retry, WorkerPool};

pub const ARCHIVE_MIME_TYPE: &str = "application/zip";

/// A payload ready for transfer: checksum and signature are computed before
/// the unit is handed to the remote resource.
#[derive(Debug, Clone)]
pub struct UploadUnit {
    pub buffer: Bytes,
    pub name: String,
    pub href: Option<String>,
    pub mime_type: String,
    pub checksum: String,
    pub signature: Option<String>,
}

impl UploadUnit {
    pub fn prepare(
        buffer: Bytes,
        name: String,
        href: Option<String>,
        mime_type: String,
        signing_key: Option<&PrivateKeyMaterial>,
    ) -> Result<Self> {
        let checksum = checksum(&buffer);
        let signature = signing_key.map(|key| key.sign(&buffer)).transpose()?;
        Ok(Self {
            buffer,
            name,
            href,
            mime_type,
            checksum,
            signature,
        })
    }

    fn request(&self, inline: bool) -> NewBundleFile {
        NewBundleFile {
            checksum: self.checksum.clone(),
            mime_type: self.mime_type.clone(),
            name: self.name.clone(),
            href: self.href.clone(),
            signature: self.signature.clone(),
            size_in_bytes: self.buffer.len() as u64,
            inline_bytes: inline.then(|| self.buffer.clone()),
        }
    }

    fn label(&self) -> String {
        self.href.clone().unwrap_or_else(|| self.name.clone())
    }
}

/// One chunk of a multipart transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartPlan {
    pub part_number: u32,
    pub range: Range<usize>,
}

/// Split `size` bytes into contiguous `chunk_size` parts numbered from 1.
/// Only the last part may be shorter.
pub fn plan_parts(size: usize, chunk_size: usize) -> Vec<PartPlan> {
    let chunk_size = chunk_size.max(1);
    (0..size.div_ceil(chunk_size))
        .map(|index| {
            let start = index * chunk_size;
            PartPlan {
                part_number: index as u32 + 1,
                range: start..(start + chunk_size).min(size),
            }
        })
        .collect()
}

/// A file acknowledged by the remote resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub file_id: String,
    pub name: String,
    pub href: Option<String>,
    pub size_in_bytes: u64,
    pub checksum: String,
    /// Number of parts when the multipart protocol was used.
    pub multipart_parts: Option<usize>,
}

pub struct UploadCoordinator<'a, R: ?Sized> {
    resource: &'a R,
    options: UploadOptions,
    signing_key: Option<&'a PrivateKeyMaterial>,
    pool: WorkerPool,
    permits: Semaphore,
}

impl<'a, R> UploadCoordinator<'a, R>
where
    R: BundleResource + ?Sized,
{
    pub fn new(
        resource: &'a R,
        options: UploadOptions,
        signing_key: Option<&'a PrivateKeyMaterial>,
    ) -> Self {
        let options = options.normalized();
        Self {
            resource,
            pool: WorkerPool::new(options.concurrency),
            permits: Semaphore::new(options.concurrency),
            options,
            signing_key,
        }
    }

    /// Upload every asset of a manifest-mode bundle.
    pub async fn upload_assets(
        &self,
        bundle_id: &str,
        assets: &[FileDescriptor],
    ) -> Result<Vec<UploadedFile>> {
        info!(
            bundle_id,
            count = assets.len(),
            workers = self.pool.width().min(assets.len()),
            "[UPLOAD] Uploading bundle assets"
        );
        self.pool
            .drain(assets.len(), |index| {
                let asset = &assets[index];
                async move {
                    let buffer = tokio::fs::read(&asset.absolute_path).await.map_err(|e| {
                        error!(error = ?e, path = %asset.absolute_path.display(), "[UPLOAD] Failed to read asset");
                        BundleError::filesystem(&asset.absolute_path, e)
                    })?;
                    let name = asset
                        .relative_href
                        .rsplit('/')
                        .next()
                        .unwrap_or(&asset.relative_href)
                        .to_string();
                    let unit = UploadUnit::prepare(
                        Bytes::from(buffer),
                        name,
                        Some(asset.relative_href.clone()),
                        asset.mime_type.clone(),
                        self.signing_key,
                    )?;
                    self.upload_unit(bundle_id, &unit).await
                }
            })
            .await
    }

    /// Upload a zip-mode archive as a single bundle file.
    pub async fn upload_archive(
        &self,
        bundle_id: &str,
        buffer: Bytes,
        name: &str,
    ) -> Result<UploadedFile> {
        let unit = UploadUnit::prepare(
            buffer,
            name.to_string(),
            None,
            ARCHIVE_MIME_TYPE.to_string(),
            self.signing_key,
        )?;
        self.upload_unit(bundle_id, &unit).await
    }

    /// Upload one unit, inline or multipart depending on its size.
    pub async fn upload_unit(&self, bundle_id: &str, unit: &UploadUnit) -> Result<UploadedFile> {
        let size = unit.buffer.len();
        let multipart = size >= self.options.multipart_threshold;
        debug!(unit = %unit.label(), size, multipart, checksum = %unit.checksum, "[UPLOAD] Creating bundle file");

        let file = with_retry(self.options.attempts, "create_file", || {
            self.limited(self.resource.create_file(bundle_id, unit.request(!multipart)))
        })
        .await
        .map_err(|source| {
            error!(unit = %unit.label(), error = %source, "[UPLOAD][ERROR] create_file failed");
            BundleError::Transfer {
                operation: "create_file",
                unit: unit.label(),
                source,
            }
        })?;

        let multipart_parts = if multipart {
            Some(self.upload_multipart(bundle_id, &file.id, unit).await?)
        } else {
            None
        };

        info!(unit = %unit.label(), file_id = %file.id, size, "[UPLOAD] Bundle file uploaded");
        Ok(UploadedFile {
            file_id: file.id,
            name: unit.name.clone(),
            href: unit.href.clone(),
            size_in_bytes: size as u64,
            checksum: unit.checksum.clone(),
            multipart_parts,
        })
    }

    async fn upload_multipart(
        &self,
        bundle_id: &str,
        file_id: &str,
        unit: &UploadUnit,
    ) -> Result<usize> {
        let attempts = self.options.attempts;
        let session = with_retry(attempts, "create_multipart_upload", || {
            self.limited(self.resource.create_multipart_upload(bundle_id, file_id))
        })
        .await
        .map_err(|source| BundleError::Transfer {
            operation: "create_multipart_upload",
            unit: unit.label(),
            source,
        })?;

        let plan = plan_parts(unit.buffer.len(), self.options.chunk_size);
        info!(
            unit = %unit.label(),
            upload_id = %session.upload_id,
            key = %session.key,
            parts = plan.len(),
            "[UPLOAD] Started multipart upload"
        );

        let mut parts = self
            .pool
            .drain(plan.len(), |index| {
                let part = &plan[index];
                let chunk = unit.buffer.slice(part.range.clone());
                let session = &session;
                async move {
                    let uploaded = with_retry(attempts, "upload_part", || {
                        self.limited(self.resource.upload_part(
                            bundle_id,
                            file_id,
                            &session.upload_id,
                            part.part_number,
                            chunk.clone(),
                        ))
                    })
                    .await
                    .map_err(|source| {
                        error!(part_number = part.part_number, error = %source, "[UPLOAD][ERROR] upload_part failed");
                        BundleError::IncompleteMultipart {
                            unit: unit.label(),
                            upload_id: session.upload_id.clone(),
                            part_number: part.part_number,
                            source,
                        }
                    })?;
                    debug!(part_number = part.part_number, etag = %uploaded.etag, "[UPLOAD] Part acknowledged");
                    Ok::<_, BundleError>(UploadedPart {
                        part_number: part.part_number,
                        etag: uploaded.etag,
                    })
                }
            })
            .await?;

        // parts arrive in completion order
        parts.sort_by_key(|p| p.part_number);

        with_retry(attempts, "complete_multipart_upload", || {
            self.limited(self.resource.complete_multipart_upload(
                bundle_id,
                file_id,
                &session.upload_id,
                parts.clone(),
            ))
        })
        .await
        .map_err(|source| BundleError::Transfer {
            operation: "complete_multipart_upload",
            unit: unit.label(),
            source,
        })?;

        info!(unit = %unit.label(), parts = parts.len(), "[UPLOAD] Completed multipart upload");
        Ok(parts.len())
    }

    /// Hold one concurrency permit for the duration of a remote call.
    async fn limited<T, Fut>(&self, call: Fut) -> Result<T, ResourceError>
    where
        Fut: Future<Output = Result<T, ResourceError>>,
    {
        let _permit = self.permits.acquire().await?;
        call.await
    }
}
