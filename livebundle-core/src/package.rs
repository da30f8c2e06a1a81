//! Archive packaging for zip-mode bundles.

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tracing::{debug, error, info};
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use crate::assets::relative_href;
use crate::error::{BundleError, Result};

const MAX_DEFLATE_LEVEL: i32 = 9;

/// How a bundle's payload is transferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactType {
    /// Every file uploaded individually alongside a generated manifest.
    Manifest,
    /// The whole tree uploaded as one archive.
    #[default]
    Zip,
}

impl std::fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArtifactType::Manifest => f.write_str("manifest"),
            ArtifactType::Zip => f.write_str("zip"),
        }
    }
}

/// What the user pointed `--path` at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactSource {
    Directory(PathBuf),
    Archive(PathBuf),
}

impl ArtifactSource {
    /// Classify `path` and check it is usable for `artifact_type`.
    pub fn resolve(path: &Path, artifact_type: ArtifactType) -> Result<Self> {
        let metadata = std::fs::metadata(path).map_err(|e| {
            error!(error = ?e, path = %path.display(), "Bundle path does not exist or is not readable");
            BundleError::filesystem(path, e)
        })?;

        if metadata.is_dir() {
            return Ok(ArtifactSource::Directory(path.to_path_buf()));
        }

        if artifact_type == ArtifactType::Manifest {
            error!(path = %path.display(), "Manifest artifacts require a directory");
            return Err(BundleError::InvalidArtifactType {
                path: path.to_path_buf(),
            });
        }

        let is_zip = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("zip"))
            .unwrap_or(false);
        if !is_zip {
            error!(path = %path.display(), "Bundle path is neither a directory nor a zip archive");
            return Err(BundleError::filesystem(
                path,
                std::io::Error::other("expected a directory or a .zip archive"),
            ));
        }
        Ok(ArtifactSource::Archive(path.to_path_buf()))
    }

    pub fn path(&self) -> &Path {
        match self {
            ArtifactSource::Directory(p) | ArtifactSource::Archive(p) => p,
        }
    }
}

/// Produce the archive payload for `source`: zip a directory, or read an
/// existing archive unchanged.
pub fn package(source: &ArtifactSource) -> Result<Bytes> {
    match source {
        ArtifactSource::Directory(root) => zip_directory(root),
        ArtifactSource::Archive(path) => {
            let buffer = std::fs::read(path).map_err(|e| {
                error!(error = ?e, path = %path.display(), "Failed to read archive");
                BundleError::filesystem(path, e)
            })?;
            info!(path = %path.display(), size = buffer.len(), "Read existing archive");
            Ok(Bytes::from(buffer))
        }
    }
}

/// Deflate every file below `root` at maximum compression. Entries are added
/// in file-name order with a fixed timestamp so an unchanged tree always
/// yields the same bytes.
pub fn zip_directory(root: &Path) -> Result<Bytes> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(MAX_DEFLATE_LEVEL))
        .last_modified_time(DateTime::default())
        .unix_permissions(0o644);
    let mut files = 0usize;

    for entry in WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .min_depth(1)
    {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            let source = e
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("filesystem loop detected"));
            BundleError::filesystem(path, source)
        })?;
        if entry.file_type().is_dir() {
            let name = relative_href(root, entry.path())?;
            debug!(entry = %name, "Adding directory entry");
            writer.add_directory(format!("{name}/"), options.unix_permissions(0o755))?;
        } else if entry.file_type().is_file() {
            let name = relative_href(root, entry.path())?;
            let content = std::fs::read(entry.path())
                .map_err(|e| BundleError::filesystem(entry.path(), e))?;
            debug!(entry = %name, size = content.len(), "Adding file entry");
            writer.start_file(name, options)?;
            writer
                .write_all(&content)
                .map_err(|e| BundleError::Archive(e.into()))?;
            files += 1;
        } else {
            debug!(path = %entry.path().display(), "Skipping non-regular file");
        }
    }

    let buffer = writer.finish()?.into_inner();
    info!(root = %root.display(), files, size = buffer.len(), "Compressed bundle directory");
    Ok(Bytes::from(buffer))
}
