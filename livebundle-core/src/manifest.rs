//! Content manifest for manifest-mode bundles.
//!
//! The manifest lists every asset with its SHA-256 checksum and size. It is
//! written to `<root>/manifest.json` before the upload phase starts and is
//! then uploaded like any other asset. A root-level `manifest.json` left over
//! from a previous run never lists itself.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::assets::collect_assets;
use crate::error::{BundleError, Result};
use crate::integrity::checksum_file;

pub const MANIFEST_FILE_NAME: &str = "manifest.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub href: String,
    pub checksum: String,
    pub size_in_bytes: u64,
}

/// Ordered manifest entries; serialized as a bare JSON array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn to_pretty_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn get(&self, href: &str) -> Option<&ManifestEntry> {
        self.entries.iter().find(|e| e.href == href)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Checksum every asset below `root` without touching the filesystem.
pub fn generate_manifest(root: &Path) -> Result<Manifest> {
    let assets = collect_assets(root)?;
    let mut entries = Vec::with_capacity(assets.len());
    for asset in assets {
        if asset.relative_href == MANIFEST_FILE_NAME {
            debug!("Excluding existing manifest from its own entries");
            continue;
        }
        let (checksum, size_in_bytes) = checksum_file(&asset.absolute_path)?;
        debug!(href = %asset.relative_href, %checksum, size_in_bytes, "Manifest entry");
        entries.push(ManifestEntry {
            href: asset.relative_href,
            checksum,
            size_in_bytes,
        });
    }
    Ok(Manifest { entries })
}

/// Generate the manifest and write it to `<root>/manifest.json`.
pub fn write_manifest(root: &Path) -> Result<Manifest> {
    let manifest = generate_manifest(root)?;
    let path = root.join(MANIFEST_FILE_NAME);
    std::fs::write(&path, manifest.to_pretty_json()?).map_err(|e| {
        error!(error = ?e, path = %path.display(), "Failed to write manifest");
        BundleError::filesystem(&path, e)
    })?;
    info!(path = %path.display(), entries = manifest.len(), "Wrote bundle manifest");
    Ok(manifest)
}
