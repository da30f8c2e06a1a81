//! Asset collection: enumerate the web-asset tree of a bundle.
//!
//! The tree is walked once, depth-first, in file-name order. Symbolic links
//! are not followed and are skipped together with sockets, FIFOs and device
//! nodes. An entry that cannot be read aborts the walk, and so does a file
//! whose path is not valid UTF-8.

use std::path::{Component, Path, PathBuf};

use tracing::{debug, error, info};
use walkdir::WalkDir;

use crate::error::{BundleError, Result};

/// A regular file found under the asset root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    /// Root-relative path using `/` separators, e.g. `assets/app.js`.
    pub relative_href: String,
    pub absolute_path: PathBuf,
    pub mime_type: String,
}

/// Collect every regular file below `root`.
pub fn collect_assets(root: &Path) -> Result<Vec<FileDescriptor>> {
    let metadata = std::fs::metadata(root).map_err(|e| {
        error!(error = ?e, path = %root.display(), "Asset root is not readable");
        BundleError::filesystem(root, e)
    })?;
    if !metadata.is_dir() {
        error!(path = %root.display(), "Asset root is not a directory");
        return Err(BundleError::filesystem(
            root,
            std::io::Error::other("not a directory"),
        ));
    }

    let mut assets = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
    {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            error!(error = %e, path = %path.display(), "Failed to read entry while collecting assets");
            let source = e
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("filesystem loop detected"));
            BundleError::filesystem(path, source)
        })?;

        let file_type = entry.file_type();
        if file_type.is_dir() {
            continue;
        }
        if !file_type.is_file() {
            debug!(path = %entry.path().display(), "Skipping non-regular file");
            continue;
        }

        let absolute_path = entry.path().to_path_buf();
        let relative_href = relative_href(root, &absolute_path)?;
        let mime_type = mime_guess::from_path(&absolute_path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        debug!(href = %relative_href, mime = %mime_type, "Collected asset");
        assets.push(FileDescriptor {
            relative_href,
            absolute_path,
            mime_type,
        });
    }

    info!(root = %root.display(), count = assets.len(), "Collected assets");
    Ok(assets)
}

/// Strip `root` from `path` and join the remaining components with `/`.
///
/// Fails with [`BundleError::Filesystem`] when a component is not valid UTF-8.
pub fn relative_href(root: &Path, path: &Path) -> Result<String> {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let mut parts = Vec::new();
    for component in relative.components() {
        if let Component::Normal(part) = component {
            let part = part.to_str().ok_or_else(|| {
                error!(path = %path.display(), "Asset path is not valid UTF-8");
                BundleError::filesystem(
                    path,
                    std::io::Error::new(std::io::ErrorKind::InvalidData, "path is not valid UTF-8"),
                )
            })?;
            parts.push(part);
        }
    }
    Ok(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_href_uses_forward_slashes() {
        let root = Path::new("/tmp/www");
        let path = root.join("assets").join("js").join("app.js");
        assert_eq!(relative_href(root, &path).unwrap(), "assets/js/app.js");
    }

    #[test]
    fn relative_href_of_top_level_file() {
        let root = Path::new("/tmp/www");
        assert_eq!(relative_href(root, &root.join("index.html")).unwrap(), "index.html");
    }
}
