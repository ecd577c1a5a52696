use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;

use core_types::PhotoCatalog;
use tempfile::NamedTempFile;

use crate::{CatalogError, Result};

/// Load the previous catalog. A missing file is `Ok(None)`; an unreadable or malformed
/// one is an error so curated fields are never silently discarded.
pub fn load_catalog(path: &Path) -> Result<Option<PhotoCatalog>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(CatalogError::CatalogRead {
                path: path.to_path_buf(),
                reason: err.to_string(),
            })
        }
    };

    serde_json::from_str(&content)
        .map(Some)
        .map_err(|err| CatalogError::CatalogRead {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })
}

/// Pretty-printed catalog document, exactly as written to disk.
pub fn render_catalog(catalog: &PhotoCatalog) -> Result<String> {
    Ok(serde_json::to_string_pretty(catalog)?)
}

/// Replace the catalog at `path` atomically: write a sibling temp file, then rename.
/// On failure the previous document is left untouched.
pub fn write_catalog(path: &Path, catalog: &PhotoCatalog) -> Result<()> {
    let payload = render_catalog(catalog)?;
    let write_failure = |source: std::io::Error| CatalogError::CatalogWrite {
        path: path.to_path_buf(),
        source,
    };

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|source| CatalogError::DirectoryUnavailable {
        path: parent.to_path_buf(),
        source,
    })?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(write_failure)?;
    tmp.write_all(payload.as_bytes()).map_err(write_failure)?;
    tmp.as_file().sync_all().map_err(write_failure)?;
    tmp.persist(path).map_err(|err| write_failure(err.error))?;
    Ok(())
}
