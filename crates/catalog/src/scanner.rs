use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;
use walkdir::WalkDir;

use crate::{CatalogError, Result};

pub const SUPPORTED_PHOTO_EXTENSIONS: &[&str] =
    &["jpg", "jpeg", "png", "webp", "avif", "tiff", "tif"];

/// A photo found on disk. `filename` is the join key against the existing catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedPhoto {
    pub filename: String,
    pub path: PathBuf,
}

/// List the supported photos directly inside `dir`, creating the directory when missing.
///
/// Subdirectories are not descended into; the site serves a flat photo folder.
pub fn scan_photo_directory(dir: &Path) -> Result<Vec<ScannedPhoto>> {
    fs::create_dir_all(dir).map_err(|source| CatalogError::DirectoryUnavailable {
        path: dir.to_path_buf(),
        source,
    })?;
    fs::read_dir(dir).map_err(|source| CatalogError::DirectoryUnavailable {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut out = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("Skipping unreadable entry in {}: {err}", dir.display());
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.into_path();
        if !is_supported_photo(&path) {
            continue;
        }

        let filename = match path.file_name().and_then(OsStr::to_str) {
            Some(name) => name.to_string(),
            None => {
                warn!("Skipping file with non UTF-8 name: {}", path.display());
                continue;
            }
        };

        out.push(ScannedPhoto { filename, path });
    }

    out.sort_by(|a, b| a.filename.cmp(&b.filename));
    Ok(out)
}

pub fn is_supported_photo(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .map(|ext| {
            SUPPORTED_PHOTO_EXTENSIONS
                .iter()
                .any(|candidate| candidate.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}
