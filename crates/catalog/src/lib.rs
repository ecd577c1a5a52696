//! Photo catalog builder: scans a photo directory, extracts metadata, and merges it
//! with the previously generated catalog without clobbering curated fields.

pub mod extract;
pub mod identity;
pub mod merge;
pub mod scanner;
pub mod services;
pub mod store;

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub use services::{BuildReport, CatalogBuilder, FileFailure};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Directory unavailable: {}: {source}", .path.display())]
    DirectoryUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode {}: {reason}", .path.display())]
    FileDecode { path: PathBuf, reason: String },

    #[error("EXIF metadata unreadable for {}: {source}", .path.display())]
    Metadata {
        path: PathBuf,
        #[source]
        source: exif::Error,
    },

    #[error("Timed out after {timeout:?} extracting {}", .path.display())]
    ExtractionTimeout { path: PathBuf, timeout: Duration },

    #[error("Existing catalog {} could not be read: {reason}", .path.display())]
    CatalogRead { path: PathBuf, reason: String },

    #[error("Failed to write catalog {}: {source}", .path.display())]
    CatalogWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Worker pool error: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CatalogError>;
