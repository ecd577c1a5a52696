use std::path::PathBuf;

pub mod icons;

pub use icons::{GeneratedIcon, IconFormat, IconGenerator, IconSpec, SITE_ICONS};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(
        "Source image not found at {}; add a square image of at least 1024x1024 pixels there",
        .0.display()
    )]
    SourceMissing(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Decode error for {}: {reason}", .path.display())]
    Decode { path: PathBuf, reason: String },

    #[error("Encode error for {}: {reason}", .path.display())]
    Encode { path: PathBuf, reason: String },
}

pub type Result<T> = std::result::Result<T, EngineError>;
