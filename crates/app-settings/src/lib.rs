use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Optional per-project override file, looked up in the project root.
pub const SETTINGS_FILE_NAME: &str = "portfolio.settings.json";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Settings parse error in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, SettingsError>;

/// Paths and knobs shared by the catalog builder and the icon generator.
///
/// Relative paths are resolved against the project root by [`PipelineSettings::load`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub photos_dir: PathBuf,
    pub catalog_file: PathBuf,
    /// Public path the site serves `photos_dir` under.
    pub url_prefix: String,
    pub icon_source: PathBuf,
    pub public_dir: PathBuf,
    pub extraction_timeout_secs: u64,
    /// Extraction worker count; `None` uses available parallelism.
    pub workers: Option<usize>,
    /// Keep the previous record when a known file fails to re-extract. Off by default:
    /// an undecodable file is left out of the catalog.
    pub retain_stale_on_failure: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            photos_dir: PathBuf::from("public").join("photos"),
            catalog_file: PathBuf::from("data").join("portfolio.json"),
            url_prefix: "/photos/".to_string(),
            icon_source: PathBuf::from("source-image.jpg"),
            public_dir: PathBuf::from("public"),
            extraction_timeout_secs: 30,
            workers: None,
            retain_stale_on_failure: false,
        }
    }
}

impl PipelineSettings {
    /// Load settings for the project rooted at `root`, falling back to defaults when
    /// no settings file exists.
    pub fn load(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let path = root.join(SETTINGS_FILE_NAME);
        let settings = if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|source| SettingsError::Io {
                path: path.clone(),
                source,
            })?;
            serde_json::from_str(&content).map_err(|source| SettingsError::Json {
                path: path.clone(),
                source,
            })?
        } else {
            PipelineSettings::default()
        };
        Ok(settings.resolved_against(root))
    }

    /// Defaults anchored at `root`, ignoring any settings file.
    pub fn for_root(root: impl AsRef<Path>) -> Self {
        PipelineSettings::default().resolved_against(root.as_ref())
    }

    pub fn resolved_against(mut self, root: &Path) -> Self {
        self.photos_dir = resolve(root, &self.photos_dir);
        self.catalog_file = resolve(root, &self.catalog_file);
        self.icon_source = resolve(root, &self.icon_source);
        self.public_dir = resolve(root, &self.public_dir);
        self
    }

    pub fn extraction_timeout(&self) -> Duration {
        Duration::from_secs(self.extraction_timeout_secs.max(1))
    }

    pub fn worker_count(&self) -> usize {
        self.workers.filter(|n| *n > 0).unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }
}

fn resolve(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}
