//! Site icon and social preview derivatives from a single source image.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader};
use tracing::{debug, info};

use crate::{EngineError, Result};

const OG_JPEG_QUALITY: u8 = 85;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IconFormat {
    Png,
    Jpeg { quality: u8 },
}

/// One output file: exact pixel size and encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IconSpec {
    pub file_name: &'static str,
    pub width: u32,
    pub height: u32,
    pub format: IconFormat,
}

impl IconSpec {
    const fn png(file_name: &'static str, size: u32) -> Self {
        Self {
            file_name,
            width: size,
            height: size,
            format: IconFormat::Png,
        }
    }
}

pub const SITE_ICONS: [IconSpec; 6] = [
    IconSpec::png("icon-192.png", 192),
    IconSpec::png("icon-512.png", 512),
    IconSpec::png("apple-touch-icon.png", 180),
    IconSpec::png("favicon-32x32.png", 32),
    IconSpec::png("favicon-16x16.png", 16),
    IconSpec {
        file_name: "og-image.jpg",
        width: 1200,
        height: 630,
        format: IconFormat::Jpeg {
            quality: OG_JPEG_QUALITY,
        },
    },
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedIcon {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

pub struct IconGenerator {
    source: PathBuf,
    output_dir: PathBuf,
}

impl IconGenerator {
    pub fn new(source: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            output_dir: output_dir.into(),
        }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Write every entry of [`SITE_ICONS`] into the output directory.
    pub fn generate(&self) -> Result<Vec<GeneratedIcon>> {
        self.generate_specs(&SITE_ICONS)
    }

    pub fn generate_specs(&self, specs: &[IconSpec]) -> Result<Vec<GeneratedIcon>> {
        let source = self.load_source()?;
        fs::create_dir_all(&self.output_dir)?;

        specs
            .iter()
            .map(|spec| {
                let path = self.output_dir.join(spec.file_name);
                write_icon(&source, spec, &path)?;
                info!("Generated {}", spec.file_name);
                Ok(GeneratedIcon {
                    path,
                    width: spec.width,
                    height: spec.height,
                })
            })
            .collect()
    }

    fn load_source(&self) -> Result<DynamicImage> {
        if !self.source.is_file() {
            return Err(EngineError::SourceMissing(self.source.clone()));
        }
        let decode_failure = |reason: String| EngineError::Decode {
            path: self.source.clone(),
            reason,
        };

        let img = ImageReader::open(&self.source)?
            .with_guessed_format()?
            .decode()
            .map_err(|e| decode_failure(e.to_string()))?;
        debug!(
            "Loaded {} ({}x{})",
            self.source.display(),
            img.width(),
            img.height()
        );
        Ok(img)
    }
}

/// Cover-fit resize: scale to fill, then crop the overflow evenly from both sides.
fn write_icon(source: &DynamicImage, spec: &IconSpec, path: &Path) -> Result<()> {
    let resized = source.resize_to_fill(spec.width, spec.height, FilterType::Lanczos3);
    let encode_failure = |reason: String| EngineError::Encode {
        path: path.to_path_buf(),
        reason,
    };

    match spec.format {
        IconFormat::Png => resized
            .save_with_format(path, ImageFormat::Png)
            .map_err(|e| encode_failure(e.to_string())),
        IconFormat::Jpeg { quality } => {
            let mut writer = BufWriter::new(File::create(path)?);
            JpegEncoder::new_with_quality(&mut writer, quality)
                .encode_image(&resized.to_rgb8())
                .map_err(|e| encode_failure(e.to_string()))?;
            writer.flush()?;
            Ok(())
        }
    }
}
