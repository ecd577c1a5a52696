use std::ffi::OsStr;
use std::fs;
use std::io::BufReader;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use core_types::isobmff::read_ispe_dimensions;
use core_types::timestamp::truncate_to_millis;
use core_types::{CaptureSettings, DerivedFields};
use exif::{Field, In, Reader, Tag, Value as ExifValue};
use image::{ImageFormat, ImageReader};
use tracing::{debug, warn};

use crate::identity::{format_file_size, photo_url, trim_decimal};
use crate::{CatalogError, Result};

/// Freshly derived fields for one file, plus any non-fatal EXIF problem.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub derived: DerivedFields,
    pub metadata_warning: Option<String>,
}

/// Dimensions and encoding read from the image header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Intrinsic {
    pub width: u32,
    pub height: u32,
    pub format: Option<ImageFormat>,
}

/// Capture metadata embedded by the camera. Every field is independently optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmbeddedMetadata {
    pub date_taken: Option<DateTime<Utc>>,
    pub camera: Option<String>,
    pub lens: Option<String>,
    pub settings: Option<CaptureSettings>,
}

/// Run [`extract_photo`] on a helper thread, giving up after `timeout`.
pub fn extract_with_deadline(
    path: &Path,
    url_prefix: &str,
    timeout: Duration,
) -> Result<Extraction> {
    let owned_path = path.to_path_buf();
    let prefix = url_prefix.to_string();
    run_with_deadline(path, timeout, move || extract_photo(&owned_path, &prefix))
}

/// A timed-out worker is left to finish on its own; its result is discarded.
fn run_with_deadline<T, F>(path: &Path, timeout: Duration, job: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("photo-extract".to_string())
        .spawn(move || {
            let _ = tx.send(job());
        })
        .map_err(|err| CatalogError::FileDecode {
            path: path.to_path_buf(),
            reason: format!("failed to spawn extraction worker: {err}"),
        })?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => Err(CatalogError::ExtractionTimeout {
            path: path.to_path_buf(),
            timeout,
        }),
        Err(RecvTimeoutError::Disconnected) => Err(CatalogError::FileDecode {
            path: path.to_path_buf(),
            reason: "extraction worker exited without a result".to_string(),
        }),
    }
}

/// Derive every non-curated field for the file at `path`.
pub fn extract_photo(path: &Path, url_prefix: &str) -> Result<Extraction> {
    let filename = path
        .file_name()
        .and_then(OsStr::to_str)
        .ok_or_else(|| decode_failure(path, "path is missing a valid filename"))?;
    let metadata = fs::metadata(path)
        .map_err(|err| decode_failure(path, format!("failed to read file metadata: {err}")))?;
    let modified = file_modified_at(&metadata)
        .ok_or_else(|| decode_failure(path, "file modification time unavailable"))?;

    let intrinsic = read_intrinsic(path)?;

    let (embedded, metadata_warning) = match read_embedded(path) {
        Ok(embedded) => (embedded, None),
        Err(err) => {
            warn!("{err}");
            (EmbeddedMetadata::default(), Some(err.to_string()))
        }
    };

    let derived = DerivedFields {
        url: photo_url(url_prefix, filename),
        width: intrinsic.width,
        height: intrinsic.height,
        date_created: modified,
        date_taken: embedded.date_taken,
        camera: embedded.camera,
        lens: embedded.lens,
        settings: embedded.settings,
        file_size: format_file_size(metadata.len()),
        format: format_label(intrinsic.format, path),
    };

    Ok(Extraction {
        derived,
        metadata_warning,
    })
}

/// Modification time at the precision the catalog stores.
pub fn file_modified_at(metadata: &fs::Metadata) -> Option<DateTime<Utc>> {
    metadata
        .modified()
        .ok()
        .map(|time| truncate_to_millis(DateTime::<Utc>::from(time)))
}

pub fn read_intrinsic(path: &Path) -> Result<Intrinsic> {
    let reader = ImageReader::open(path)
        .and_then(|reader| reader.with_guessed_format())
        .map_err(|err| decode_failure(path, format!("failed to open image: {err}")))?;
    let format = reader.format();

    match catch_unwind(AssertUnwindSafe(|| reader.into_dimensions())) {
        Ok(Ok((width, height))) => Ok(Intrinsic {
            width,
            height,
            format,
        }),
        Ok(Err(err)) => {
            if format == Some(ImageFormat::Avif) {
                if let Some((width, height)) = read_ispe_dimensions(path).ok().flatten() {
                    debug!("Read AVIF dimensions from ispe box: {}", path.display());
                    return Ok(Intrinsic {
                        width,
                        height,
                        format,
                    });
                }
            }
            Err(decode_failure(path, err.to_string()))
        }
        Err(_) => Err(decode_failure(path, "image decoder panicked")),
    }
}

/// Read EXIF from the file. A file without an EXIF block is not an error.
pub fn read_embedded(path: &Path) -> Result<EmbeddedMetadata> {
    let metadata_failure = |source: exif::Error| CatalogError::Metadata {
        path: path.to_path_buf(),
        source,
    };

    let file = fs::File::open(path).map_err(|err| metadata_failure(err.into()))?;
    let mut reader = BufReader::new(file);
    match Reader::new().read_from_container(&mut reader) {
        Ok(exif) => Ok(EmbeddedMetadata::from_fields(exif.fields())),
        Err(exif::Error::NotFound(container)) => {
            debug!("No EXIF data in {} ({container})", path.display());
            Ok(EmbeddedMetadata::default())
        }
        Err(err) => Err(metadata_failure(err)),
    }
}

impl EmbeddedMetadata {
    /// Summarize primary-image EXIF fields. Thumbnail IFD fields are ignored.
    pub fn from_fields<'a>(fields: impl IntoIterator<Item = &'a Field>) -> Self {
        let mut raw = RawExif::default();
        for field in fields {
            if field.ifd_num != In::PRIMARY {
                continue;
            }
            match field.tag {
                Tag::Make => raw.make = raw.make.take().or_else(|| exif_string(&field.value)),
                Tag::Model => raw.model = raw.model.take().or_else(|| exif_string(&field.value)),
                Tag::LensModel => {
                    raw.lens_model = raw.lens_model.take().or_else(|| exif_string(&field.value))
                }
                Tag::LensMake => {
                    raw.lens_make = raw.lens_make.take().or_else(|| exif_string(&field.value))
                }
                Tag::FNumber => {
                    raw.f_number = raw.f_number.or_else(|| rational_value(&field.value))
                }
                Tag::ExposureTime => {
                    raw.exposure = raw.exposure.or_else(|| rational_parts(&field.value))
                }
                Tag::PhotographicSensitivity => {
                    raw.iso = raw.iso.or_else(|| int_value(&field.value))
                }
                Tag::FocalLength => {
                    raw.focal_length = raw.focal_length.or_else(|| rational_value(&field.value))
                }
                Tag::DateTimeOriginal => {
                    raw.date_original = raw
                        .date_original
                        .or_else(|| parse_exif_datetime(&field.value))
                }
                Tag::DateTime => {
                    raw.date_time = raw.date_time.or_else(|| parse_exif_datetime(&field.value))
                }
                _ => {}
            }
        }
        raw.into_metadata()
    }
}

#[derive(Default)]
struct RawExif {
    make: Option<String>,
    model: Option<String>,
    lens_model: Option<String>,
    lens_make: Option<String>,
    f_number: Option<f64>,
    exposure: Option<(u32, u32)>,
    iso: Option<i64>,
    focal_length: Option<f64>,
    date_original: Option<DateTime<Utc>>,
    date_time: Option<DateTime<Utc>>,
}

impl RawExif {
    fn into_metadata(self) -> EmbeddedMetadata {
        let camera = match (self.make, self.model) {
            (Some(make), Some(model)) => Some(format!("{make} {model}")),
            _ => None,
        };

        let settings = CaptureSettings {
            aperture: self.f_number.and_then(format_aperture),
            shutter: self.exposure.and_then(format_shutter),
            iso: self.iso.filter(|iso| *iso > 0).map(|iso| iso.to_string()),
            focal_length: self.focal_length.and_then(format_focal_length),
        };

        EmbeddedMetadata {
            date_taken: self.date_original.or(self.date_time),
            camera,
            lens: self.lens_model.or(self.lens_make),
            settings: settings.non_empty(),
        }
    }
}

fn format_aperture(f_number: f64) -> Option<String> {
    (f_number.is_finite() && f_number > 0.0).then(|| format!("f/{}", trim_decimal(f_number, 1)))
}

/// `1/250s` for sub-second exposures, `2s` / `1.5s` otherwise.
fn format_shutter((num, denom): (u32, u32)) -> Option<String> {
    if num == 0 || denom == 0 {
        return None;
    }
    if num >= denom {
        let seconds = f64::from(num) / f64::from(denom);
        Some(format!("{}s", trim_decimal(seconds, 1)))
    } else {
        let reciprocal = (f64::from(denom) / f64::from(num)).round() as u64;
        Some(format!("1/{reciprocal}s"))
    }
}

fn format_focal_length(focal_length: f64) -> Option<String> {
    (focal_length.is_finite() && focal_length > 0.0)
        .then(|| format!("{}mm", trim_decimal(focal_length, 1)))
}

fn format_label(format: Option<ImageFormat>, path: &Path) -> String {
    match format {
        Some(ImageFormat::Jpeg) => "jpeg".to_string(),
        Some(ImageFormat::Png) => "png".to_string(),
        Some(ImageFormat::WebP) => "webp".to_string(),
        Some(ImageFormat::Avif) => "avif".to_string(),
        Some(ImageFormat::Tiff) => "tiff".to_string(),
        Some(other) => format!("{other:?}").to_ascii_lowercase(),
        None => path
            .extension()
            .and_then(OsStr::to_str)
            .map(|ext| ext.to_ascii_lowercase())
            .unwrap_or_default(),
    }
}

fn decode_failure(path: &Path, reason: impl Into<String>) -> CatalogError {
    CatalogError::FileDecode {
        path: PathBuf::from(path),
        reason: reason.into(),
    }
}

fn exif_string(value: &ExifValue) -> Option<String> {
    match value {
        ExifValue::Ascii(values) => values
            .first()
            .and_then(|raw| std::str::from_utf8(raw).ok())
            .map(|s| s.trim_matches('\u{0}').trim().to_string())
            .filter(|s| !s.is_empty()),
        _ => None,
    }
}

fn parse_exif_datetime(value: &ExifValue) -> Option<DateTime<Utc>> {
    let raw = exif_string(value)?;
    NaiveDateTime::parse_from_str(raw.trim(), "%Y:%m:%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

fn rational_value(value: &ExifValue) -> Option<f64> {
    match value {
        ExifValue::Rational(values) => values
            .first()
            .filter(|r| r.denom != 0)
            .map(|r| r.to_f64()),
        ExifValue::SRational(values) => values
            .first()
            .filter(|r| r.denom != 0)
            .map(|r| r.to_f64()),
        _ => None,
    }
}

fn rational_parts(value: &ExifValue) -> Option<(u32, u32)> {
    match value {
        ExifValue::Rational(values) => values.first().map(|r| (r.num, r.denom)),
        _ => None,
    }
}

fn int_value(value: &ExifValue) -> Option<i64> {
    match value {
        ExifValue::Byte(values) => values.first().map(|v| *v as i64),
        ExifValue::Short(values) => values.first().map(|v| *v as i64),
        ExifValue::Long(values) => values.first().map(|v| *v as i64),
        ExifValue::SByte(values) => values.first().map(|v| *v as i64),
        ExifValue::SShort(values) => values.first().map(|v| *v as i64),
        ExifValue::SLong(values) => values.first().map(|v| *v as i64),
        _ => None,
    }
}
