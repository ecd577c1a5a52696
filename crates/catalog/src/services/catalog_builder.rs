use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use app_settings::PipelineSettings;
use chrono::{DateTime, Utc};
use core_types::{Category, PhotoCatalog, PhotoRecord, Season};
use rayon::prelude::*;
use tracing::{debug, error, info, warn};

use crate::extract::{extract_with_deadline, file_modified_at, Extraction};
use crate::merge::{duplicate_ids, merge, sort_newest_first, Disposition, ExistingIndex};
use crate::scanner::{scan_photo_directory, ScannedPhoto};
use crate::store::{load_catalog, write_catalog};
use crate::{CatalogError, Result};

/// A file that could not be processed this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFailure {
    pub filename: String,
    pub reason: String,
}

/// Outcome of one catalog build.
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    pub catalog_path: PathBuf,
    pub scanned: usize,
    pub written: usize,
    pub reused: usize,
    pub added: usize,
    pub refreshed: usize,
    /// Known files that failed to re-extract but kept their previous record.
    pub retained_stale: usize,
    pub removed: Vec<String>,
    pub failures: Vec<FileFailure>,
    pub metadata_warnings: usize,
    pub duplicate_ids: Vec<(String, Vec<String>)>,
    pub categories: Vec<Category>,
    pub seasons: Vec<Season>,
    pub last_updated: DateTime<Utc>,
}

impl BuildReport {
    pub fn error_count(&self) -> usize {
        self.failures.len()
    }

    /// Files that went through extraction (new or modified).
    pub fn processed(&self) -> usize {
        self.added + self.refreshed
    }
}

enum Step {
    Reuse(PhotoRecord),
    Extract {
        photo: ScannedPhoto,
        prior: Option<PhotoRecord>,
    },
}

enum Outcome {
    Reused(PhotoRecord),
    Extracted {
        filename: String,
        prior: Option<PhotoRecord>,
        result: Result<Extraction>,
    },
}

/// Rebuilds the portfolio catalog from the photo directory.
pub struct CatalogBuilder {
    settings: PipelineSettings,
}

impl CatalogBuilder {
    pub fn new(settings: PipelineSettings) -> Self {
        Self { settings }
    }

    pub fn build(&self) -> Result<BuildReport> {
        self.build_at(Utc::now())
    }

    /// Run the whole pipeline, stamping the catalog with `now`.
    pub fn build_at(&self, now: DateTime<Utc>) -> Result<BuildReport> {
        let photos_dir = &self.settings.photos_dir;
        let catalog_path = &self.settings.catalog_file;
        ensure_output_dir(catalog_path)?;

        info!("Scanning for photos in {}", photos_dir.display());
        let existing = match load_catalog(catalog_path)? {
            Some(catalog) => catalog.photos,
            None => {
                info!("Creating new catalog at {}", catalog_path.display());
                Vec::new()
            }
        };
        let photos = scan_photo_directory(photos_dir)?;
        info!("Found {} image files", photos.len());

        let mut index = ExistingIndex::new(existing);
        if !index.is_empty() {
            debug!("{} entries in existing catalog", index.len());
        }
        let mut report = BuildReport {
            catalog_path: catalog_path.clone(),
            scanned: photos.len(),
            ..BuildReport::default()
        };

        let steps = plan(photos, &mut index);
        let outcomes = self.run_extraction(steps)?;

        let mut records = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            if let Some(record) = self.fold_outcome(outcome, &mut report) {
                records.push(record);
            }
        }

        let mut removed: Vec<String> = index.into_remaining().map(|r| r.filename).collect();
        removed.sort();
        for filename in &removed {
            info!("Dropping {filename}: file no longer present");
        }
        report.removed = removed;

        sort_newest_first(&mut records);

        report.duplicate_ids = duplicate_ids(&records);
        for (id, files) in &report.duplicate_ids {
            warn!("Duplicate photo id '{id}' shared by: {}", files.join(", "));
        }
        report.categories = observed_categories(&records);
        report.seasons = observed_seasons(&records);
        report.written = records.len();

        let catalog = PhotoCatalog::new(records, now);
        report.last_updated = catalog.last_updated;
        write_catalog(catalog_path, &catalog)?;

        Ok(report)
    }

    fn run_extraction(&self, steps: Vec<Step>) -> Result<Vec<Outcome>> {
        let prefix = self.settings.url_prefix.as_str();
        let timeout = self.settings.extraction_timeout();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.settings.worker_count())
            .thread_name(|idx| format!("catalog-worker-{idx}"))
            .build()?;

        // Indexed collect keeps scan order regardless of completion order.
        Ok(pool.install(|| {
            steps
                .into_par_iter()
                .map(|step| resolve_step(step, prefix, timeout))
                .collect()
        }))
    }

    fn fold_outcome(&self, outcome: Outcome, report: &mut BuildReport) -> Option<PhotoRecord> {
        match outcome {
            Outcome::Reused(record) => {
                info!("  Using existing metadata for {}", record.filename);
                report.reused += 1;
                Some(record)
            }
            Outcome::Extracted {
                filename,
                prior,
                result: Ok(extraction),
            } => {
                if extraction.metadata_warning.is_some() {
                    report.metadata_warnings += 1;
                }
                if prior.is_some() {
                    report.refreshed += 1;
                } else {
                    report.added += 1;
                }
                let record = merge(prior, &filename, extraction.derived);
                info!(
                    "  Processed {} ({}x{}, {})",
                    filename, record.derived.width, record.derived.height, record.derived.file_size
                );
                Some(record)
            }
            Outcome::Extracted {
                filename,
                prior,
                result: Err(err),
            } => {
                error!("  Error processing {filename}: {err}");
                report.failures.push(FileFailure {
                    filename: filename.clone(),
                    reason: err.to_string(),
                });
                match prior {
                    Some(prior) if self.settings.retain_stale_on_failure => {
                        warn!("  Keeping previous metadata for {filename}");
                        report.retained_stale += 1;
                        Some(prior)
                    }
                    _ => None,
                }
            }
        }
    }
}

/// Classify each scanned file against the previous catalog. Files whose mtime cannot be
/// read are always re-extracted; extraction reports the underlying problem.
fn plan(photos: Vec<ScannedPhoto>, index: &mut ExistingIndex) -> Vec<Step> {
    photos
        .into_iter()
        .map(|photo| {
            info!("Processing: {}", photo.filename);
            let modified = fs::metadata(&photo.path)
                .ok()
                .and_then(|metadata| file_modified_at(&metadata));
            let disposition = match modified {
                Some(modified) => index.take(&photo.filename, modified),
                None => Disposition::Refresh(index.remove(&photo.filename)),
            };
            match disposition {
                Disposition::Reuse(record) => Step::Reuse(record),
                Disposition::Refresh(prior) => Step::Extract { photo, prior },
            }
        })
        .collect()
}

fn resolve_step(step: Step, prefix: &str, timeout: Duration) -> Outcome {
    match step {
        Step::Reuse(record) => Outcome::Reused(record),
        Step::Extract { photo, prior } => Outcome::Extracted {
            result: extract_with_deadline(&photo.path, prefix, timeout),
            filename: photo.filename,
            prior,
        },
    }
}

fn ensure_output_dir(catalog_path: &Path) -> Result<()> {
    match catalog_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|source| CatalogError::DirectoryUnavailable {
                path: parent.to_path_buf(),
                source,
            })
        }
        _ => Ok(()),
    }
}

/// Categories in use, in vocabulary order.
fn observed_categories(records: &[PhotoRecord]) -> Vec<Category> {
    Category::ALL
        .into_iter()
        .filter(|category| records.iter().any(|r| r.curated.categories.contains(category)))
        .collect()
}

fn observed_seasons(records: &[PhotoRecord]) -> Vec<Season> {
    let mut out = Vec::new();
    for season in records.iter().filter_map(|r| r.curated.season) {
        if !out.contains(&season) {
            out.push(season);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use core_types::CuratedFields;
    use std::time::SystemTime;
    use tempfile::{tempdir, TempDir};

    struct Fixture {
        _root: TempDir,
        settings: PipelineSettings,
    }

    impl Fixture {
        fn new() -> Self {
            let root = tempdir().unwrap();
            let settings = PipelineSettings {
                workers: Some(2),
                ..PipelineSettings::for_root(root.path())
            };
            fs::create_dir_all(&settings.photos_dir).unwrap();
            Self {
                _root: root,
                settings,
            }
        }

        fn builder(&self) -> CatalogBuilder {
            CatalogBuilder::new(self.settings.clone())
        }

        fn photo(&self, name: &str) -> PathBuf {
            self.settings.photos_dir.join(name)
        }

        fn write_image(&self, name: &str, width: u32, height: u32) -> PathBuf {
            let path = self.photo(name);
            let img = image::RgbImage::from_pixel(width, height, image::Rgb([200, 120, 30]));
            img.save(&path).unwrap();
            path
        }

        fn set_mtime(&self, name: &str, when: DateTime<Utc>) {
            let file = fs::File::options().write(true).open(self.photo(name)).unwrap();
            file.set_modified(SystemTime::from(when)).unwrap();
        }

        fn catalog_text(&self) -> String {
            fs::read_to_string(&self.settings.catalog_file).unwrap()
        }

        fn catalog(&self) -> PhotoCatalog {
            serde_json::from_str(&self.catalog_text()).unwrap()
        }

        fn record(&self, filename: &str) -> PhotoRecord {
            self.catalog()
                .photos
                .into_iter()
                .find(|p| p.filename == filename)
                .unwrap_or_else(|| panic!("{filename} missing from catalog"))
        }

        /// Simulate a human editing the catalog by hand.
        fn edit_record(&self, filename: &str, edit: impl FnOnce(&mut CuratedFields)) {
            let mut catalog = self.catalog();
            let record = catalog
                .photos
                .iter_mut()
                .find(|p| p.filename == filename)
                .unwrap();
            edit(&mut record.curated);
            fs::write(
                &self.settings.catalog_file,
                serde_json::to_string_pretty(&catalog).unwrap(),
            )
            .unwrap();
        }
    }

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    fn without_last_updated(text: &str) -> String {
        text.lines()
            .filter(|line| !line.contains("\"lastUpdated\""))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn first_run_derives_new_records() {
        let fx = Fixture::new();
        fx.write_image("Morning_Walk-02.JPG", 32, 24);
        fs::write(fx.photo("README.txt"), b"ignored").unwrap();

        let report = fx.builder().build_at(at(2024, 5, 1)).expect("build");
        assert_eq!(report.written, 1);
        assert_eq!(report.added, 1);
        assert_eq!(report.error_count(), 0);

        let record = fx.record("Morning_Walk-02.JPG");
        assert_eq!(record.curated.id, "morning-walk-02");
        assert_eq!(record.curated.title, "Morning Walk 02");
        assert_eq!(record.derived.url, "/photos/Morning_Walk-02.JPG");
        assert_eq!((record.derived.width, record.derived.height), (32, 24));
        assert_eq!(record.derived.format, "jpeg");
        assert_eq!(fx.catalog().last_updated, at(2024, 5, 1));
    }

    #[test]
    fn rerun_without_changes_is_idempotent() {
        let fx = Fixture::new();
        fx.write_image("a.png", 10, 10);
        fx.write_image("b.jpg", 20, 10);

        fx.builder().build_at(at(2024, 5, 1)).expect("first build");
        let first = fx.catalog_text();
        let report = fx.builder().build_at(at(2024, 5, 2)).expect("second build");
        let second = fx.catalog_text();

        assert_eq!(report.reused, 2);
        assert_eq!(report.processed(), 0);
        assert_ne!(first, second, "lastUpdated advances");
        assert_eq!(without_last_updated(&first), without_last_updated(&second));
    }

    #[test]
    fn unchanged_file_keeps_human_edits() {
        let fx = Fixture::new();
        fx.write_image("street.jpg", 10, 10);
        fx.builder().build().expect("first build");
        fx.edit_record("street.jpg", |curated| {
            curated.title = "Custom Title".to_string();
            curated.categories = vec![Category::Street];
        });

        let report = fx.builder().build().expect("second build");
        assert_eq!(report.reused, 1);
        let record = fx.record("street.jpg");
        assert_eq!(record.curated.title, "Custom Title");
        assert_eq!(record.curated.categories, vec![Category::Street]);
    }

    #[test]
    fn modified_file_refreshes_derived_fields_only() {
        let fx = Fixture::new();
        fx.write_image("street.jpg", 10, 10);
        fx.set_mtime("street.jpg", at(2024, 1, 1));
        fx.builder().build().expect("first build");
        fx.edit_record("street.jpg", |curated| {
            curated.id = "kept-id".to_string();
            curated.title = "Custom Title".to_string();
            curated.description = "Rain on glass".to_string();
            curated.categories = vec![Category::Street, Category::Monochrome];
            curated.season = Some(Season::SpringSummer25);
        });
        let before = fx.record("street.jpg");

        fx.write_image("street.jpg", 40, 30);
        fx.set_mtime("street.jpg", at(2024, 3, 1));
        let report = fx.builder().build().expect("second build");

        assert_eq!(report.refreshed, 1);
        let after = fx.record("street.jpg");
        assert_eq!(after.curated, before.curated);
        assert_eq!((after.derived.width, after.derived.height), (40, 30));
        assert_eq!(after.derived.date_created, at(2024, 3, 1));
        assert_ne!(after.derived.date_created, before.derived.date_created);
    }

    #[test]
    fn hand_added_keys_survive_reuse_and_refresh() {
        let fx = Fixture::new();
        fx.write_image("street.jpg", 10, 10);
        fx.set_mtime("street.jpg", at(2024, 1, 1));
        fx.builder().build().expect("first build");

        let mut doc: serde_json::Value = serde_json::from_str(&fx.catalog_text()).unwrap();
        doc["photos"][0]["featured"] = serde_json::json!(true);
        fs::write(
            &fx.settings.catalog_file,
            serde_json::to_string_pretty(&doc).unwrap(),
        )
        .unwrap();

        fx.builder().build().expect("reuse build");
        let reused: serde_json::Value = serde_json::from_str(&fx.catalog_text()).unwrap();
        assert_eq!(reused["photos"][0]["featured"], serde_json::json!(true));

        fx.write_image("street.jpg", 30, 20);
        fx.set_mtime("street.jpg", at(2024, 3, 1));
        let report = fx.builder().build().expect("refresh build");
        assert_eq!(report.refreshed, 1);
        let refreshed: serde_json::Value = serde_json::from_str(&fx.catalog_text()).unwrap();
        assert_eq!(refreshed["photos"][0]["featured"], serde_json::json!(true));
        assert_eq!(refreshed["photos"][0]["width"], serde_json::json!(30));
    }

    #[test]
    fn deleted_files_are_dropped() {
        let fx = Fixture::new();
        fx.write_image("keep.png", 10, 10);
        fx.write_image("gone.png", 10, 10);
        fx.builder().build().expect("first build");

        fs::remove_file(fx.photo("gone.png")).unwrap();
        let report = fx.builder().build().expect("second build");

        assert_eq!(report.removed, vec!["gone.png".to_string()]);
        let names: Vec<_> = fx.catalog().photos.into_iter().map(|p| p.filename).collect();
        assert_eq!(names, vec!["keep.png".to_string()]);
    }

    #[test]
    fn corrupt_file_is_isolated() {
        let fx = Fixture::new();
        for idx in 0..5 {
            fx.write_image(&format!("ok-{idx}.png"), 8, 8);
        }
        fs::write(fx.photo("corrupt.jpg"), b"\xFF\xD8 truncated garbage").unwrap();

        let report = fx.builder().build().expect("build still succeeds");
        assert_eq!(report.written, 5);
        assert_eq!(report.error_count(), 1);
        assert_eq!(report.failures[0].filename, "corrupt.jpg");
        assert_eq!(fx.catalog().photos.len(), 5);
    }

    fn break_known_file(fx: &Fixture, name: &str) {
        fx.write_image(name, 10, 10);
        fx.set_mtime(name, at(2024, 1, 1));
        fx.builder().build().expect("first build");
        assert_eq!(fx.catalog().photos.len(), 1);

        fs::write(fx.photo(name), b"now broken").unwrap();
        fx.set_mtime(name, at(2024, 2, 1));
    }

    #[test]
    fn undecodable_known_file_is_dropped_by_default() {
        let fx = Fixture::new();
        break_known_file(&fx, "flaky.png");

        let report = fx.builder().build().expect("second build");
        assert_eq!(report.error_count(), 1);
        assert_eq!(report.failures[0].filename, "flaky.png");
        assert_eq!(report.retained_stale, 0);
        assert_eq!(report.written, 0);
        assert!(fx.catalog().photos.is_empty());
    }

    #[test]
    fn stale_record_kept_when_retention_enabled() {
        let fx = Fixture::new();
        break_known_file(&fx, "flaky.jpg");

        let retaining = CatalogBuilder::new(PipelineSettings {
            retain_stale_on_failure: true,
            ..fx.settings.clone()
        });
        let report = retaining.build().expect("second build");
        assert_eq!(report.error_count(), 1);
        assert_eq!(report.retained_stale, 1);
        assert_eq!(fx.record("flaky.jpg").derived.width, 10);
    }

    #[test]
    fn corrupt_exif_is_counted_but_photo_is_kept() {
        let fx = Fixture::new();
        crate::extract::tests::write_jpeg_with_corrupt_exif(&fx.photo("mangled.jpg"), 20, 10);
        fx.write_image("clean.png", 10, 10);

        let report = fx.builder().build().expect("build");
        assert_eq!(report.metadata_warnings, 1);
        assert_eq!(report.error_count(), 0);
        assert_eq!(report.written, 2);
        let record = fx.record("mangled.jpg");
        assert_eq!((record.derived.width, record.derived.height), (20, 10));
        assert!(record.derived.camera.is_none());
    }

    #[test]
    fn records_sorted_newest_first() {
        let fx = Fixture::new();
        fx.write_image("older.png", 10, 10);
        fx.write_image("newer.png", 10, 10);
        fx.write_image("middle.png", 10, 10);
        fx.set_mtime("older.png", at(2024, 1, 1));
        fx.set_mtime("middle.png", at(2024, 2, 1));
        fx.set_mtime("newer.png", at(2024, 3, 1));

        fx.builder().build().expect("build");
        let order: Vec<_> = fx.catalog().photos.into_iter().map(|p| p.filename).collect();
        assert_eq!(order, vec!["newer.png", "middle.png", "older.png"]);
    }

    #[test]
    fn files_without_exif_omit_optional_fields() {
        let fx = Fixture::new();
        fx.write_image("plain.png", 12, 9);
        fx.builder().build().expect("build");

        let catalog: serde_json::Value = serde_json::from_str(&fx.catalog_text()).unwrap();
        let photo = &catalog["photos"][0];
        for absent in ["camera", "lens", "settings", "dateTaken"] {
            assert!(photo.get(absent).is_none(), "{absent} should be omitted");
        }
        for present in ["width", "height", "format", "fileSize", "dateCreated"] {
            assert!(photo.get(present).is_some(), "{present} should be present");
        }
        assert!(photo["season"].is_null());
    }

    #[test]
    fn malformed_catalog_aborts_without_overwriting() {
        let fx = Fixture::new();
        fx.write_image("a.png", 10, 10);
        fs::create_dir_all(fx.settings.catalog_file.parent().unwrap()).unwrap();
        fs::write(&fx.settings.catalog_file, "{ hand-edited, broken").unwrap();

        let err = fx.builder().build().unwrap_err();
        assert!(matches!(err, CatalogError::CatalogRead { .. }));
        assert_eq!(fx.catalog_text(), "{ hand-edited, broken");
    }

    #[test]
    fn unusable_photo_directory_is_fatal() {
        let fx = Fixture::new();
        fs::remove_dir_all(&fx.settings.photos_dir).unwrap();
        fs::write(&fx.settings.photos_dir, b"not a directory").unwrap();

        let err = fx.builder().build().unwrap_err();
        assert!(matches!(err, CatalogError::DirectoryUnavailable { .. }));
        assert!(!fx.settings.catalog_file.exists());
    }

    #[test]
    fn summary_lists_observed_vocabulary() {
        let fx = Fixture::new();
        fx.write_image("a.png", 10, 10);
        fx.write_image("b.png", 10, 10);
        fx.builder().build().expect("first build");
        fx.edit_record("a.png", |c| {
            c.categories = vec![Category::Best, Category::Street];
            c.season = Some(Season::FallWinter24);
        });
        fx.edit_record("b.png", |c| c.categories = vec![Category::Street]);

        let report = fx.builder().build().expect("second build");
        assert_eq!(report.categories, vec![Category::Best, Category::Street]);
        assert_eq!(report.seasons, vec![Season::FallWinter24]);
    }
}
