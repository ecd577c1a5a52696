//! Field-level merge between the previous catalog and freshly derived metadata.
//!
//! Curated fields (id, title, description, categories, season) belong to the editor and
//! survive reprocessing; derived fields always come from the latest extraction.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use core_types::{CuratedFields, DerivedFields, PhotoRecord};
use serde_json::Map;

use crate::identity::{photo_id, photo_title};

/// What to do with a scanned file given what the previous catalog knows about it.
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    /// Backing file unchanged since the record was written; reuse it verbatim.
    Reuse(PhotoRecord),
    /// New or modified file; extract and merge with the prior record, if any.
    Refresh(Option<PhotoRecord>),
}

/// Previous catalog entries indexed by filename.
#[derive(Debug, Default)]
pub struct ExistingIndex {
    by_filename: HashMap<String, PhotoRecord>,
}

impl ExistingIndex {
    pub fn new(records: impl IntoIterator<Item = PhotoRecord>) -> Self {
        let by_filename = records
            .into_iter()
            .map(|record| (record.filename.clone(), record))
            .collect();
        Self { by_filename }
    }

    pub fn len(&self) -> usize {
        self.by_filename.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_filename.is_empty()
    }

    /// Remove and classify the entry for `filename`. Entries never taken are the
    /// records whose files disappeared.
    pub fn take(&mut self, filename: &str, modified: DateTime<Utc>) -> Disposition {
        match self.by_filename.remove(filename) {
            Some(existing) if is_unchanged(&existing, modified) => Disposition::Reuse(existing),
            other => Disposition::Refresh(other),
        }
    }

    /// Remove the entry for `filename` without checking freshness.
    pub fn remove(&mut self, filename: &str) -> Option<PhotoRecord> {
        self.by_filename.remove(filename)
    }

    pub fn into_remaining(self) -> impl Iterator<Item = PhotoRecord> {
        self.by_filename.into_values()
    }
}

/// A file is unchanged when its mtime is not newer than the stored `dateCreated`.
pub fn is_unchanged(existing: &PhotoRecord, modified: DateTime<Utc>) -> bool {
    modified <= existing.derived.date_created
}

/// Curated fields for a file seen for the first time.
pub fn derive_curated(filename: &str) -> CuratedFields {
    CuratedFields {
        id: photo_id(filename),
        title: photo_title(filename),
        ..CuratedFields::default()
    }
}

/// Combine a prior record (if any) with freshly derived fields.
///
/// Curated fields and unrecognized keys come from `existing` when present; an empty id
/// or title counts as unset and is derived from the filename. Derived fields always come
/// from `derived`.
pub fn merge(existing: Option<PhotoRecord>, filename: &str, derived: DerivedFields) -> PhotoRecord {
    let (curated, extra) = match existing {
        Some(existing) => {
            let mut curated = existing.curated;
            if curated.id.trim().is_empty() {
                curated.id = photo_id(filename);
            }
            if curated.title.trim().is_empty() {
                curated.title = photo_title(filename);
            }
            (curated, existing.extra)
        }
        None => (derive_curated(filename), Map::new()),
    };

    PhotoRecord {
        curated,
        filename: filename.to_string(),
        derived,
        extra,
    }
}

/// Newest first by effective date; equal dates ordered by filename.
pub fn sort_newest_first(records: &mut [PhotoRecord]) {
    records.sort_by(compare_newest_first);
}

fn compare_newest_first(a: &PhotoRecord, b: &PhotoRecord) -> Ordering {
    b.effective_date()
        .cmp(&a.effective_date())
        .then_with(|| a.filename.cmp(&b.filename))
}

/// Ids shared by more than one record, with the filenames that collide.
pub fn duplicate_ids(records: &[PhotoRecord]) -> Vec<(String, Vec<String>)> {
    let mut by_id: HashMap<&str, Vec<&str>> = HashMap::new();
    for record in records {
        by_id
            .entry(record.id())
            .or_default()
            .push(record.filename.as_str());
    }

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for record in records {
        let id = record.id();
        if !seen.insert(id) {
            continue;
        }
        if let Some(files) = by_id.get(id).filter(|files| files.len() > 1) {
            out.push((
                id.to_string(),
                files.iter().map(|f| f.to_string()).collect(),
            ));
        }
    }
    out
}
