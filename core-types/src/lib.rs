use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

pub mod isobmff;
pub mod timestamp;

/// Controlled vocabulary for gallery filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Best,
    Street,
    Concept,
    Monochrome,
    Experiments,
    Architecture,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Best,
        Category::Street,
        Category::Concept,
        Category::Monochrome,
        Category::Experiments,
        Category::Architecture,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Best => "best",
            Category::Street => "street",
            Category::Concept => "concept",
            Category::Monochrome => "monochrome",
            Category::Experiments => "experiments",
            Category::Architecture => "architecture",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Collection a photo was released with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Season {
    #[serde(rename = "SS 25")]
    SpringSummer25,
    #[serde(rename = "FW 24")]
    FallWinter24,
}

impl Season {
    pub fn as_str(&self) -> &'static str {
        match self {
            Season::SpringSummer25 => "SS 25",
            Season::FallWinter24 => "FW 24",
        }
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exposure settings read from embedded metadata, already formatted for display.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aperture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shutter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iso: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focal_length: Option<String>,
}

impl CaptureSettings {
    pub fn is_empty(&self) -> bool {
        self.aperture.is_none()
            && self.shutter.is_none()
            && self.iso.is_none()
            && self.focal_length.is_none()
    }

    /// `None` when no field could be derived, so the sub-record is omitted entirely.
    pub fn non_empty(self) -> Option<Self> {
        if self.is_empty() {
            None
        } else {
            Some(self)
        }
    }
}

/// Fields owned by the human editor. Automated runs never overwrite them once set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CuratedFields {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub season: Option<Season>,
}

/// Fields recomputed from the file on disk every time it is processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedFields {
    pub url: String,
    pub width: u32,
    pub height: u32,
    #[serde(with = "timestamp::millis")]
    pub date_created: DateTime<Utc>,
    #[serde(
        default,
        with = "timestamp::millis_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub date_taken: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lens: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<CaptureSettings>,
    pub file_size: String,
    pub format: String,
}

/// One catalog entry, keyed by `filename` across runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoRecord {
    #[serde(flatten)]
    pub curated: CuratedFields,
    pub filename: String,
    #[serde(flatten)]
    pub derived: DerivedFields,
    /// Keys added by hand that the pipeline does not know about; carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PhotoRecord {
    pub fn id(&self) -> &str {
        &self.curated.id
    }

    /// Capture time when known, otherwise the file modification time.
    pub fn effective_date(&self) -> DateTime<Utc> {
        self.derived
            .date_taken
            .unwrap_or(self.derived.date_created)
    }
}

/// The document consumed by the gallery site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoCatalog {
    #[serde(default)]
    pub photos: Vec<PhotoRecord>,
    #[serde(with = "timestamp::millis")]
    pub last_updated: DateTime<Utc>,
}

impl PhotoCatalog {
    pub fn new(photos: Vec<PhotoRecord>, last_updated: DateTime<Utc>) -> Self {
        Self {
            photos,
            last_updated: timestamp::truncate_to_millis(last_updated),
        }
    }

    pub fn empty(last_updated: DateTime<Utc>) -> Self {
        Self::new(Vec::new(), last_updated)
    }
}
