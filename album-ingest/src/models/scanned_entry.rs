//! Per-file scan results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Best-effort descriptive tags
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TagFields {
    pub artist: Option<String>,
    pub album_artist: Option<String>,
    pub album: Option<String>,
    pub title: Option<String>,
    pub track_number: Option<u32>,
    pub track_total: Option<u32>,
    pub disc_number: Option<u32>,
    pub disc_total: Option<u32>,
    pub year: Option<u32>,
    pub genre: Option<String>,
}

impl TagFields {
    /// Fill fields that are still empty from `other`, never overwriting
    pub fn fill_missing(&mut self, other: &TagFields) {
        fn fill<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
            if slot.is_none() {
                slot.clone_from(value);
            }
        }

        fill(&mut self.artist, &other.artist);
        fill(&mut self.album_artist, &other.album_artist);
        fill(&mut self.album, &other.album);
        fill(&mut self.title, &other.title);
        fill(&mut self.track_number, &other.track_number);
        fill(&mut self.track_total, &other.track_total);
        fill(&mut self.disc_number, &other.disc_number);
        fill(&mut self.disc_total, &other.disc_total);
        fill(&mut self.year, &other.year);
        fill(&mut self.genre, &other.genre);
    }

    pub fn is_empty(&self) -> bool {
        *self == TagFields::default()
    }
}

/// Technical stream properties
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioProperties {
    pub duration_secs: Option<f64>,
    pub bitrate_kbps: Option<u32>,
    pub sample_rate: Option<u32>,
}

/// Why an eligible file was recorded invalid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationFailure {
    /// Zero-byte file
    EmptyFile,
    /// File could not be read
    IoError,
    /// Leading bytes match no known audio container
    UnsupportedType,
    /// Container could not be parsed
    UnreadableContainer,
    DurationOutOfBounds,
    BitrateOutOfBounds,
}

impl ValidationFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationFailure::EmptyFile => "empty_file",
            ValidationFailure::IoError => "io_error",
            ValidationFailure::UnsupportedType => "unsupported_type",
            ValidationFailure::UnreadableContainer => "unreadable_container",
            ValidationFailure::DurationOutOfBounds => "duration_out_of_bounds",
            ValidationFailure::BitrateOutOfBounds => "bitrate_out_of_bounds",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "empty_file" => Some(ValidationFailure::EmptyFile),
            "io_error" => Some(ValidationFailure::IoError),
            "unsupported_type" => Some(ValidationFailure::UnsupportedType),
            "unreadable_container" => Some(ValidationFailure::UnreadableContainer),
            "duration_out_of_bounds" => Some(ValidationFailure::DurationOutOfBounds),
            "bitrate_out_of_bounds" => Some(ValidationFailure::BitrateOutOfBounds),
            _ => None,
        }
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the ephemeral scan catalog
///
/// Created by the scanner; only the grouping fields (`grouping_hash`,
/// `group_id`, `group_year`) change afterward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScannedEntry {
    /// Catalog row id, 0 until inserted
    pub id: i64,
    pub source_path: PathBuf,
    /// Lower-cased extension
    pub extension: String,
    pub size_bytes: u64,
    /// SHA-256 hex of the file content, absent when the file could not be read
    pub checksum: Option<String>,
    pub modified_at: Option<DateTime<Utc>>,
    pub tags: TagFields,
    pub properties: AudioProperties,
    /// Metadata sources that contributed at least one field, in order
    pub metadata_sources: Vec<String>,
    pub is_valid: bool,
    pub failure: Option<ValidationFailure>,
    pub failure_detail: Option<String>,
    pub grouping_hash: Option<String>,
    pub group_id: Option<String>,
    /// Year resolved for the whole group
    pub group_year: Option<u32>,
}

impl ScannedEntry {
    /// Fresh, ungrouped entry for a file
    pub fn new(source_path: PathBuf) -> Self {
        let extension = source_path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        Self {
            id: 0,
            source_path,
            extension,
            size_bytes: 0,
            checksum: None,
            modified_at: None,
            tags: TagFields::default(),
            properties: AudioProperties::default(),
            metadata_sources: Vec::new(),
            is_valid: true,
            failure: None,
            failure_detail: None,
            grouping_hash: None,
            group_id: None,
            group_year: None,
        }
    }

    /// Mark invalid with a reason; the first recorded reason wins
    pub fn mark_invalid(&mut self, failure: ValidationFailure, detail: impl Into<String>) {
        if self.failure.is_none() {
            self.is_valid = false;
            self.failure = Some(failure);
            self.failure_detail = Some(detail.into());
        }
    }

    pub fn file_name(&self) -> String {
        self.source_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn parent_dir(&self) -> &Path {
        self.source_path.parent().unwrap_or_else(|| Path::new(""))
    }
}
