//! Filename and folder pattern parsing
//!
//! Fallback for files without usable tags. Reads track/disc numbers and a
//! title from the file stem, and album, year and sometimes artist from the
//! containing folder names. Folders at or above the scan root are never used.

use super::{MetadataError, MetadataSource, SourceReading};
use crate::models::TagFields;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};

/// "1-03 Title", "2.07 - Title"
static DISC_TRACK_STEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2})[-.](\d{1,3})[\s._-]+(.+)$").unwrap());

/// "03 - Title", "03. Artist - Title", "03_Title"
static TRACK_STEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,3})[\s._-]+(?:(.+?)\s+-\s+)?(.+)$").unwrap());

/// "Artist - Title"
static ARTIST_TITLE_STEM: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(.+?)\s+-\s+(.+)$").unwrap());

/// "CD1", "Disc 2", "disk_3"
static DISC_DIR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:cd|disc|disk)[\s._-]*(\d{1,2})$").unwrap());

/// "Artist - 1971 - Album"
static ARTIST_YEAR_ALBUM_DIR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.+?)\s+-\s+(\d{4})\s+-\s+(.+)$").unwrap());

/// "1971 - Album"
static YEAR_ALBUM_DIR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{4})\s*-\s*(.+)$").unwrap());

/// "Album (1971)", "Album [1971]"
static ALBUM_YEAR_DIR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.+?)\s*[\(\[](\d{4})[\)\]]$").unwrap());

/// "Artist - Album"
static ARTIST_ALBUM_DIR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(.+?)\s+-\s+(.+)$").unwrap());

/// Parses metadata out of paths below a scan root
pub struct FilenameSource {
    root: PathBuf,
}

impl FilenameSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Folder names strictly below the root, nearest first
    fn folders_below_root<'a>(&self, path: &'a Path) -> Vec<&'a str> {
        path.ancestors()
            .skip(1)
            .take_while(|dir| *dir != self.root && dir.starts_with(&self.root))
            .filter_map(|dir| dir.file_name().and_then(|n| n.to_str()))
            .collect()
    }
}

impl MetadataSource for FilenameSource {
    fn name(&self) -> &'static str {
        "filename"
    }

    fn read(&self, path: &Path) -> Result<SourceReading, MetadataError> {
        let mut tags = parse_stem(
            path.file_stem()
                .map(|s| s.to_string_lossy())
                .unwrap_or_default()
                .as_ref(),
        );

        let mut folders = self.folders_below_root(path).into_iter();
        if let Some(mut album_dir) = folders.next() {
            if let Some(caps) = DISC_DIR.captures(album_dir) {
                if tags.disc_number.is_none() {
                    tags.disc_number = caps[1].parse().ok().filter(|n| *n > 0);
                }
                match folders.next() {
                    Some(dir) => album_dir = dir,
                    None => return Ok(SourceReading { tags, properties: None }),
                }
            }
            tags.fill_missing(&parse_album_dir(album_dir));
        }

        Ok(SourceReading {
            tags,
            properties: None,
        })
    }
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn plausible_year(s: &str) -> Option<u32> {
    s.parse().ok().filter(|y| (1900..=2100).contains(y))
}

fn parse_stem(stem: &str) -> TagFields {
    let stem = stem.trim();
    let mut tags = TagFields::default();

    if let Some(caps) = DISC_TRACK_STEM.captures(stem) {
        tags.disc_number = caps[1].parse().ok().filter(|n| *n > 0);
        tags.track_number = caps[2].parse().ok().filter(|n| *n > 0);
        tags.title = non_empty(&caps[3]);
    } else if let Some(caps) = TRACK_STEM.captures(stem) {
        tags.track_number = caps[1].parse().ok().filter(|n| *n > 0);
        tags.artist = caps.get(2).and_then(|m| non_empty(m.as_str()));
        tags.title = non_empty(&caps[3]);
    } else if let Some(caps) = ARTIST_TITLE_STEM.captures(stem) {
        tags.artist = non_empty(&caps[1]);
        tags.title = non_empty(&caps[2]);
    } else {
        tags.title = non_empty(stem);
    }

    tags
}

fn parse_album_dir(name: &str) -> TagFields {
    let name = name.trim();
    let mut tags = TagFields::default();

    if let Some(caps) = ARTIST_YEAR_ALBUM_DIR.captures(name) {
        if let Some(year) = plausible_year(&caps[2]) {
            tags.artist = non_empty(&caps[1]);
            tags.year = Some(year);
            tags.album = non_empty(&caps[3]);
            return tags;
        }
    }
    if let Some(caps) = YEAR_ALBUM_DIR.captures(name) {
        if let Some(year) = plausible_year(&caps[1]) {
            tags.year = Some(year);
            tags.album = non_empty(&caps[2]);
            return tags;
        }
    }
    if let Some(caps) = ALBUM_YEAR_DIR.captures(name) {
        if let Some(year) = plausible_year(&caps[2]) {
            tags.album = non_empty(&caps[1]);
            tags.year = Some(year);
            return tags;
        }
    }
    if let Some(caps) = ARTIST_ALBUM_DIR.captures(name) {
        tags.artist = non_empty(&caps[1]);
        tags.album = non_empty(&caps[2]);
        return tags;
    }

    tags.album = non_empty(name);
    tags
}
