//! Embedded tag reading via lofty

use super::{MetadataError, MetadataSource, SourceReading};
use crate::models::{AudioProperties, TagFields};
use album_common::normalize::clean_tag;
use lofty::file::TaggedFileExt;
use lofty::prelude::*;
use lofty::probe::Probe;
use lofty::tag::ItemKey;
use std::path::Path;

/// Reads ID3/Vorbis/MP4/APE tags and stream properties
pub struct TagSource;

impl TagSource {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TagSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataSource for TagSource {
    fn name(&self) -> &'static str {
        "tags"
    }

    fn read(&self, path: &Path) -> Result<SourceReading, MetadataError> {
        // surface missing or unreadable files as I/O errors before probing
        std::fs::File::open(path)?;

        let tagged_file = Probe::open(path)
            .map_err(|e| MetadataError::Unreadable(e.to_string()))?
            .guess_file_type()
            .map_err(|e| MetadataError::Unreadable(e.to_string()))?
            .read()
            .map_err(|e| MetadataError::Unreadable(e.to_string()))?;

        let props = tagged_file.properties();
        let duration = props.duration().as_secs_f64();
        // lofty already reports kbps
        let properties = AudioProperties {
            duration_secs: Some(duration),
            bitrate_kbps: props.audio_bitrate().or_else(|| props.overall_bitrate()),
            sample_rate: props.sample_rate(),
        };

        let tags = match tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) {
            Some(tag) => TagFields {
                artist: clean_tag(tag.artist().map(|s| s.to_string())),
                album_artist: clean_tag(tag.get_string(&ItemKey::AlbumArtist).map(str::to_string)),
                album: clean_tag(tag.album().map(|s| s.to_string())),
                title: clean_tag(tag.title().map(|s| s.to_string())),
                track_number: tag.track().filter(|n| *n > 0),
                track_total: tag.track_total().filter(|n| *n > 0),
                disc_number: tag.disk().filter(|n| *n > 0),
                disc_total: tag.disk_total().filter(|n| *n > 0),
                year: tag.year().filter(|y| *y > 0),
                genre: clean_tag(tag.genre().map(|s| s.to_string())),
            },
            None => TagFields::default(),
        };

        tracing::trace!(
            file = %path.display(),
            artist = ?tags.artist,
            album = ?tags.album,
            duration_s = duration,
            "Read embedded tags"
        );

        Ok(SourceReading {
            tags,
            properties: Some(properties),
        })
    }
}
