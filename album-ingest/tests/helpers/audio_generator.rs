//! Audio fixture generator
//!
//! Writes short real WAV files with hound, optionally tagged with lofty, so
//! the scanner sees valid containers with measurable duration and bitrate.

use lofty::config::WriteOptions;
use lofty::file::{AudioFile, TaggedFileExt};
use lofty::id3::v2::Id3v2Tag;
use lofty::tag::Accessor;
use std::path::{Path, PathBuf};

/// Configuration for generated audio
#[derive(Debug, Clone)]
pub struct AudioConfig {
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    /// Tone frequency; varying it gives files distinct content
    pub frequency: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        // 8 kHz mono 16-bit is 128 kbps, inside the default bitrate bounds
        Self {
            duration_seconds: 2.0,
            sample_rate: 8000,
            channels: 1,
            frequency: 440.0,
        }
    }
}

/// Embedded tags for a generated track
#[derive(Debug, Clone, Default)]
pub struct TrackTags {
    pub artist: Option<String>,
    pub album: Option<String>,
    pub title: Option<String>,
    pub year: Option<u32>,
    pub track: Option<u32>,
}

impl TrackTags {
    pub fn new(artist: &str, album: &str, title: &str) -> Self {
        Self {
            artist: Some(artist.to_string()),
            album: Some(album.to_string()),
            title: Some(title.to_string()),
            ..Default::default()
        }
    }

    pub fn year(mut self, year: u32) -> Self {
        self.year = Some(year);
        self
    }

    pub fn track(mut self, track: u32) -> Self {
        self.track = Some(track);
        self
    }
}

/// Generate a sine-tone WAV file, creating parent directories
pub fn generate_test_wav(path: &Path, config: &AudioConfig) -> anyhow::Result<PathBuf> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let spec = hound::WavSpec {
        channels: config.channels,
        sample_rate: config.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)?;
    let total_samples = (config.duration_seconds * config.sample_rate as f64) as usize;

    for i in 0..total_samples {
        let t = i as f32 / config.sample_rate as f32;
        let sample = (0.3 * (2.0 * std::f32::consts::PI * config.frequency * t).sin() * i16::MAX as f32) as i16;
        for _ in 0..config.channels {
            writer.write_sample(sample)?;
        }
    }

    writer.finalize()?;
    Ok(path.to_path_buf())
}

/// Generate a WAV file and embed ID3v2 tags in it
pub fn write_tagged_track(path: &Path, tags: &TrackTags, frequency: f32) -> anyhow::Result<PathBuf> {
    let config = AudioConfig {
        frequency,
        ..AudioConfig::default()
    };
    generate_test_wav(path, &config)?;

    let mut tagged_file = lofty::probe::Probe::open(path)?.read()?;

    let mut tag = Id3v2Tag::default();
    if let Some(artist) = &tags.artist {
        tag.set_artist(artist.clone());
    }
    if let Some(album) = &tags.album {
        tag.set_album(album.clone());
    }
    if let Some(title) = &tags.title {
        tag.set_title(title.clone());
    }
    if let Some(year) = tags.year {
        tag.set_year(year);
    }
    if let Some(track) = tags.track {
        tag.set_track(track);
    }

    tagged_file.insert_tag(tag.into());
    tagged_file.save_to_path(path, WriteOptions::default())?;

    Ok(path.to_path_buf())
}
