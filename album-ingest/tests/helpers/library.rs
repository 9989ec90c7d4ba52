//! A small source library covering the common layouts
//!
//! ```text
//! source/
//!   Led Zeppelin/Led Zeppelin IV/   three tagged tracks, one without a year
//!   Pink Floyd - 1973 - Dark Side/  two untagged tracks named "NN - Title"
//!   Broken/                         one file with an .mp3 name but text content
//!   notes.txt                       not audio
//! ```

use super::audio_generator::{generate_test_wav, write_tagged_track, AudioConfig, TrackTags};
use std::path::{Path, PathBuf};

pub const LZ_ARTIST: &str = "Led Zeppelin";
pub const LZ_ALBUM: &str = "Led Zeppelin IV";
pub const PF_ALBUM: &str = "Dark Side";

pub struct Library {
    pub led_zeppelin: Vec<PathBuf>,
    pub pink_floyd: Vec<PathBuf>,
    pub broken: PathBuf,
}

pub fn build_library(source: &Path) -> Library {
    let lz_dir = source.join("Led Zeppelin").join("Led Zeppelin IV");
    let led_zeppelin = vec![
        write_tagged_track(
            &lz_dir.join("01 - Black Dog.wav"),
            &TrackTags::new(LZ_ARTIST, LZ_ALBUM, "Black Dog").year(1971).track(1),
            440.0,
        )
        .unwrap(),
        write_tagged_track(
            &lz_dir.join("02 - Rock and Roll.wav"),
            &TrackTags::new(LZ_ARTIST, LZ_ALBUM, "Rock and Roll").year(1971).track(2),
            494.0,
        )
        .unwrap(),
        write_tagged_track(
            &lz_dir.join("03 - The Battle of Evermore.wav"),
            &TrackTags::new(LZ_ARTIST, LZ_ALBUM, "The Battle of Evermore").track(3),
            523.0,
        )
        .unwrap(),
    ];

    let pf_dir = source.join("Pink Floyd - 1973 - Dark Side");
    let pink_floyd = vec![
        generate_test_wav(
            &pf_dir.join("01 - Speak.wav"),
            &AudioConfig {
                frequency: 330.0,
                ..AudioConfig::default()
            },
        )
        .unwrap(),
        generate_test_wav(
            &pf_dir.join("02 - Breathe.wav"),
            &AudioConfig {
                frequency: 349.0,
                ..AudioConfig::default()
            },
        )
        .unwrap(),
    ];

    let broken_dir = source.join("Broken");
    std::fs::create_dir_all(&broken_dir).unwrap();
    let broken = broken_dir.join("bad.mp3");
    std::fs::write(&broken, b"this is not an mp3 file at all").unwrap();

    std::fs::write(source.join("notes.txt"), b"liner notes").unwrap();

    Library {
        led_zeppelin,
        pink_floyd,
        broken,
    }
}
