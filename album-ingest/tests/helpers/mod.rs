//! Shared test helpers
//!
//! Each integration test binary compiles this module separately, so not
//! every helper is used everywhere.

#![allow(dead_code)]

pub mod audio_generator;
pub mod db_utils;
pub mod library;

pub use audio_generator::{generate_test_wav, write_tagged_track, AudioConfig, TrackTags};
pub use db_utils::{has_column, snapshot_tree, TestEnv};
pub use library::{build_library, Library, LZ_ALBUM, LZ_ARTIST, PF_ALBUM};
