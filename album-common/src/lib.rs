//! # Album Ingest Common Library
//!
//! Shared code for the album ingest pipeline:
//! - Error type
//! - Configuration loading
//! - Text normalization used for grouping and artist matching
//! - SQLite pool helpers

pub mod config;
pub mod db;
pub mod error;
pub mod normalize;

pub use config::{
    GroupingSettings, LoggingSettings, PipelineConfig, ProcessSettings, ScanSettings, StoreSettings,
    ValidationSettings,
};
pub use error::{Error, Result};
pub use normalize::normalize_key;
