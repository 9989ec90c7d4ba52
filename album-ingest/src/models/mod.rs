//! Data models for the ingest pipeline

pub mod album_group;
pub mod scanned_entry;
pub mod sidecar;
pub mod staging;
pub mod summary;

pub use album_group::{AlbumGroup, GroupAssignment};
pub use scanned_entry::{AudioProperties, ScannedEntry, TagFields, ValidationFailure};
pub use sidecar::{AlbumSidecar, SidecarTrack, SidecarValidation, SIDECAR_FILE_NAME, SIDECAR_SCHEMA_VERSION};
pub use staging::{ReviewStatus, StagingFilter, StagingRecord, StagingStats};
pub use summary::{AlbumOutcome, AlbumResult, ProcessSummary, PromotionReport, ScanSummary};
