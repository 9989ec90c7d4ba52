//! Run summaries returned by scan and process invocations

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanSummary {
    pub session_id: String,
    pub root: PathBuf,
    pub catalog_path: PathBuf,
    /// Regular files encountered by the walk
    pub files_seen: u64,
    /// Files on the extension allow-list
    pub eligible: u64,
    pub valid: u64,
    pub invalid: u64,
    pub invalid_by_reason: BTreeMap<String, u64>,
    /// Files not on the allow-list
    pub skipped: u64,
    pub album_groups: u64,
    pub split_groups: u64,
    pub cancelled: bool,
    pub elapsed_ms: u64,
}

/// Final state of one album in a process run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlbumOutcome {
    /// Files relocated and sidecar written
    Staged,
    /// Dry run: destination computed, nothing touched
    Planned,
    Failed,
    /// At least one member failed validation
    SkippedInvalid,
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlbumResult {
    pub group_id: String,
    pub artist: String,
    pub album: String,
    pub year: Option<u32>,
    pub destination: Option<PathBuf>,
    pub outcome: AlbumOutcome,
    pub tracks: usize,
    pub bytes: u64,
    pub staging_record_id: Option<Uuid>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProcessSummary {
    pub session_id: String,
    pub dry_run: bool,
    pub albums_total: u64,
    pub albums_processed: u64,
    pub albums_failed: u64,
    pub albums_skipped_invalid: u64,
    pub albums_cancelled: u64,
    pub tracks_moved: u64,
    pub total_bytes: u64,
    pub elapsed_ms: u64,
    pub results: Vec<AlbumResult>,
}

impl ProcessSummary {
    /// Fold one album result into the totals
    pub fn record(&mut self, result: AlbumResult) {
        self.albums_total += 1;
        match result.outcome {
            AlbumOutcome::Staged | AlbumOutcome::Planned => {
                self.albums_processed += 1;
                self.tracks_moved += result.tracks as u64;
                self.total_bytes += result.bytes;
            }
            AlbumOutcome::Failed => self.albums_failed += 1,
            AlbumOutcome::SkippedInvalid => self.albums_skipped_invalid += 1,
            AlbumOutcome::Cancelled => self.albums_cancelled += 1,
        }
        self.results.push(result);
    }
}

/// Result of a successful promotion
#[derive(Debug, Clone, Serialize)]
pub struct PromotionReport {
    pub record_id: Uuid,
    pub artist_id: i64,
    pub album_id: i64,
    pub production_path: PathBuf,
    pub tracks: usize,
    pub bytes: u64,
}
