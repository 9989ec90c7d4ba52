//! Staging records and review state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// Review state of a staged album
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    PendingReview,
    Approved,
    Rejected,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::PendingReview => "pending_review",
            ReviewStatus::Approved => "approved",
            ReviewStatus::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending_review" | "pending" => Some(ReviewStatus::PendingReview),
            "approved" => Some(ReviewStatus::Approved),
            "rejected" => Some(ReviewStatus::Rejected),
            _ => None,
        }
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One processed album awaiting review or promotion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagingRecord {
    pub id: Uuid,
    pub scan_session_id: String,
    pub staging_path: PathBuf,
    pub sidecar_path: PathBuf,
    pub artist: String,
    pub album: String,
    pub year: Option<u32>,
    pub directory_code: String,
    pub group_id: String,
    pub track_count: u32,
    pub total_bytes: u64,
    /// SHA-256 of the sidecar bytes
    pub checksum: String,
    pub processed_at: DateTime<Utc>,
    pub status: ReviewStatus,
    pub reviewer: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub review_notes: Option<String>,
    /// Held while a promotion is in flight
    pub promotion_claim: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
}

impl StagingRecord {
    pub fn is_claimed(&self) -> bool {
        self.promotion_claim.is_some()
    }
}

/// Listing filter for staged albums
#[derive(Debug, Clone, Default)]
pub struct StagingFilter {
    pub status: Option<ReviewStatus>,
    pub scan_session_id: Option<String>,
    pub limit: Option<u32>,
    pub offset: u32,
}

/// Aggregate counts over the staging store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StagingStats {
    pub total: u64,
    pub pending_review: u64,
    pub approved: u64,
    pub rejected: u64,
    /// Records with a promotion in flight
    pub claimed: u64,
    pub total_tracks: u64,
    pub total_bytes: u64,
}
