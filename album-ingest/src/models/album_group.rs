//! Album units derived from grouped catalog rows

use super::ScannedEntry;
use serde::Serialize;

/// Entries sharing one group identifier, with resolved display fields
///
/// Not persisted; rebuilt from the catalog whenever needed.
#[derive(Debug, Clone, Serialize)]
pub struct AlbumGroup {
    pub group_id: String,
    pub grouping_hash: String,
    pub artist: String,
    pub album: String,
    pub year: Option<u32>,
    pub entries: Vec<ScannedEntry>,
}

impl AlbumGroup {
    /// True only when every member passed validation
    pub fn is_valid(&self) -> bool {
        !self.entries.is_empty() && self.entries.iter().all(|e| e.is_valid)
    }

    pub fn track_count(&self) -> usize {
        self.entries.len()
    }

    pub fn total_bytes(&self) -> u64 {
        self.entries.iter().map(|e| e.size_bytes).sum()
    }

    pub fn invalid_count(&self) -> usize {
        self.entries.iter().filter(|e| !e.is_valid).count()
    }
}

/// Grouping columns computed for one catalog row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupAssignment {
    pub entry_id: i64,
    pub grouping_hash: String,
    pub group_id: String,
    pub group_year: Option<u32>,
}
