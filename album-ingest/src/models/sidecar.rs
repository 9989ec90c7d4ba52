//! `album.json` metadata sidecar
//!
//! Written by the processor at the album root and read back by promotion,
//! which treats it as the canonical description of the staged album.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const SIDECAR_FILE_NAME: &str = "album.json";
pub const SIDECAR_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlbumSidecar {
    pub schema_version: u32,
    pub artist: String,
    pub album: String,
    pub year: Option<u32>,
    pub directory_code: String,
    pub group_id: String,
    pub scan_session: String,
    pub tracks: Vec<SidecarTrack>,
    /// SHA-256 over the ordered track checksums
    pub aggregate_checksum: String,
    pub validation: SidecarValidation,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SidecarTrack {
    pub title: Option<String>,
    pub track_number: Option<u32>,
    pub track_total: Option<u32>,
    pub disc_number: Option<u32>,
    pub disc_total: Option<u32>,
    pub duration_secs: Option<f64>,
    pub checksum: String,
    pub bitrate_kbps: Option<u32>,
    pub sample_rate: Option<u32>,
    pub size_bytes: u64,
    /// File name inside the album folder
    pub file_name: String,
    pub source_path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SidecarValidation {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl AlbumSidecar {
    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
    }

    pub fn total_bytes(&self) -> u64 {
        self.tracks.iter().map(|t| t.size_bytes).sum()
    }
}
