//! album-ingest library
//!
//! Scan a source tree into an ephemeral catalog, group it into albums, stage
//! each album with a metadata sidecar, and promote reviewed albums into the
//! production catalog.

pub mod cli;
pub mod db;
pub mod models;
pub mod services;
pub mod utils;
pub mod workflow;

pub use album_common::{Error, PipelineConfig, Result};
pub use workflow::{open_review, run_process, run_scan};
