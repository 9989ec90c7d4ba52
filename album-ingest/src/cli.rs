//! Command-line interface
//!
//! Flags override environment variables, which override the config file.

use crate::models::{ReviewStatus, StagingFilter};
use album_common::PipelineConfig;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "album-ingest")]
#[command(about = "Scan, stage and promote audio albums")]
#[command(version)]
pub struct Cli {
    /// Config file (default: <config dir>/album-ingest/config.toml)
    #[arg(long, global = true, env = "ALBUM_INGEST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Print summaries as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Log level when RUST_LOG is unset
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Scan a source tree into a new catalog and group it into albums
    Scan {
        /// Source root to scan
        root: PathBuf,

        /// Directory for the catalog artifact (default: current directory)
        #[arg(long)]
        catalog_dir: Option<PathBuf>,

        #[arg(long)]
        workers: Option<usize>,
    },

    /// Stage the album groups of a catalog
    Process {
        /// Catalog artifact produced by `scan`
        catalog: PathBuf,

        #[arg(long)]
        staging_root: Option<PathBuf>,

        /// Durable store for directory codes and staging records
        #[arg(long)]
        database: Option<PathBuf>,

        #[arg(long)]
        workers: Option<usize>,

        /// File moves per second, 0 = unlimited
        #[arg(long)]
        rate_limit: Option<u32>,

        /// Plan only, move nothing
        #[arg(long)]
        dry_run: bool,
    },

    /// Review and promote staged albums
    Review(ReviewArgs),

    /// Write the default configuration as TOML
    InitConfig {
        /// Target file (default: <config dir>/album-ingest/config.toml)
        #[arg(long)]
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args, Debug)]
pub struct ReviewArgs {
    #[arg(long)]
    pub database: Option<PathBuf>,

    #[arg(long)]
    pub staging_root: Option<PathBuf>,

    #[arg(long)]
    pub production_root: Option<PathBuf>,

    #[command(subcommand)]
    pub action: ReviewAction,
}

#[derive(Subcommand, Debug)]
pub enum ReviewAction {
    /// List staged albums
    List {
        /// pending_review, approved or rejected
        #[arg(long, value_parser = parse_status)]
        status: Option<ReviewStatus>,

        /// Only albums from this scan session
        #[arg(long)]
        session: Option<String>,

        #[arg(long)]
        limit: Option<u32>,

        #[arg(long, default_value_t = 0)]
        offset: u32,
    },

    /// Show one staged album with its sidecar
    Show { id: Uuid },

    /// Counts by review status
    Stats,

    Approve {
        id: Uuid,

        #[arg(long, env = "ALBUM_INGEST_REVIEWER")]
        reviewer: String,

        #[arg(long)]
        notes: Option<String>,
    },

    Reject {
        id: Uuid,

        #[arg(long, env = "ALBUM_INGEST_REVIEWER")]
        reviewer: String,

        #[arg(long)]
        reason: String,
    },

    /// Return a rejected album to the review queue
    Requeue {
        id: Uuid,

        #[arg(long, env = "ALBUM_INGEST_REVIEWER")]
        reviewer: String,
    },

    /// Move an approved album into the production catalog
    Promote { id: Uuid },

    /// Delete a rejected album's record
    Delete {
        id: Uuid,

        /// Also remove the staged files
        #[arg(long)]
        delete_files: bool,
    },

    /// Clear promotion claims left by a crashed process
    ReleaseClaims {
        #[arg(long, default_value_t = 3600)]
        max_age_secs: u64,
    },
}

impl Cli {
    /// Apply command-line overrides on top of the loaded configuration
    pub fn apply_overrides(&self, config: &mut PipelineConfig) {
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }

        match &self.command {
            Command::Scan { catalog_dir, workers, .. } => {
                if let Some(dir) = catalog_dir {
                    config.scan.catalog_dir = Some(dir.clone());
                }
                if let Some(workers) = workers {
                    config.scan.workers = *workers;
                }
            }
            Command::Process {
                staging_root,
                database,
                workers,
                rate_limit,
                ..
            } => {
                if let Some(root) = staging_root {
                    config.process.staging_root = Some(root.clone());
                }
                if let Some(database) = database {
                    config.store.database = Some(database.clone());
                }
                if let Some(workers) = workers {
                    config.process.workers = *workers;
                }
                if let Some(rate_limit) = rate_limit {
                    config.process.rate_limit = *rate_limit;
                }
            }
            Command::Review(args) => {
                if let Some(database) = &args.database {
                    config.store.database = Some(database.clone());
                }
                if let Some(root) = &args.staging_root {
                    config.process.staging_root = Some(root.clone());
                }
                if let Some(root) = &args.production_root {
                    config.process.production_root = Some(root.clone());
                }
            }
            Command::InitConfig { .. } => {}
        }
    }
}

impl ReviewAction {
    /// Listing filter for `review list`
    pub fn filter(&self) -> Option<StagingFilter> {
        match self {
            ReviewAction::List {
                status,
                session,
                limit,
                offset,
            } => Some(StagingFilter {
                status: *status,
                scan_session_id: session.clone(),
                limit: *limit,
                offset: *offset,
            }),
            _ => None,
        }
    }
}

fn parse_status(value: &str) -> Result<ReviewStatus, String> {
    ReviewStatus::parse(value)
        .ok_or_else(|| format!("unknown status '{}', expected pending_review, approved or rejected", value))
}
