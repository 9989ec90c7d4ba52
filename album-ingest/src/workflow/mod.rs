//! End-to-end runs wired from configuration
//!
//! - [`run_scan`]: walk a source root into a new catalog and group it
//! - [`run_process`]: stage the album groups of an existing catalog
//! - [`open_review`]: review and promotion surface over the durable store
//!
//! Environmental problems (missing root, missing catalog, unreachable store)
//! fail here before any work starts.

use crate::db::{open_store, ScanCatalog};
use crate::models::{ProcessSummary, ScanSummary};
use crate::services::{ContentScanner, GroupingEngine, ProcessOptions, Processor, StagingService};
use album_common::{Error, PipelineConfig, Result};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Scan `root` into a new catalog under `catalog_dir` and group it
///
/// A cancelled scan is recorded as such and left ungrouped, so it cannot be
/// processed.
pub async fn run_scan(
    config: &PipelineConfig,
    root: &Path,
    catalog_dir: &Path,
    cancel: &CancellationToken,
) -> Result<(ScanCatalog, ScanSummary)> {
    let started = Instant::now();

    let meta = tokio::fs::metadata(root)
        .await
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound(format!("source root {}", root.display())),
            _ => Error::Io(e),
        })?;
    if !meta.is_dir() {
        return Err(Error::InvalidInput(format!("{} is not a directory", root.display())));
    }

    let catalog = ScanCatalog::create(catalog_dir, root).await?;
    info!(
        session = %catalog.session_id(),
        root = %root.display(),
        catalog = %catalog.path().display(),
        "Scan session started"
    );

    let scanner = ContentScanner::new(config.scan.workers, config.scan.batch_size, config.validation.clone());
    let stats = scanner.scan(root, &catalog, cancel).await?;

    let mut summary = ScanSummary {
        session_id: catalog.session_id().to_string(),
        root: root.to_path_buf(),
        catalog_path: catalog.path().to_path_buf(),
        files_seen: stats.files_seen,
        eligible: stats.eligible,
        valid: stats.valid,
        invalid: stats.invalid,
        invalid_by_reason: stats.invalid_by_reason,
        skipped: stats.skipped,
        cancelled: stats.cancelled,
        ..Default::default()
    };

    if stats.cancelled {
        warn!(session = %summary.session_id, "Scan cancelled, catalog left ungrouped");
    } else {
        let outcome = GroupingEngine::new(config.grouping.clone())
            .run(&catalog, config.scan.batch_size)
            .await?;
        summary.album_groups = outcome.groups as u64;
        summary.split_groups = outcome.splits as u64;
    }

    summary.elapsed_ms = started.elapsed().as_millis() as u64;
    catalog.finish_session(&summary).await?;

    info!(
        session = %summary.session_id,
        files = summary.files_seen,
        valid = summary.valid,
        invalid = summary.invalid,
        albums = summary.album_groups,
        elapsed_ms = summary.elapsed_ms,
        "Scan finished"
    );

    Ok((catalog, summary))
}

/// Stage the album groups of the catalog at `catalog_path`
pub async fn run_process(
    config: &PipelineConfig,
    catalog_path: &Path,
    dry_run: bool,
    cancel: &CancellationToken,
) -> Result<ProcessSummary> {
    let staging_root = require_staging_root(config)?;
    let catalog = ScanCatalog::open(catalog_path).await?;

    let store = match &config.store.database {
        // a dry run must not create the store
        Some(path) if dry_run && !path.exists() => {
            debug!(database = %path.display(), "Store does not exist, dry run continues without it");
            None
        }
        Some(path) => Some(open_store(path, &config.store).await?),
        None => None,
    };

    let options = ProcessOptions {
        staging_root,
        workers: config.process.workers,
        rate_limit: config.process.rate_limit,
        dry_run,
        max_lock_wait_ms: config.store.max_lock_wait_ms,
    };

    let result = Processor::new(options, store.clone()).run(&catalog, cancel).await;

    catalog.close().await;
    if let Some(pool) = store {
        pool.close().await;
    }

    result
}

/// Review surface; promotion is available when a production root is set
pub async fn open_review(config: &PipelineConfig) -> Result<(StagingService, SqlitePool)> {
    let database = config
        .store
        .database
        .as_ref()
        .ok_or_else(|| Error::Config("store.database is required for review".to_string()))?;
    let staging_root = require_staging_root(config)?;

    let pool = open_store(database, &config.store).await?;
    let mut service = StagingService::new(pool.clone(), staging_root, config.store.max_lock_wait_ms);
    if let Some(production_root) = &config.process.production_root {
        service = service.with_production_root(production_root.clone());
    }

    Ok((service, pool))
}

fn require_staging_root(config: &PipelineConfig) -> Result<PathBuf> {
    config
        .process
        .staging_root
        .clone()
        .ok_or_else(|| Error::Config("process.staging_root is not configured".to_string()))
}
