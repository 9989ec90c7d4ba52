//! album-ingest - audio album ingest pipeline
//!
//! `scan` builds a catalog from a source tree, `process` stages its albums,
//! `review` drives approval and promotion into production.

use album_common::config::default_config_path;
use album_common::PipelineConfig;
use album_ingest::cli::{Cli, Command, ReviewAction};
use album_ingest::models::{ProcessSummary, ScanSummary};
use album_ingest::workflow::{open_review, run_process, run_scan};
use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Command::InitConfig { path, force } = &cli.command {
        return init_config(path.clone(), *force);
    }

    let mut config = PipelineConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    cli.apply_overrides(&mut config);
    config.validate().context("Invalid configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .with_writer(std::io::stderr)
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        git = env!("ALBUM_INGEST_GIT_HASH"),
        built = env!("ALBUM_INGEST_BUILD_DATE"),
        "album-ingest starting"
    );

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight work");
            signal_token.cancel();
        }
    });

    match &cli.command {
        Command::Scan { root, .. } => {
            let catalog_dir = config.scan.catalog_dir.clone().unwrap_or_else(|| PathBuf::from("."));
            let (catalog, summary) = run_scan(&config, root, &catalog_dir, &cancel).await?;
            catalog.close().await;
            emit(cli.json, &summary, print_scan_summary)?;
        }
        Command::Process { catalog, dry_run, .. } => {
            let summary = run_process(&config, catalog, *dry_run, &cancel).await?;
            emit(cli.json, &summary, print_process_summary)?;
        }
        Command::Review(args) => {
            let (service, pool) = open_review(&config).await?;
            let result = review(&service, &args.action, cli.json).await;
            pool.close().await;
            result?;
        }
        Command::InitConfig { .. } => {}
    }

    Ok(())
}

async fn review(
    service: &album_ingest::services::StagingService,
    action: &ReviewAction,
    json: bool,
) -> Result<()> {
    match action {
        ReviewAction::List { .. } => {
            let filter = action.filter().unwrap_or_default();
            let records = service.list(&filter).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                for r in &records {
                    println!(
                        "{}  {:<14}  {} - {} ({})  {} tracks",
                        r.id,
                        r.status,
                        r.artist,
                        r.album,
                        r.year.map(|y| y.to_string()).unwrap_or_else(|| "-".to_string()),
                        r.track_count
                    );
                }
                println!("{} record(s)", records.len());
            }
        }
        ReviewAction::Show { id } => {
            let staged = service.get(*id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&staged)?);
            } else {
                let r = &staged.record;
                println!("Record:    {}", r.id);
                println!("Status:    {}", r.status);
                println!("Album:     {} - {}", r.artist, r.album);
                println!("Code:      {}", r.directory_code);
                println!("Staged at: {}", r.staging_path.display());
                if let Some(notes) = &r.review_notes {
                    println!("Notes:     {}", notes);
                }
                match (&staged.sidecar, &staged.sidecar_error) {
                    (Some(sidecar), _) => {
                        for t in &sidecar.tracks {
                            println!(
                                "  {:>2}. {}",
                                t.track_number.unwrap_or(0),
                                t.title.as_deref().unwrap_or(&t.file_name)
                            );
                        }
                        for w in &sidecar.validation.warnings {
                            println!("  warning: {}", w);
                        }
                    }
                    (None, Some(err)) => println!("Sidecar unreadable: {}", err),
                    (None, None) => {}
                }
            }
        }
        ReviewAction::Stats => {
            let stats = service.stats().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("Total:          {}", stats.total);
                println!("Pending review: {}", stats.pending_review);
                println!("Approved:       {}", stats.approved);
                println!("Rejected:       {}", stats.rejected);
                println!("Claimed:        {}", stats.claimed);
                println!("Tracks:         {}", stats.total_tracks);
                println!("Bytes:          {}", stats.total_bytes);
            }
        }
        ReviewAction::Approve { id, reviewer, notes } => {
            let record = service.approve(*id, reviewer, notes.as_deref()).await?;
            emit(json, &record, |r| println!("{} approved", r.id))?;
        }
        ReviewAction::Reject { id, reviewer, reason } => {
            let record = service.reject(*id, reviewer, reason).await?;
            emit(json, &record, |r| println!("{} rejected", r.id))?;
        }
        ReviewAction::Requeue { id, reviewer } => {
            let record = service.requeue(*id, reviewer).await?;
            emit(json, &record, |r| println!("{} back in review", r.id))?;
        }
        ReviewAction::Promote { id } => {
            let report = service.promote(*id).await?;
            emit(json, &report, |r| {
                println!(
                    "{} promoted to {} ({} tracks, {} bytes)",
                    r.record_id,
                    r.production_path.display(),
                    r.tracks,
                    r.bytes
                )
            })?;
        }
        ReviewAction::Delete { id, delete_files } => {
            service.delete(*id, *delete_files).await?;
            if !json {
                println!("{} deleted", id);
            }
        }
        ReviewAction::ReleaseClaims { max_age_secs } => {
            let released = service.release_stale_claims(Duration::from_secs(*max_age_secs)).await?;
            if json {
                println!("{}", serde_json::json!({ "released": released }));
            } else {
                println!("{} claim(s) released", released);
            }
        }
    }
    Ok(())
}

fn init_config(path: Option<PathBuf>, force: bool) -> Result<()> {
    let path = match path {
        Some(path) => path,
        None => default_config_path().context("No config directory on this platform, pass --path")?,
    };
    if path.exists() && !force {
        bail!("{} already exists, use --force to overwrite", path.display());
    }
    PipelineConfig::default().write_toml(&path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

fn emit<T: Serialize>(json: bool, value: &T, text: impl Fn(&T)) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        text(value);
    }
    Ok(())
}

fn print_scan_summary(s: &ScanSummary) {
    println!("Scan session {}", s.session_id);
    println!("  Catalog:      {}", s.catalog_path.display());
    println!("  Files seen:   {}", s.files_seen);
    println!("  Audio files:  {} ({} skipped)", s.eligible, s.skipped);
    println!("  Valid:        {}", s.valid);
    println!("  Invalid:      {}", s.invalid);
    for (reason, count) in &s.invalid_by_reason {
        println!("    {:<20} {}", reason, count);
    }
    println!("  Album groups: {} ({} split by year)", s.album_groups, s.split_groups);
    if s.cancelled {
        println!("  Cancelled before completion");
    }
    println!("  Elapsed:      {} ms", s.elapsed_ms);
}

fn print_process_summary(s: &ProcessSummary) {
    for r in &s.results {
        let destination = r
            .destination
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".to_string());
        match &r.error {
            Some(err) => println!("  {:?}  {} - {}: {}", r.outcome, r.artist, r.album, err),
            None => println!("  {:?}  {} - {} -> {}", r.outcome, r.artist, r.album, destination),
        }
    }
    println!(
        "{}Albums: {} total, {} processed, {} failed, {} skipped invalid, {} cancelled",
        if s.dry_run { "[dry run] " } else { "" },
        s.albums_total,
        s.albums_processed,
        s.albums_failed,
        s.albums_skipped_invalid,
        s.albums_cancelled
    );
    println!("Tracks moved: {}, bytes: {}, elapsed: {} ms", s.tracks_moved, s.total_bytes, s.elapsed_ms);
}
