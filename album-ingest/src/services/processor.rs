//! Album processor
//!
//! Stages every valid album group of a grouped catalog under
//! `{staging root}/{code}/{artist}/{year} - {album}/`, writes the
//! `album.json` sidecar and, with a durable store, records a staging entry.
//!
//! Albums run concurrently (one album per worker); files within an album move
//! in order, each after a token from the shared rate limiter. An album that
//! fails or is cancelled part-way has its moved files put back.

use super::code_allocator::DirectoryCodeAllocator;
use super::grouping::collect_groups;
use crate::db::{staging_records, ScanCatalog};
use crate::models::{
    AlbumGroup, AlbumOutcome, AlbumResult, AlbumSidecar, ProcessSummary, ReviewStatus, ScannedEntry,
    SidecarTrack, SidecarValidation, StagingRecord, SIDECAR_FILE_NAME, SIDECAR_SCHEMA_VERSION,
};
use crate::utils::paths::{album_relative_dir, prune_empty_dirs};
use crate::utils::relocation::RelocationStrategy;
use crate::utils::{sha256_bytes, sha256_file, sha256_parts, MoveRateLimiter, Relocator};
use album_common::{Error, Result};
use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Processor settings for one run
#[derive(Debug, Clone)]
pub struct ProcessOptions {
    pub staging_root: PathBuf,
    pub workers: usize,
    /// File moves per second across all workers, 0 = unlimited
    pub rate_limit: u32,
    pub dry_run: bool,
    pub max_lock_wait_ms: u64,
}

/// One file of an album plan
#[derive(Debug, Clone)]
struct PlannedMove {
    entry: ScannedEntry,
    file_name: String,
    target: PathBuf,
}

/// A file this run moved into the album directory
#[derive(Debug, Clone)]
struct MovedFile {
    source: PathBuf,
    target: PathBuf,
    checksum: Option<String>,
    /// The target already held this content and the source was dropped
    deduplicated: bool,
}

/// What an album run changed on disk
#[derive(Debug, Default)]
struct StageJournal {
    moved: Vec<MovedFile>,
    /// Set once this run has written the sidecar
    sidecar: Option<PathBuf>,
}

enum StageError {
    Cancelled,
    Failed(Error),
}

impl From<Error> for StageError {
    fn from(err: Error) -> Self {
        StageError::Failed(err)
    }
}

struct Staged {
    destination: PathBuf,
    record_id: Option<Uuid>,
}

pub struct Processor {
    options: ProcessOptions,
    store: Option<SqlitePool>,
    allocator: DirectoryCodeAllocator,
    limiter: MoveRateLimiter,
    relocator: Arc<Relocator>,
}

impl Processor {
    /// Codes are persisted only when a store is given and this is not a dry run
    pub fn new(options: ProcessOptions, store: Option<SqlitePool>) -> Self {
        let allocator = match (&store, options.dry_run) {
            (Some(pool), false) => DirectoryCodeAllocator::new(pool.clone()),
            _ => DirectoryCodeAllocator::non_persisting(store.clone()),
        };

        Self {
            limiter: MoveRateLimiter::new(options.rate_limit),
            options,
            store,
            allocator,
            relocator: Arc::new(Relocator::new()),
        }
    }

    pub fn with_relocator(mut self, relocator: Relocator) -> Self {
        self.relocator = Arc::new(relocator);
        self
    }

    /// Process every album group of `catalog`
    pub async fn run(&self, catalog: &ScanCatalog, cancel: &CancellationToken) -> Result<ProcessSummary> {
        let started = Instant::now();

        if catalog.ungrouped_count().await? > 0 {
            return Err(Error::Precondition(format!(
                "catalog {} has not been grouped",
                catalog.path().display()
            )));
        }

        let session = catalog.session().await?;
        let groups = collect_groups(catalog.load_entries().await?, &session.root);

        info!(
            catalog = %catalog.path().display(),
            albums = groups.len(),
            workers = self.options.workers,
            rate_limit = self.limiter.per_second(),
            dry_run = self.options.dry_run,
            "Processing albums"
        );

        if !self.options.dry_run {
            tokio::fs::create_dir_all(&self.options.staging_root).await?;
        }

        let mut summary = ProcessSummary {
            session_id: session.id.clone(),
            dry_run: self.options.dry_run,
            ..Default::default()
        };

        let mut pending = groups.into_iter();
        let mut in_flight = FuturesUnordered::new();

        for group in pending.by_ref().take(self.options.workers.max(1)) {
            in_flight.push(self.process_album(group, &session.id, cancel));
        }

        while let Some(result) = in_flight.next().await {
            summary.record(result);
            if let Some(group) = pending.next() {
                in_flight.push(self.process_album(group, &session.id, cancel));
            }
        }

        summary.elapsed_ms = started.elapsed().as_millis() as u64;

        info!(
            processed = summary.albums_processed,
            failed = summary.albums_failed,
            skipped_invalid = summary.albums_skipped_invalid,
            cancelled = summary.albums_cancelled,
            tracks = summary.tracks_moved,
            bytes = summary.total_bytes,
            elapsed_ms = summary.elapsed_ms,
            "Processing complete"
        );

        Ok(summary)
    }

    async fn process_album(&self, group: AlbumGroup, session_id: &str, cancel: &CancellationToken) -> AlbumResult {
        let mut result = AlbumResult {
            group_id: group.group_id.clone(),
            artist: group.artist.clone(),
            album: group.album.clone(),
            year: group.year,
            destination: None,
            outcome: AlbumOutcome::Failed,
            tracks: group.track_count(),
            bytes: group.total_bytes(),
            staging_record_id: None,
            error: None,
        };

        if !group.is_valid() {
            info!(
                album = %group.album,
                artist = %group.artist,
                invalid = group.invalid_count(),
                "Skipping album with invalid members"
            );
            result.outcome = AlbumOutcome::SkippedInvalid;
            return result;
        }

        if cancel.is_cancelled() {
            result.outcome = AlbumOutcome::Cancelled;
            return result;
        }

        match self.stage(&group, session_id, cancel).await {
            Ok(staged) => {
                result.outcome = if self.options.dry_run {
                    AlbumOutcome::Planned
                } else {
                    AlbumOutcome::Staged
                };
                result.destination = Some(staged.destination);
                result.staging_record_id = staged.record_id;
            }
            Err(StageError::Cancelled) => {
                warn!(album = %group.album, "Album cancelled, moved files restored");
                result.outcome = AlbumOutcome::Cancelled;
            }
            Err(StageError::Failed(e)) => {
                error!(album = %group.album, artist = %group.artist, error = %e, "Album failed");
                result.outcome = AlbumOutcome::Failed;
                result.error = Some(e.to_string());
            }
        }

        result
    }

    async fn stage(
        &self,
        group: &AlbumGroup,
        session_id: &str,
        cancel: &CancellationToken,
    ) -> std::result::Result<Staged, StageError> {
        let code = self.allocator.allocate(&group.artist).await?;
        let album_dir = self
            .options
            .staging_root
            .join(album_relative_dir(&code, &group.artist, group.year, &group.album));
        let plan = plan_moves(&group.entries, &album_dir);

        if let Some(store) = &self.store {
            if staging_records::staging_path_exists(store, &album_dir).await? {
                return Err(Error::Conflict(format!(
                    "staging path {} is already recorded",
                    album_dir.display()
                ))
                .into());
            }
        }

        let preflight_plan = plan.clone();
        let sidecar_path = album_dir.join(SIDECAR_FILE_NAME);
        let group_id = group.group_id.clone();
        tokio::task::spawn_blocking(move || preflight(&preflight_plan, &sidecar_path, &group_id))
            .await
            .map_err(|e| Error::Internal(format!("Pre-flight task failed: {}", e)))??;

        if self.options.dry_run {
            for planned in &plan {
                debug!(
                    source = %planned.entry.source_path.display(),
                    target = %planned.target.display(),
                    "Would move"
                );
            }
            info!(
                album = %group.album,
                destination = %album_dir.display(),
                tracks = plan.len(),
                "Dry run: album planned"
            );
            return Ok(Staged {
                destination: album_dir,
                record_id: None,
            });
        }

        tokio::fs::create_dir_all(&album_dir).await.map_err(Error::Io)?;

        let mut journal = StageJournal::default();

        let outcome = self
            .move_and_record(group, session_id, &code, &album_dir, &plan, &mut journal, cancel)
            .await;

        match outcome {
            Ok(staged) => Ok(staged),
            Err(err) => {
                self.compensate(&journal, &album_dir).await;
                Err(err)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn move_and_record(
        &self,
        group: &AlbumGroup,
        session_id: &str,
        code: &str,
        album_dir: &Path,
        plan: &[PlannedMove],
        journal: &mut StageJournal,
        cancel: &CancellationToken,
    ) -> std::result::Result<Staged, StageError> {
        for planned in plan {
            if cancel.is_cancelled() {
                return Err(StageError::Cancelled);
            }

            self.limiter.acquire().await;

            let source = planned.entry.source_path.clone();
            let target = planned.target.clone();
            let checksum = planned.entry.checksum.clone();
            let relocator = Arc::clone(&self.relocator);

            let moved = tokio::task::spawn_blocking(move || {
                let source_existed = source.exists();
                relocator
                    .relocate(&source, &target, checksum.as_deref())
                    .map(|outcome| (outcome, source_existed))
            })
            .await
            .map_err(|e| Error::Internal(format!("Relocation task failed: {}", e)))?;

            let (outcome, source_existed) = moved.map_err(Error::from)?;

            if source_existed {
                journal.moved.push(MovedFile {
                    source: planned.entry.source_path.clone(),
                    target: planned.target.clone(),
                    checksum: planned.entry.checksum.clone(),
                    deduplicated: outcome.strategy == RelocationStrategy::AlreadyPresent,
                });
            }

            if outcome.strategy == RelocationStrategy::CopyVerify {
                debug!(
                    file = %planned.file_name,
                    rename_error = ?outcome.rename_error,
                    "Copied across filesystems"
                );
            }
        }

        let sidecar = build_sidecar(group, session_id, code, plan);
        let bytes = sidecar.to_json_pretty().map_err(Error::from)?;
        let sidecar_path = album_dir.join(SIDECAR_FILE_NAME);
        write_atomic(&sidecar_path, &bytes).await?;
        journal.sidecar = Some(sidecar_path.clone());
        let checksum = sha256_bytes(&bytes);

        let mut record_id = None;
        if let Some(store) = &self.store {
            let record = StagingRecord {
                id: Uuid::new_v4(),
                scan_session_id: session_id.to_string(),
                staging_path: album_dir.to_path_buf(),
                sidecar_path: sidecar_path.clone(),
                artist: group.artist.clone(),
                album: group.album.clone(),
                year: group.year,
                directory_code: code.to_string(),
                group_id: group.group_id.clone(),
                track_count: plan.len() as u32,
                total_bytes: group.total_bytes(),
                checksum,
                processed_at: Utc::now(),
                status: ReviewStatus::PendingReview,
                reviewer: None,
                reviewed_at: None,
                review_notes: None,
                promotion_claim: None,
                claimed_at: None,
            };
            staging_records::insert_record(store, &record, self.options.max_lock_wait_ms).await?;
            record_id = Some(record.id);
        }

        info!(
            album = %group.album,
            artist = %group.artist,
            destination = %album_dir.display(),
            tracks = plan.len(),
            "Album staged"
        );

        Ok(Staged {
            destination: album_dir.to_path_buf(),
            record_id,
        })
    }

    /// Put moved files back and remove what this album created
    async fn compensate(&self, journal: &StageJournal, album_dir: &Path) {
        for moved in journal.moved.iter().rev() {
            let relocator = Arc::clone(&self.relocator);
            let moved = moved.clone();

            let restored = tokio::task::spawn_blocking(move || {
                if moved.deduplicated {
                    // the staged copy predates this run
                    relocator.duplicate(&moved.target, &moved.source, moved.checksum.as_deref())
                } else {
                    relocator.relocate(&moved.target, &moved.source, moved.checksum.as_deref())
                }
            })
            .await;

            match restored {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => error!(error = %e, "Failed to restore file after album failure"),
                Err(e) => error!(error = %e, "Restore task failed"),
            }
        }

        if let Some(sidecar) = &journal.sidecar {
            if let Err(e) = tokio::fs::remove_file(sidecar).await {
                error!(sidecar = %sidecar.display(), error = %e, "Failed to remove sidecar");
            }
        }

        prune_empty_dirs(album_dir, &self.options.staging_root);
    }
}

/// Destination names: original file names, disc-prefixed only when two
/// members share a name; in disc/track order
fn plan_moves(entries: &[ScannedEntry], album_dir: &Path) -> Vec<PlannedMove> {
    let mut ordered: Vec<&ScannedEntry> = entries.iter().collect();
    ordered.sort_by(|a, b| {
        (a.tags.disc_number.unwrap_or(1), a.tags.track_number.unwrap_or(u32::MAX), a.file_name())
            .cmp(&(b.tags.disc_number.unwrap_or(1), b.tags.track_number.unwrap_or(u32::MAX), b.file_name()))
    });

    let mut name_counts: HashMap<String, usize> = HashMap::new();
    for entry in &ordered {
        *name_counts.entry(entry.file_name().to_lowercase()).or_insert(0) += 1;
    }

    let mut used: HashSet<String> = HashSet::new();
    let mut duplicate_ordinal: HashMap<String, u32> = HashMap::new();

    ordered
        .into_iter()
        .map(|entry| {
            let original = entry.file_name();
            let key = original.to_lowercase();

            let mut file_name = if name_counts.get(&key).copied().unwrap_or(0) > 1 {
                let ordinal = duplicate_ordinal.entry(key.clone()).or_insert(0);
                *ordinal += 1;
                let disc = entry.tags.disc_number.unwrap_or(*ordinal);
                format!("{}-{}", disc, original)
            } else {
                original.clone()
            };

            let mut counter = 2;
            while !used.insert(file_name.to_lowercase()) {
                file_name = format!("{}-{}", counter, original);
                counter += 1;
            }

            PlannedMove {
                target: album_dir.join(&file_name),
                entry: entry.clone(),
                file_name,
            }
        })
        .collect()
}

/// Fail before anything moves if a target holds different content, or the
/// album directory already carries another group's sidecar
fn preflight(plan: &[PlannedMove], sidecar_path: &Path, group_id: &str) -> Result<()> {
    if sidecar_path.exists() {
        let owner = std::fs::read(sidecar_path)
            .ok()
            .and_then(|bytes| AlbumSidecar::from_json(&bytes).ok())
            .map(|sidecar| sidecar.group_id);
        if owner.as_deref() != Some(group_id) {
            return Err(Error::Conflict(format!(
                "{} belongs to another album",
                sidecar_path.display()
            )));
        }
    }

    for planned in plan {
        if !planned.target.exists() {
            continue;
        }
        let existing = sha256_file(&planned.target)?;
        if planned.entry.checksum.as_deref() != Some(existing.as_str()) {
            return Err(Error::Conflict(format!(
                "{} already exists with different content",
                planned.target.display()
            )));
        }
        debug!(target = %planned.target.display(), "Target already holds this file");
    }
    Ok(())
}

fn build_sidecar(group: &AlbumGroup, session_id: &str, code: &str, plan: &[PlannedMove]) -> AlbumSidecar {
    let tracks: Vec<SidecarTrack> = plan
        .iter()
        .map(|p| SidecarTrack {
            title: p.entry.tags.title.clone(),
            track_number: p.entry.tags.track_number,
            track_total: p.entry.tags.track_total,
            disc_number: p.entry.tags.disc_number,
            disc_total: p.entry.tags.disc_total,
            duration_secs: p.entry.properties.duration_secs,
            checksum: p.entry.checksum.clone().unwrap_or_default(),
            bitrate_kbps: p.entry.properties.bitrate_kbps,
            sample_rate: p.entry.properties.sample_rate,
            size_bytes: p.entry.size_bytes,
            file_name: p.file_name.clone(),
            source_path: p.entry.source_path.to_string_lossy().into_owned(),
        })
        .collect();

    let aggregate_checksum = sha256_parts(tracks.iter().map(|t| t.checksum.as_str()));

    let mut validation = SidecarValidation::default();
    if group.year.is_none() {
        validation.warnings.push("no release year".to_string());
    }
    let untracked = tracks.iter().filter(|t| t.track_number.is_none()).count();
    if untracked > 0 {
        validation
            .warnings
            .push(format!("{} track(s) without a track number", untracked));
    }
    let from_filenames = plan
        .iter()
        .filter(|p| !p.entry.metadata_sources.iter().any(|s| s == "tags"))
        .count();
    if from_filenames > 0 {
        validation
            .warnings
            .push(format!("{} track(s) described from file names only", from_filenames));
    }

    AlbumSidecar {
        schema_version: SIDECAR_SCHEMA_VERSION,
        artist: group.artist.clone(),
        album: group.album.clone(),
        year: group.year,
        directory_code: code.to_string(),
        group_id: group.group_id.clone(),
        scan_session: session_id.to_string(),
        tracks,
        aggregate_checksum,
        validation,
        generated_at: Utc::now(),
    }
}

/// Write through a temporary sibling and rename into place
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = path.with_file_name(format!(".{}.tmp", file_name));

    tokio::fs::write(&temp, bytes).await?;
    tokio::fs::rename(&temp, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str, disc: Option<u32>, track: Option<u32>) -> ScannedEntry {
        let mut e = ScannedEntry::new(PathBuf::from(path));
        e.tags.disc_number = disc;
        e.tags.track_number = track;
        e.checksum = Some("0".repeat(64));
        e
    }

    #[test]
    fn test_plan_keeps_names_and_orders_tracks() {
        let entries = vec![
            entry("/src/b/02 Two.flac", None, Some(2)),
            entry("/src/a/01 One.flac", None, Some(1)),
        ];

        let plan = plan_moves(&entries, Path::new("/stage/X"));

        assert_eq!(plan[0].file_name, "01 One.flac");
        assert_eq!(plan[1].file_name, "02 Two.flac");
        assert_eq!(plan[1].target, PathBuf::from("/stage/X/02 Two.flac"));
    }

    #[test]
    fn test_plan_disc_prefix_on_shared_names() {
        let entries = vec![
            entry("/src/CD1/01 Intro.mp3", Some(1), Some(1)),
            entry("/src/CD2/01 Intro.mp3", Some(2), Some(1)),
            entry("/src/CD2/02 Song.mp3", Some(2), Some(2)),
        ];

        let plan = plan_moves(&entries, Path::new("/stage/X"));
        let names: Vec<&str> = plan.iter().map(|p| p.file_name.as_str()).collect();

        assert_eq!(names, vec!["1-01 Intro.mp3", "2-01 Intro.mp3", "02 Song.mp3"]);
    }

    #[test]
    fn test_plan_without_disc_numbers_still_unique() {
        let entries = vec![
            entry("/src/x/track.mp3", None, Some(1)),
            entry("/src/y/track.mp3", None, Some(2)),
        ];

        let plan = plan_moves(&entries, Path::new("/stage/X"));
        let names: Vec<&str> = plan.iter().map(|p| p.file_name.as_str()).collect();

        assert_eq!(names, vec!["1-track.mp3", "2-track.mp3"]);
    }
}
