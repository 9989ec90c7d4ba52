//! Promotion of approved albums into the production catalog
//!
//! A promotion claims the staging record, verifies the staged files against
//! the sidecar, then in one transaction creates the catalog rows, moves the
//! files and deletes the staging record. Any failure rolls the transaction
//! back, moves files back into staging and releases the claim, leaving the
//! record approved.

use crate::db::albums::{insert_album, NewAlbum};
use crate::db::{artists, staging_records, tracks};
use crate::models::{AlbumSidecar, PromotionReport, ReviewStatus, StagingRecord, SIDECAR_FILE_NAME};
use crate::utils::paths::{album_relative_dir, prune_empty_dirs};
use crate::utils::{
    begin_monitored, sha256_bytes, sha256_file, MonitoredTransaction, RelocationStrategy, Relocator,
};
use album_common::{Error, Result};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// One file carried from staging into production
#[derive(Debug, Clone)]
struct PlannedMove {
    staged: PathBuf,
    production: PathBuf,
    checksum: String,
}

/// How to undo one step of a failed promotion
#[derive(Debug, Clone)]
enum JournalEntry {
    /// Staged file was moved; move it back
    Moved(PlannedMove),
    /// Production already held the content and the staged copy was dropped;
    /// copy it back
    Deduplicated(PlannedMove),
}

pub struct PromotionEngine {
    db: SqlitePool,
    staging_root: PathBuf,
    production_root: PathBuf,
    relocator: Arc<Relocator>,
}

impl PromotionEngine {
    pub fn new(db: SqlitePool, staging_root: PathBuf, production_root: PathBuf) -> Self {
        Self {
            db,
            staging_root,
            production_root,
            relocator: Arc::new(Relocator::new()),
        }
    }

    pub fn with_relocator(mut self, relocator: Relocator) -> Self {
        self.relocator = Arc::new(relocator);
        self
    }

    /// Promote an approved record
    ///
    /// Errors: `NotFound` for an unknown record, `Precondition` when it is not
    /// approved or its staged content no longer matches, `Conflict` when
    /// another promotion holds the claim.
    pub async fn promote(&self, id: Uuid) -> Result<PromotionReport> {
        let record = staging_records::load_record(&self.db, id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("staging record {}", id)))?;

        if record.is_claimed() {
            return Err(Error::Conflict(format!("staging record {} is already being promoted", id)));
        }
        if record.status != ReviewStatus::Approved {
            return Err(Error::Precondition(format!(
                "staging record {} is {}, only approved records can be promoted",
                id, record.status
            )));
        }

        let token = Uuid::new_v4().to_string();
        if !staging_records::claim(&self.db, id, &token).await? {
            return Err(Error::Conflict(format!(
                "staging record {} was claimed or changed concurrently",
                id
            )));
        }
        debug!(record = %id, "Promotion claim acquired");

        match self.promote_claimed(&record, &token).await {
            Ok(report) => {
                prune_empty_dirs(&record.staging_path, &self.staging_root);
                info!(
                    record = %id,
                    album = %record.album,
                    artist = %record.artist,
                    destination = %report.production_path.display(),
                    tracks = report.tracks,
                    "Album promoted"
                );
                Ok(report)
            }
            Err(e) => {
                match staging_records::release_claim(&self.db, id, &token).await {
                    Ok(true) => {}
                    Ok(false) => warn!(record = %id, "Promotion claim was already gone"),
                    Err(release_err) => {
                        error!(record = %id, error = %release_err, "Failed to release promotion claim")
                    }
                }
                warn!(record = %id, error = %e, "Promotion failed, rolled back");
                Err(e)
            }
        }
    }

    async fn promote_claimed(&self, record: &StagingRecord, token: &str) -> Result<PromotionReport> {
        let production_path = self.production_root.join(album_relative_dir(
            &record.directory_code,
            &record.artist,
            record.year,
            &record.album,
        ));
        let (sidecar, plan) = self.verified_plan(record, &production_path).await?;

        let mut tx = begin_monitored(&self.db, "promote").await?;
        let mut journal: Vec<JournalEntry> = Vec::new();

        let applied = self
            .apply(&mut tx, record, token, &sidecar, &production_path, &plan, &mut journal)
            .await;

        let committed = match applied {
            Ok(report) => tx.commit().await.map(|_| report),
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    error!(error = %rollback_err, "Promotion rollback failed");
                }
                Err(e)
            }
        };

        if committed.is_err() {
            self.undo_moves(&journal).await;
            prune_empty_dirs(&production_path, &self.production_root);
        }

        committed
    }

    /// Load the sidecar, check it against the record, and check every file
    /// it lists against both roots
    async fn verified_plan(
        &self,
        record: &StagingRecord,
        production_path: &Path,
    ) -> Result<(AlbumSidecar, Vec<PlannedMove>)> {
        let promoted_sidecar = production_path.join(SIDECAR_FILE_NAME);
        let unreadable = |path: &Path, e: std::io::Error| {
            Error::Precondition(format!("sidecar {} unreadable: {}", path.display(), e))
        };

        let bytes = match tokio::fs::read(&record.sidecar_path).await {
            Ok(bytes) => bytes,
            // an interrupted promotion moves the sidecar last
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => tokio::fs::read(&promoted_sidecar)
                .await
                .map_err(|_| unreadable(&record.sidecar_path, e))?,
            Err(e) => return Err(unreadable(&record.sidecar_path, e)),
        };

        if sha256_bytes(&bytes) != record.checksum {
            return Err(Error::Precondition(format!(
                "sidecar {} does not match the staging record checksum",
                record.sidecar_path.display()
            )));
        }

        let sidecar = AlbumSidecar::from_json(&bytes)?;

        let mut plan: Vec<PlannedMove> = sidecar
            .tracks
            .iter()
            .map(|t| PlannedMove {
                staged: record.staging_path.join(&t.file_name),
                production: production_path.join(&t.file_name),
                checksum: t.checksum.clone(),
            })
            .collect();
        plan.push(PlannedMove {
            staged: record.sidecar_path.clone(),
            production: promoted_sidecar,
            checksum: record.checksum.clone(),
        });

        let checked = plan.clone();
        tokio::task::spawn_blocking(move || check_plan(&checked))
            .await
            .map_err(|e| Error::Internal(format!("Verification task failed: {}", e)))??;

        Ok((sidecar, plan))
    }

    #[allow(clippy::too_many_arguments)]
    async fn apply(
        &self,
        tx: &mut MonitoredTransaction<'_>,
        record: &StagingRecord,
        token: &str,
        sidecar: &AlbumSidecar,
        production_path: &Path,
        plan: &[PlannedMove],
        journal: &mut Vec<JournalEntry>,
    ) -> Result<PromotionReport> {
        let artist = artists::find_or_create(tx.conn(), &sidecar.artist).await?;

        let album_id = insert_album(
            tx.conn(),
            &NewAlbum {
                artist_id: artist.id,
                title: &sidecar.album,
                year: sidecar.year,
                directory_code: &record.directory_code,
                production_path,
                checksum: &record.checksum,
                track_count: sidecar.tracks.len() as u32,
                total_bytes: sidecar.total_bytes(),
                scan_session_id: &record.scan_session_id,
            },
        )
        .await?;

        for track in &sidecar.tracks {
            tracks::insert_track(tx.conn(), album_id, track, &production_path.join(&track.file_name)).await?;
        }

        for planned in plan {
            let relocator = Arc::clone(&self.relocator);
            let task = planned.clone();

            let (had_source, outcome) = tokio::task::spawn_blocking(move || {
                let had_source = task.staged.exists();
                relocator
                    .relocate(&task.staged, &task.production, Some(&task.checksum))
                    .map(|outcome| (had_source, outcome))
            })
            .await
            .map_err(|e| Error::Internal(format!("Relocation task failed: {}", e)))??;

            match (had_source, outcome.strategy) {
                (false, _) => debug!(
                    file = %planned.production.display(),
                    "File already promoted by an earlier attempt"
                ),
                (true, RelocationStrategy::AlreadyPresent) => {
                    journal.push(JournalEntry::Deduplicated(planned.clone()))
                }
                (true, _) => journal.push(JournalEntry::Moved(planned.clone())),
            }
        }

        if !staging_records::delete_claimed(tx.conn(), record.id, token).await? {
            return Err(Error::Conflict(format!(
                "promotion claim on {} was lost",
                record.id
            )));
        }

        Ok(PromotionReport {
            record_id: record.id,
            artist_id: artist.id,
            album_id,
            production_path: production_path.to_path_buf(),
            tracks: sidecar.tracks.len(),
            bytes: sidecar.total_bytes(),
        })
    }

    async fn undo_moves(&self, journal: &[JournalEntry]) {
        for entry in journal.iter().rev() {
            let relocator = Arc::clone(&self.relocator);
            let entry = entry.clone();

            let restored = tokio::task::spawn_blocking(move || match &entry {
                JournalEntry::Moved(m) => relocator.relocate(&m.production, &m.staged, Some(&m.checksum)),
                // production keeps its copy
                JournalEntry::Deduplicated(m) => {
                    relocator.duplicate(&m.production, &m.staged, Some(&m.checksum))
                }
            })
            .await;

            match restored {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => error!(error = %e, "Failed to restore file to staging"),
                Err(e) => error!(error = %e, "Restore task failed"),
            }
        }
    }
}

/// Every file must be in staging with its recorded content, or already in
/// production with it from an interrupted attempt. A different file at a
/// production target is a conflict.
fn check_plan(plan: &[PlannedMove]) -> Result<()> {
    for planned in plan {
        if planned.staged.exists() {
            let actual = sha256_file(&planned.staged).map_err(|e| {
                Error::Precondition(format!(
                    "staged file {} unreadable: {}",
                    planned.staged.display(),
                    e
                ))
            })?;
            if actual != planned.checksum {
                return Err(Error::Precondition(format!(
                    "staged file {} does not match its sidecar checksum",
                    planned.staged.display()
                )));
            }
            if planned.production.exists() && sha256_file(&planned.production)? != planned.checksum {
                return Err(Error::Conflict(format!(
                    "{} already exists in production with different content",
                    planned.production.display()
                )));
            }
        } else {
            let promoted = planned.production.exists()
                && sha256_file(&planned.production)? == planned.checksum;
            if !promoted {
                return Err(Error::Precondition(format!(
                    "staged file {} is missing",
                    planned.staged.display()
                )));
            }
        }
    }
    Ok(())
}
