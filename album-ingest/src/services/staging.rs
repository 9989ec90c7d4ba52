//! Review surface over staged albums
//!
//! Reviewers list and inspect staged albums, approve or reject them, and
//! promote approved ones. Every state change is a check-and-set on the
//! record's current status, and none is allowed while a promotion holds the
//! record's claim.

use crate::db::staging_records;
use crate::models::{
    AlbumSidecar, PromotionReport, ReviewStatus, StagingFilter, StagingRecord, StagingStats,
};
use crate::services::promotion::PromotionEngine;
use crate::utils::paths::prune_empty_dirs;
use album_common::{Error, Result};
use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// A staging record together with its parsed sidecar
#[derive(Debug, Clone, Serialize)]
pub struct StagedAlbum {
    pub record: StagingRecord,
    pub sidecar: Option<AlbumSidecar>,
    /// Why the sidecar could not be read, when it could not
    pub sidecar_error: Option<String>,
}

pub struct StagingService {
    db: SqlitePool,
    staging_root: PathBuf,
    promotion: Option<PromotionEngine>,
    max_lock_wait_ms: u64,
}

impl StagingService {
    pub fn new(db: SqlitePool, staging_root: PathBuf, max_lock_wait_ms: u64) -> Self {
        Self {
            db,
            staging_root,
            promotion: None,
            max_lock_wait_ms,
        }
    }

    /// Enable promotion into `production_root`
    pub fn with_production_root(mut self, production_root: PathBuf) -> Self {
        self.promotion = Some(PromotionEngine::new(
            self.db.clone(),
            self.staging_root.clone(),
            production_root,
        ));
        self
    }

    pub fn with_promotion_engine(mut self, engine: PromotionEngine) -> Self {
        self.promotion = Some(engine);
        self
    }

    pub async fn list(&self, filter: &StagingFilter) -> Result<Vec<StagingRecord>> {
        staging_records::list_records(&self.db, filter).await
    }

    pub async fn get(&self, id: Uuid) -> Result<StagedAlbum> {
        let record = self.load(id).await?;

        let (sidecar, sidecar_error) = match tokio::fs::read(&record.sidecar_path).await {
            Ok(bytes) => match AlbumSidecar::from_json(&bytes) {
                Ok(sidecar) => (Some(sidecar), None),
                Err(e) => (None, Some(e.to_string())),
            },
            Err(e) => (None, Some(e.to_string())),
        };

        Ok(StagedAlbum {
            record,
            sidecar,
            sidecar_error,
        })
    }

    pub async fn stats(&self) -> Result<StagingStats> {
        staging_records::record_stats(&self.db).await
    }

    pub async fn approve(&self, id: Uuid, reviewer: &str, notes: Option<&str>) -> Result<StagingRecord> {
        let record = self
            .transition(id, ReviewStatus::PendingReview, ReviewStatus::Approved, reviewer, notes)
            .await?;
        info!(record = %id, reviewer, "Album approved");
        Ok(record)
    }

    /// Reject a pending album; a reason is required
    pub async fn reject(&self, id: Uuid, reviewer: &str, reason: &str) -> Result<StagingRecord> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(Error::InvalidInput("a rejection reason is required".to_string()));
        }

        let record = self
            .transition(id, ReviewStatus::PendingReview, ReviewStatus::Rejected, reviewer, Some(reason))
            .await?;
        info!(record = %id, reviewer, reason, "Album rejected");
        Ok(record)
    }

    /// Put a rejected album back into the review queue
    pub async fn requeue(&self, id: Uuid, reviewer: &str) -> Result<StagingRecord> {
        let record = self
            .transition(id, ReviewStatus::Rejected, ReviewStatus::PendingReview, reviewer, None)
            .await?;
        info!(record = %id, reviewer, "Album requeued for review");
        Ok(record)
    }

    pub async fn promote(&self, id: Uuid) -> Result<PromotionReport> {
        let engine = self.promotion.as_ref().ok_or_else(|| {
            Error::Config("production_root is not configured, promotion is unavailable".to_string())
        })?;
        engine.promote(id).await
    }

    /// Delete a rejected record, optionally removing its staged files
    pub async fn delete(&self, id: Uuid, delete_files: bool) -> Result<()> {
        let record = self.load(id).await?;

        if record.is_claimed() {
            return Err(Error::Conflict(format!("staging record {} is being promoted", id)));
        }
        if record.status != ReviewStatus::Rejected {
            return Err(Error::Precondition(format!(
                "staging record {} is {}, only rejected records can be deleted",
                id, record.status
            )));
        }
        if delete_files && !self.owns(&record) {
            return Err(Error::Precondition(format!(
                "staged directory {} is outside the staging root",
                record.staging_path.display()
            )));
        }

        if !staging_records::delete_unclaimed(&self.db, id, ReviewStatus::Rejected).await? {
            return Err(self.changed_concurrently(id).await);
        }

        if delete_files {
            match tokio::fs::remove_dir_all(&record.staging_path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    warn!(path = %record.staging_path.display(), "Staged directory already gone");
                }
                Err(e) => return Err(Error::Io(e)),
            }
            if let Some(parent) = record.staging_path.parent() {
                prune_empty_dirs(parent, &self.staging_root);
            }
        }

        info!(record = %id, files_removed = delete_files, "Staging record deleted");
        Ok(())
    }

    /// Clear promotion claims older than `max_age`
    pub async fn release_stale_claims(&self, max_age: Duration) -> Result<u64> {
        let max_age = chrono::Duration::from_std(max_age)
            .map_err(|e| Error::InvalidInput(format!("claim age out of range: {}", e)))?;
        let released = staging_records::release_stale_claims(&self.db, Utc::now() - max_age).await?;
        if released > 0 {
            warn!(released, "Released stale promotion claims");
        }
        Ok(released)
    }

    async fn load(&self, id: Uuid) -> Result<StagingRecord> {
        staging_records::load_record(&self.db, id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("staging record {}", id)))
    }

    async fn transition(
        &self,
        id: Uuid,
        from: ReviewStatus,
        to: ReviewStatus,
        reviewer: &str,
        notes: Option<&str>,
    ) -> Result<StagingRecord> {
        let record = self.load(id).await?;

        if record.is_claimed() {
            return Err(Error::Conflict(format!("staging record {} is being promoted", id)));
        }
        if record.status != from {
            return Err(Error::Precondition(format!(
                "staging record {} is {}, expected {}",
                id, record.status, from
            )));
        }

        let changed = staging_records::transition(
            &self.db,
            id,
            from,
            to,
            Some(reviewer),
            notes,
            self.max_lock_wait_ms,
        )
        .await?;

        if !changed {
            return Err(self.changed_concurrently(id).await);
        }

        self.load(id).await
    }

    /// Error for a check-and-set that lost against a concurrent change
    async fn changed_concurrently(&self, id: Uuid) -> Error {
        match staging_records::load_record(&self.db, id).await {
            Ok(Some(current)) if current.is_claimed() => {
                Error::Conflict(format!("staging record {} is being promoted", id))
            }
            Ok(Some(current)) => Error::Precondition(format!(
                "staging record {} changed concurrently and is now {}",
                id, current.status
            )),
            Ok(None) => Error::NotFound(format!("staging record {}", id)),
            Err(e) => e,
        }
    }

    fn owns(&self, record: &StagingRecord) -> bool {
        record.staging_path.starts_with(&self.staging_root) && record.staging_path != self.staging_root
    }
}
