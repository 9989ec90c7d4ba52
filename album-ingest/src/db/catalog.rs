//! Ephemeral scan catalog
//!
//! One SQLite file per scan invocation (`scan-<UTC timestamp>-<id>.db`).
//! The scanner appends rows, the grouping engine fills in the grouping
//! columns, and the processor reads the result. Nothing else writes to it.

use super::{parse_opt_timestamp, to_db_timestamp};
use crate::models::{AudioProperties, GroupAssignment, ScanSummary, ScannedEntry, TagFields, ValidationFailure};
use album_common::db::{open_pool, PoolSettings};
use album_common::{Error, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

/// Session row of a catalog
#[derive(Debug, Clone)]
pub struct ScanSession {
    pub id: String,
    pub root: PathBuf,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// `scanning`, `grouped`, or `cancelled`
    pub status: String,
    pub files_seen: u64,
    pub eligible: u64,
    pub valid: u64,
    pub invalid: u64,
    pub skipped: u64,
    pub album_groups: u64,
}

/// Handle to one scan session's catalog database
#[derive(Clone)]
pub struct ScanCatalog {
    pool: SqlitePool,
    path: PathBuf,
    session_id: String,
}

impl ScanCatalog {
    /// Create a fresh catalog file in `dir` for a scan of `root`
    pub async fn create(dir: &Path, root: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;

        let session_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let file_name = format!(
            "scan-{}-{}.db",
            started_at.format("%Y%m%dT%H%M%SZ"),
            &session_id[..8]
        );
        let path = dir.join(file_name);

        let pool = open_pool(&path, &PoolSettings::default()).await?;
        init_catalog(&pool).await?;

        sqlx::query(
            r#"
            INSERT INTO scan_sessions (id, root, started_at, status)
            VALUES (?, ?, ?, 'scanning')
            "#,
        )
        .bind(&session_id)
        .bind(root.to_string_lossy().as_ref())
        .bind(to_db_timestamp(&started_at))
        .execute(&pool)
        .await?;

        info!(catalog = %path.display(), session = %session_id, "Created scan catalog");

        Ok(Self {
            pool,
            path,
            session_id,
        })
    }

    /// Open an existing catalog; a missing file is an error
    pub async fn open(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::NotFound(format!("scan catalog {}", path.display())));
        }

        let settings = PoolSettings {
            create_if_missing: false,
            ..PoolSettings::default()
        };
        let pool = open_pool(path, &settings).await?;

        let session_id: Option<String> =
            sqlx::query_scalar("SELECT id FROM scan_sessions ORDER BY started_at LIMIT 1")
                .fetch_optional(&pool)
                .await
                .map_err(|e| Error::InvalidInput(format!("{} is not a scan catalog: {}", path.display(), e)))?;

        let session_id = session_id
            .ok_or_else(|| Error::InvalidInput(format!("{} has no scan session", path.display())))?;

        debug!(catalog = %path.display(), session = %session_id, "Opened scan catalog");

        Ok(Self {
            pool,
            path: path.to_path_buf(),
            session_id,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Insert a batch of entries in one transaction
    pub async fn insert_batch(&self, entries: &[ScannedEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for entry in entries {
            let sources = serde_json::to_string(&entry.metadata_sources)?;

            sqlx::query(
                r#"
                INSERT INTO scanned_entries (
                    session_id, source_path, extension, size_bytes, checksum, modified_at,
                    artist, album_artist, album, title, track_number, track_total,
                    disc_number, disc_total, year, genre,
                    duration_secs, bitrate_kbps, sample_rate, metadata_sources,
                    is_valid, failure_reason, failure_detail
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&self.session_id)
            .bind(entry.source_path.to_string_lossy().as_ref())
            .bind(&entry.extension)
            .bind(entry.size_bytes as i64)
            .bind(&entry.checksum)
            .bind(entry.modified_at.as_ref().map(to_db_timestamp))
            .bind(&entry.tags.artist)
            .bind(&entry.tags.album_artist)
            .bind(&entry.tags.album)
            .bind(&entry.tags.title)
            .bind(entry.tags.track_number.map(i64::from))
            .bind(entry.tags.track_total.map(i64::from))
            .bind(entry.tags.disc_number.map(i64::from))
            .bind(entry.tags.disc_total.map(i64::from))
            .bind(entry.tags.year.map(i64::from))
            .bind(&entry.tags.genre)
            .bind(entry.properties.duration_secs)
            .bind(entry.properties.bitrate_kbps.map(i64::from))
            .bind(entry.properties.sample_rate.map(i64::from))
            .bind(sources)
            .bind(entry.is_valid)
            .bind(entry.failure.map(|f| f.as_str()))
            .bind(&entry.failure_detail)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(rows = entries.len(), "Catalog batch committed");
        Ok(())
    }

    /// All entries ordered by source path
    pub async fn load_entries(&self) -> Result<Vec<ScannedEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, source_path, extension, size_bytes, checksum, modified_at,
                   artist, album_artist, album, title, track_number, track_total,
                   disc_number, disc_total, year, genre,
                   duration_secs, bitrate_kbps, sample_rate, metadata_sources,
                   is_valid, failure_reason, failure_detail,
                   grouping_hash, group_id, group_year
            FROM scanned_entries
            WHERE session_id = ?
            ORDER BY source_path
            "#,
        )
        .bind(&self.session_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(entry_from_row).collect()
    }

    /// Persist grouping results, `batch_size` rows per transaction
    pub async fn apply_grouping(&self, assignments: &[GroupAssignment], batch_size: usize) -> Result<()> {
        for chunk in assignments.chunks(batch_size.max(1)) {
            let mut tx = self.pool.begin().await?;

            for assignment in chunk {
                sqlx::query(
                    r#"
                    UPDATE scanned_entries
                    SET grouping_hash = ?, group_id = ?, group_year = ?
                    WHERE id = ?
                    "#,
                )
                .bind(&assignment.grouping_hash)
                .bind(&assignment.group_id)
                .bind(assignment.group_year.map(i64::from))
                .bind(assignment.entry_id)
                .execute(&mut *tx)
                .await?;
            }

            tx.commit().await?;
        }

        debug!(rows = assignments.len(), "Grouping assignments written");
        Ok(())
    }

    /// Number of entries still missing a group id
    pub async fn ungrouped_count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM scanned_entries WHERE session_id = ? AND group_id IS NULL",
        )
        .bind(&self.session_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count as u64)
    }

    /// Record the final counts of the session
    pub async fn finish_session(&self, summary: &ScanSummary) -> Result<()> {
        let status = if summary.cancelled { "cancelled" } else { "grouped" };

        sqlx::query(
            r#"
            UPDATE scan_sessions
            SET finished_at = ?, status = ?, files_seen = ?, eligible = ?, valid = ?,
                invalid = ?, skipped = ?, album_groups = ?
            WHERE id = ?
            "#,
        )
        .bind(to_db_timestamp(&Utc::now()))
        .bind(status)
        .bind(summary.files_seen as i64)
        .bind(summary.eligible as i64)
        .bind(summary.valid as i64)
        .bind(summary.invalid as i64)
        .bind(summary.skipped as i64)
        .bind(summary.album_groups as i64)
        .bind(&self.session_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn session(&self) -> Result<ScanSession> {
        let row = sqlx::query(
            r#"
            SELECT id, root, started_at, finished_at, status, files_seen, eligible,
                   valid, invalid, skipped, album_groups
            FROM scan_sessions
            WHERE id = ?
            "#,
        )
        .bind(&self.session_id)
        .fetch_one(&self.pool)
        .await?;

        let root: String = row.get("root");
        let started_at: String = row.get("started_at");

        Ok(ScanSession {
            id: row.get("id"),
            root: PathBuf::from(root),
            started_at: super::parse_db_timestamp(&started_at)?,
            finished_at: parse_opt_timestamp(row.get("finished_at"))?,
            status: row.get("status"),
            files_seen: row.get::<i64, _>("files_seen") as u64,
            eligible: row.get::<i64, _>("eligible") as u64,
            valid: row.get::<i64, _>("valid") as u64,
            invalid: row.get::<i64, _>("invalid") as u64,
            skipped: row.get::<i64, _>("skipped") as u64,
            album_groups: row.get::<i64, _>("album_groups") as u64,
        })
    }

    /// Close the pool, checkpointing the WAL into the catalog file
    pub async fn close(self) {
        self.pool.close().await;
    }
}

async fn init_catalog(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS scan_sessions (
            id TEXT PRIMARY KEY,
            root TEXT NOT NULL,
            started_at TEXT NOT NULL,
            finished_at TEXT,
            status TEXT NOT NULL,
            files_seen INTEGER NOT NULL DEFAULT 0,
            eligible INTEGER NOT NULL DEFAULT 0,
            valid INTEGER NOT NULL DEFAULT 0,
            invalid INTEGER NOT NULL DEFAULT 0,
            skipped INTEGER NOT NULL DEFAULT 0,
            album_groups INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS scanned_entries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id TEXT NOT NULL REFERENCES scan_sessions(id),
            source_path TEXT NOT NULL,
            extension TEXT NOT NULL,
            size_bytes INTEGER NOT NULL,
            checksum TEXT,
            modified_at TEXT,
            artist TEXT,
            album_artist TEXT,
            album TEXT,
            title TEXT,
            track_number INTEGER,
            track_total INTEGER,
            disc_number INTEGER,
            disc_total INTEGER,
            year INTEGER,
            genre TEXT,
            duration_secs REAL,
            bitrate_kbps INTEGER,
            sample_rate INTEGER,
            metadata_sources TEXT NOT NULL DEFAULT '[]',
            is_valid INTEGER NOT NULL,
            failure_reason TEXT,
            failure_detail TEXT,
            grouping_hash TEXT,
            group_id TEXT,
            group_year INTEGER,
            UNIQUE (session_id, source_path)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_scanned_entries_group ON scanned_entries(group_id)")
        .execute(pool)
        .await?;

    Ok(())
}

fn opt_u32(row: &SqliteRow, column: &str) -> Option<u32> {
    row.get::<Option<i64>, _>(column).and_then(|v| u32::try_from(v).ok())
}

fn entry_from_row(row: &SqliteRow) -> Result<ScannedEntry> {
    let source_path: String = row.get("source_path");
    let sources: String = row.get("metadata_sources");
    let failure: Option<String> = row.get("failure_reason");

    Ok(ScannedEntry {
        id: row.get("id"),
        source_path: PathBuf::from(source_path),
        extension: row.get("extension"),
        size_bytes: row.get::<i64, _>("size_bytes") as u64,
        checksum: row.get("checksum"),
        modified_at: parse_opt_timestamp(row.get("modified_at"))?,
        tags: TagFields {
            artist: row.get("artist"),
            album_artist: row.get("album_artist"),
            album: row.get("album"),
            title: row.get("title"),
            track_number: opt_u32(row, "track_number"),
            track_total: opt_u32(row, "track_total"),
            disc_number: opt_u32(row, "disc_number"),
            disc_total: opt_u32(row, "disc_total"),
            year: opt_u32(row, "year"),
            genre: row.get("genre"),
        },
        properties: AudioProperties {
            duration_secs: row.get("duration_secs"),
            bitrate_kbps: opt_u32(row, "bitrate_kbps"),
            sample_rate: opt_u32(row, "sample_rate"),
        },
        metadata_sources: serde_json::from_str(&sources)?,
        is_valid: row.get("is_valid"),
        failure: failure.as_deref().and_then(ValidationFailure::parse),
        failure_detail: row.get("failure_detail"),
        grouping_hash: row.get("grouping_hash"),
        group_id: row.get("group_id"),
        group_year: opt_u32(row, "group_year"),
    })
}
