//! Staging record persistence
//!
//! Review transitions and promotion claims are check-and-set updates: each
//! statement names the state it expects, and a zero row count means another
//! writer got there first.

use super::{parse_db_timestamp, parse_opt_timestamp, to_db_timestamp};
use crate::models::{ReviewStatus, StagingFilter, StagingRecord, StagingStats};
use crate::utils::retry_on_lock;
use album_common::{Error, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};
use std::path::{Path, PathBuf};
use uuid::Uuid;

const RECORD_COLUMNS: &str = r#"
    id, scan_session_id, staging_path, sidecar_path, artist, album, year,
    directory_code, group_id, track_count, total_bytes, checksum, processed_at,
    status, reviewer, reviewed_at, review_notes, promotion_claim, claimed_at
"#;

/// Insert a new record
pub async fn insert_record(pool: &SqlitePool, record: &StagingRecord, max_wait_ms: u64) -> Result<()> {
    let id = record.id.to_string();
    let staging_path = record.staging_path.to_string_lossy().into_owned();
    let sidecar_path = record.sidecar_path.to_string_lossy().into_owned();
    let processed_at = to_db_timestamp(&record.processed_at);
    let reviewed_at = record.reviewed_at.as_ref().map(to_db_timestamp);
    let claimed_at = record.claimed_at.as_ref().map(to_db_timestamp);

    retry_on_lock("insert_staging_record", max_wait_ms, || async {
        sqlx::query(&format!(
            "INSERT INTO staging_records ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            RECORD_COLUMNS
        ))
        .bind(&id)
        .bind(&record.scan_session_id)
        .bind(&staging_path)
        .bind(&sidecar_path)
        .bind(&record.artist)
        .bind(&record.album)
        .bind(record.year.map(i64::from))
        .bind(&record.directory_code)
        .bind(&record.group_id)
        .bind(i64::from(record.track_count))
        .bind(record.total_bytes as i64)
        .bind(&record.checksum)
        .bind(&processed_at)
        .bind(record.status.as_str())
        .bind(&record.reviewer)
        .bind(&reviewed_at)
        .bind(&record.review_notes)
        .bind(&record.promotion_claim)
        .bind(&claimed_at)
        .execute(pool)
        .await?;

        Ok(())
    })
    .await
}

pub async fn load_record(pool: &SqlitePool, id: Uuid) -> Result<Option<StagingRecord>> {
    let row = sqlx::query(&format!("SELECT {} FROM staging_records WHERE id = ?", RECORD_COLUMNS))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(record_from_row).transpose()
}

/// Records matching the filter, oldest first
pub async fn list_records(pool: &SqlitePool, filter: &StagingFilter) -> Result<Vec<StagingRecord>> {
    let mut query: QueryBuilder<Sqlite> =
        QueryBuilder::new(format!("SELECT {} FROM staging_records WHERE 1 = 1", RECORD_COLUMNS));

    if let Some(status) = filter.status {
        query.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(session) = &filter.scan_session_id {
        query.push(" AND scan_session_id = ").push_bind(session.clone());
    }

    query.push(" ORDER BY processed_at, staging_path");
    // SQLite needs a LIMIT before OFFSET; -1 means unbounded
    query
        .push(" LIMIT ")
        .push_bind(filter.limit.map(i64::from).unwrap_or(-1))
        .push(" OFFSET ")
        .push_bind(i64::from(filter.offset));

    let rows = query.build().fetch_all(pool).await?;
    rows.iter().map(record_from_row).collect()
}

pub async fn record_stats(pool: &SqlitePool) -> Result<StagingStats> {
    let row = sqlx::query(
        r#"
        SELECT
            COUNT(*) AS total,
            COALESCE(SUM(status = 'pending_review'), 0) AS pending_review,
            COALESCE(SUM(status = 'approved'), 0) AS approved,
            COALESCE(SUM(status = 'rejected'), 0) AS rejected,
            COALESCE(SUM(promotion_claim IS NOT NULL), 0) AS claimed,
            COALESCE(SUM(track_count), 0) AS total_tracks,
            COALESCE(SUM(total_bytes), 0) AS total_bytes
        FROM staging_records
        "#,
    )
    .fetch_one(pool)
    .await?;

    let count = |column: &str| row.get::<i64, _>(column) as u64;

    Ok(StagingStats {
        total: count("total"),
        pending_review: count("pending_review"),
        approved: count("approved"),
        rejected: count("rejected"),
        claimed: count("claimed"),
        total_tracks: count("total_tracks"),
        total_bytes: count("total_bytes"),
    })
}

/// Move a record from `from` to `to` if it is in `from` and not claimed
///
/// Returns false when the record was not in the expected state.
pub async fn transition(
    pool: &SqlitePool,
    id: Uuid,
    from: ReviewStatus,
    to: ReviewStatus,
    reviewer: Option<&str>,
    notes: Option<&str>,
    max_wait_ms: u64,
) -> Result<bool> {
    let id = id.to_string();
    let reviewed_at = to_db_timestamp(&Utc::now());

    retry_on_lock("staging_transition", max_wait_ms, || async {
        let result = sqlx::query(
            r#"
            UPDATE staging_records
            SET status = ?, reviewer = ?, reviewed_at = ?, review_notes = ?
            WHERE id = ? AND status = ? AND promotion_claim IS NULL
            "#,
        )
        .bind(to.as_str())
        .bind(reviewer)
        .bind(&reviewed_at)
        .bind(notes)
        .bind(&id)
        .bind(from.as_str())
        .execute(pool)
        .await?;

        Ok(result.rows_affected() == 1)
    })
    .await
}

/// Claim an approved, unclaimed record for promotion
pub async fn claim(pool: &SqlitePool, id: Uuid, token: &str) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE staging_records
        SET promotion_claim = ?, claimed_at = ?
        WHERE id = ? AND status = 'approved' AND promotion_claim IS NULL
        "#,
    )
    .bind(token)
    .bind(to_db_timestamp(&Utc::now()))
    .bind(id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Release a claim held under `token`
pub async fn release_claim(pool: &SqlitePool, id: Uuid, token: &str) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE staging_records
        SET promotion_claim = NULL, claimed_at = NULL
        WHERE id = ? AND promotion_claim = ?
        "#,
    )
    .bind(id.to_string())
    .bind(token)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Clear claims taken before `cutoff`; returns how many were cleared
pub async fn release_stale_claims(pool: &SqlitePool, cutoff: DateTime<Utc>) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE staging_records
        SET promotion_claim = NULL, claimed_at = NULL
        WHERE promotion_claim IS NOT NULL AND claimed_at < ?
        "#,
    )
    .bind(to_db_timestamp(&cutoff))
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Delete a record inside the promotion transaction, only while `token` holds the claim
pub async fn delete_claimed(conn: &mut SqliteConnection, id: Uuid, token: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM staging_records WHERE id = ? AND promotion_claim = ?")
        .bind(id.to_string())
        .bind(token)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected() == 1)
}

/// Delete an unclaimed record that is in `status`
pub async fn delete_unclaimed(pool: &SqlitePool, id: Uuid, status: ReviewStatus) -> Result<bool> {
    let result = sqlx::query(
        "DELETE FROM staging_records WHERE id = ? AND status = ? AND promotion_claim IS NULL",
    )
    .bind(id.to_string())
    .bind(status.as_str())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

pub async fn staging_path_exists(pool: &SqlitePool, staging_path: &Path) -> Result<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM staging_records WHERE staging_path = ?")
        .bind(staging_path.to_string_lossy().as_ref())
        .fetch_optional(pool)
        .await?;
    Ok(found.is_some())
}

fn record_from_row(row: &SqliteRow) -> Result<StagingRecord> {
    let id: String = row.get("id");
    let status: String = row.get("status");
    let staging_path: String = row.get("staging_path");
    let sidecar_path: String = row.get("sidecar_path");
    let processed_at: String = row.get("processed_at");

    Ok(StagingRecord {
        id: Uuid::parse_str(&id)
            .map_err(|e| Error::Internal(format!("Invalid staging record id '{}': {}", id, e)))?,
        scan_session_id: row.get("scan_session_id"),
        staging_path: PathBuf::from(staging_path),
        sidecar_path: PathBuf::from(sidecar_path),
        artist: row.get("artist"),
        album: row.get("album"),
        year: row.get::<Option<i64>, _>("year").map(|y| y as u32),
        directory_code: row.get("directory_code"),
        group_id: row.get("group_id"),
        track_count: row.get::<i64, _>("track_count") as u32,
        total_bytes: row.get::<i64, _>("total_bytes") as u64,
        checksum: row.get("checksum"),
        processed_at: parse_db_timestamp(&processed_at)?,
        status: ReviewStatus::parse(&status)
            .ok_or_else(|| Error::Internal(format!("Unknown review status '{}'", status)))?,
        reviewer: row.get("reviewer"),
        reviewed_at: parse_opt_timestamp(row.get("reviewed_at"))?,
        review_notes: row.get("review_notes"),
        promotion_claim: row.get("promotion_claim"),
        claimed_at: parse_opt_timestamp(row.get("claimed_at"))?,
    })
}
