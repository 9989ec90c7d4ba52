//! Durable store schema
//!
//! Tables are created with `CREATE TABLE IF NOT EXISTS` at startup; opening an
//! existing store is a no-op.

use album_common::Result;
use sqlx::SqlitePool;

pub async fn init_store(pool: &SqlitePool) -> Result<()> {
    // Artist -> directory code; both sides unique for allocate-or-fetch
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS directory_codes (
            artist_key TEXT PRIMARY KEY,
            code TEXT NOT NULL UNIQUE,
            artist_name TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS staging_records (
            id TEXT PRIMARY KEY,
            scan_session_id TEXT NOT NULL,
            staging_path TEXT NOT NULL UNIQUE,
            sidecar_path TEXT NOT NULL,
            artist TEXT NOT NULL,
            album TEXT NOT NULL,
            year INTEGER,
            directory_code TEXT NOT NULL,
            group_id TEXT NOT NULL,
            track_count INTEGER NOT NULL,
            total_bytes INTEGER NOT NULL,
            checksum TEXT NOT NULL,
            processed_at TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending_review'
                CHECK (status IN ('pending_review', 'approved', 'rejected')),
            reviewer TEXT,
            reviewed_at TEXT,
            review_notes TEXT,
            promotion_claim TEXT,
            claimed_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_staging_records_status ON staging_records(status)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS artists (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            normalized_name TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS albums (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            artist_id INTEGER NOT NULL REFERENCES artists(id),
            title TEXT NOT NULL,
            year INTEGER,
            directory_code TEXT NOT NULL,
            production_path TEXT NOT NULL UNIQUE,
            checksum TEXT NOT NULL,
            track_count INTEGER NOT NULL,
            total_bytes INTEGER NOT NULL,
            scan_session_id TEXT NOT NULL,
            promoted_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tracks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            album_id INTEGER NOT NULL REFERENCES albums(id) ON DELETE CASCADE,
            title TEXT,
            track_number INTEGER,
            track_total INTEGER,
            disc_number INTEGER,
            disc_total INTEGER,
            duration_secs REAL,
            checksum TEXT NOT NULL,
            bitrate_kbps INTEGER,
            sample_rate INTEGER,
            size_bytes INTEGER NOT NULL,
            path TEXT NOT NULL UNIQUE,
            source_path TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tracks_album ON tracks(album_id)")
        .execute(pool)
        .await?;

    tracing::debug!("Durable store tables initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use album_common::db::{open_pool, PoolSettings};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_init_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let pool = open_pool(&temp_dir.path().join("store.db"), &PoolSettings::default())
            .await
            .unwrap();

        init_store(&pool).await.unwrap();
        init_store(&pool).await.unwrap();

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();

        assert_eq!(
            tables,
            vec!["albums", "artists", "directory_codes", "staging_records", "tracks"]
        );
    }
}
