//! Production catalog albums

use super::{parse_db_timestamp, to_db_timestamp};
use album_common::Result;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq)]
pub struct Album {
    pub id: i64,
    pub artist_id: i64,
    pub title: String,
    pub year: Option<u32>,
    pub directory_code: String,
    pub production_path: PathBuf,
    /// Sidecar checksum carried over from staging
    pub checksum: String,
    pub track_count: u32,
    pub total_bytes: u64,
    pub scan_session_id: String,
    pub promoted_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAlbum<'a> {
    pub artist_id: i64,
    pub title: &'a str,
    pub year: Option<u32>,
    pub directory_code: &'a str,
    pub production_path: &'a Path,
    pub checksum: &'a str,
    pub track_count: u32,
    pub total_bytes: u64,
    pub scan_session_id: &'a str,
}

pub async fn insert_album(conn: &mut SqliteConnection, album: &NewAlbum<'_>) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO albums (
            artist_id, title, year, directory_code, production_path, checksum,
            track_count, total_bytes, scan_session_id, promoted_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(album.artist_id)
    .bind(album.title)
    .bind(album.year.map(i64::from))
    .bind(album.directory_code)
    .bind(album.production_path.to_string_lossy().as_ref())
    .bind(album.checksum)
    .bind(i64::from(album.track_count))
    .bind(album.total_bytes as i64)
    .bind(album.scan_session_id)
    .bind(to_db_timestamp(&Utc::now()))
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn load_album(pool: &SqlitePool, id: i64) -> Result<Option<Album>> {
    let row = sqlx::query(
        r#"
        SELECT id, artist_id, title, year, directory_code, production_path, checksum,
               track_count, total_bytes, scan_session_id, promoted_at
        FROM albums
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(album_from_row).transpose()
}

pub async fn count_albums(pool: &SqlitePool) -> Result<u64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM albums")
        .fetch_one(pool)
        .await?;
    Ok(count as u64)
}

fn album_from_row(row: &SqliteRow) -> Result<Album> {
    let production_path: String = row.get("production_path");
    let promoted_at: String = row.get("promoted_at");

    Ok(Album {
        id: row.get("id"),
        artist_id: row.get("artist_id"),
        title: row.get("title"),
        year: row.get::<Option<i64>, _>("year").map(|y| y as u32),
        directory_code: row.get("directory_code"),
        production_path: PathBuf::from(production_path),
        checksum: row.get("checksum"),
        track_count: row.get::<i64, _>("track_count") as u32,
        total_bytes: row.get::<i64, _>("total_bytes") as u64,
        scan_session_id: row.get("scan_session_id"),
        promoted_at: parse_db_timestamp(&promoted_at)?,
    })
}
