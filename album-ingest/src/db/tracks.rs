//! Production catalog tracks

use crate::models::SidecarTrack;
use album_common::Result;
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub id: i64,
    pub album_id: i64,
    pub title: Option<String>,
    pub track_number: Option<u32>,
    pub disc_number: Option<u32>,
    pub duration_secs: Option<f64>,
    pub checksum: String,
    pub size_bytes: u64,
    pub path: PathBuf,
}

/// Insert a track described by its sidecar entry, stored at `path`
pub async fn insert_track(
    conn: &mut SqliteConnection,
    album_id: i64,
    track: &SidecarTrack,
    path: &Path,
) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO tracks (
            album_id, title, track_number, track_total, disc_number, disc_total,
            duration_secs, checksum, bitrate_kbps, sample_rate, size_bytes, path, source_path
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(album_id)
    .bind(&track.title)
    .bind(track.track_number.map(i64::from))
    .bind(track.track_total.map(i64::from))
    .bind(track.disc_number.map(i64::from))
    .bind(track.disc_total.map(i64::from))
    .bind(track.duration_secs)
    .bind(&track.checksum)
    .bind(track.bitrate_kbps.map(i64::from))
    .bind(track.sample_rate.map(i64::from))
    .bind(track.size_bytes as i64)
    .bind(path.to_string_lossy().as_ref())
    .bind(&track.source_path)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Tracks of an album in disc/track order
pub async fn tracks_for_album(pool: &SqlitePool, album_id: i64) -> Result<Vec<Track>> {
    let rows = sqlx::query(
        r#"
        SELECT id, album_id, title, track_number, disc_number, duration_secs,
               checksum, size_bytes, path
        FROM tracks
        WHERE album_id = ?
        ORDER BY disc_number, track_number, path
        "#,
    )
    .bind(album_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| {
            let path: String = row.get("path");
            Track {
                id: row.get("id"),
                album_id: row.get("album_id"),
                title: row.get("title"),
                track_number: row.get::<Option<i64>, _>("track_number").map(|n| n as u32),
                disc_number: row.get::<Option<i64>, _>("disc_number").map(|n| n as u32),
                duration_secs: row.get("duration_secs"),
                checksum: row.get("checksum"),
                size_bytes: row.get::<i64, _>("size_bytes") as u64,
                path: PathBuf::from(path),
            }
        })
        .collect())
}

pub async fn count_tracks(pool: &SqlitePool) -> Result<u64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tracks")
        .fetch_one(pool)
        .await?;
    Ok(count as u64)
}
