//! Artist directory code mappings

use super::to_db_timestamp;
use album_common::Result;
use chrono::Utc;
use sqlx::SqlitePool;

/// Stored code for a normalized artist key
pub async fn find_code(pool: &SqlitePool, artist_key: &str) -> Result<Option<String>> {
    let code = sqlx::query_scalar("SELECT code FROM directory_codes WHERE artist_key = ?")
        .bind(artist_key)
        .fetch_optional(pool)
        .await?;
    Ok(code)
}

/// Insert a mapping unless either the artist or the code is already mapped
///
/// Returns true when this call created the row.
pub async fn try_insert(pool: &SqlitePool, artist_key: &str, code: &str, artist_name: &str) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO directory_codes (artist_key, code, artist_name, created_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(artist_key)
    .bind(code)
    .bind(artist_name)
    .bind(to_db_timestamp(&Utc::now()))
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Every stored code starting with `base` (the base itself and its suffixed variants)
pub async fn codes_with_base(pool: &SqlitePool, base: &str) -> Result<Vec<String>> {
    let codes = sqlx::query_scalar(
        "SELECT code FROM directory_codes WHERE code = ? OR code LIKE ? ORDER BY code",
    )
    .bind(base)
    .bind(format!("{}-%", base))
    .fetch_all(pool)
    .await?;
    Ok(codes)
}
