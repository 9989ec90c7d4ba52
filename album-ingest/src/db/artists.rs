//! Production catalog artists

use super::to_db_timestamp;
use album_common::{normalize_key, Result};
use chrono::Utc;
use sqlx::{Row, SqliteConnection};

#[derive(Debug, Clone, PartialEq)]
pub struct Artist {
    pub id: i64,
    pub name: String,
    pub normalized_name: String,
}

/// Find an artist by normalized name, creating it when missing
///
/// Runs on the caller's connection so it takes part in the promotion transaction.
pub async fn find_or_create(conn: &mut SqliteConnection, name: &str) -> Result<Artist> {
    let normalized_name = normalize_key(name);

    sqlx::query(
        r#"
        INSERT INTO artists (name, normalized_name, created_at)
        VALUES (?, ?, ?)
        ON CONFLICT(normalized_name) DO NOTHING
        "#,
    )
    .bind(name)
    .bind(&normalized_name)
    .bind(to_db_timestamp(&Utc::now()))
    .execute(&mut *conn)
    .await?;

    let row = sqlx::query("SELECT id, name, normalized_name FROM artists WHERE normalized_name = ?")
        .bind(&normalized_name)
        .fetch_one(&mut *conn)
        .await?;

    Ok(Artist {
        id: row.get("id"),
        name: row.get("name"),
        normalized_name: row.get("normalized_name"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use album_common::db::{open_pool, PoolSettings};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_find_or_create_matches_normalized_name() {
        let temp_dir = TempDir::new().unwrap();
        let pool = open_pool(&temp_dir.path().join("store.db"), &PoolSettings::default())
            .await
            .unwrap();
        crate::db::schema::init_store(&pool).await.unwrap();

        let mut conn = pool.acquire().await.unwrap();
        let first = find_or_create(&mut conn, "Björk").await.unwrap();
        let second = find_or_create(&mut conn, "bjork").await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.name, "Björk");
        assert_eq!(second.normalized_name, "bjork");
    }
}
