//! Database access
//!
//! Two SQLite databases are involved:
//! - the ephemeral scan catalog ([`catalog::ScanCatalog`]), one file per scan
//! - the durable store: directory codes, staging records and the production
//!   catalog (artists, albums, tracks)

pub mod albums;
pub mod artists;
pub mod catalog;
pub mod directory_codes;
pub mod schema;
pub mod staging_records;
pub mod tracks;

use album_common::db::{open_pool, PoolSettings};
use album_common::{Error, Result, StoreSettings};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;

pub use catalog::{ScanCatalog, ScanSession};

/// Open the durable store and make sure its tables exist
pub async fn open_store(db_path: &Path, settings: &StoreSettings) -> Result<SqlitePool> {
    let pool_settings = PoolSettings {
        busy_timeout: Duration::from_millis(settings.busy_timeout_ms),
        ..PoolSettings::default()
    };

    let pool = open_pool(db_path, &pool_settings).await?;
    schema::init_store(&pool).await?;
    Ok(pool)
}

/// Fixed-width UTC timestamp, so stored values compare correctly as text
pub(crate) fn to_db_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_db_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse timestamp '{}': {}", value, e)))
}

pub(crate) fn parse_opt_timestamp(value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    value.as_deref().map(parse_db_timestamp).transpose()
}
