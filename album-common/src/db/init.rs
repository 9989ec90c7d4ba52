//! Database initialization
//!
//! Both stores are plain SQLite files. Connection pragmas are applied through
//! the connect options so every pooled connection gets them, not only the first.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Pool sizing and lock behaviour
#[derive(Debug, Clone)]
pub struct PoolSettings {
    /// Maximum pooled connections
    pub max_connections: u32,
    /// How long SQLite waits on a locked database before returning SQLITE_BUSY
    pub busy_timeout: Duration,
    /// Create the file when missing
    pub create_if_missing: bool,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 8,
            busy_timeout: Duration::from_millis(5000),
            create_if_missing: true,
        }
    }
}

/// Open (and optionally create) a SQLite database in WAL mode with foreign keys on
pub async fn open_pool(db_path: &Path, settings: &PoolSettings) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if settings.create_if_missing {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(settings.create_if_missing)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(settings.busy_timeout);

    let pool = SqlitePoolOptions::new()
        .max_connections(settings.max_connections)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    Ok(pool)
}
