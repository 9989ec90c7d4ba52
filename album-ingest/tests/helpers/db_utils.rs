//! Test environments and store inspection
//!
//! A [`TestEnv`] lays out source, staging, production and catalog directories
//! plus a durable store path inside one temp dir.

use album_common::PipelineConfig;
use album_ingest::db::open_store;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use walkdir::WalkDir;

pub struct TestEnv {
    // kept alive for the duration of the test
    _dir: TempDir,
    pub source: PathBuf,
    pub staging: PathBuf,
    pub production: PathBuf,
    pub catalogs: PathBuf,
    pub database: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path().to_path_buf();
        let source = root.join("source");
        std::fs::create_dir_all(&source).unwrap();

        Self {
            source,
            staging: root.join("staging"),
            production: root.join("production"),
            catalogs: root.join("catalogs"),
            database: root.join("store.db"),
            _dir: dir,
        }
    }

    /// Configuration pointing every root at this environment
    pub fn config(&self) -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.scan.workers = 2;
        config.scan.batch_size = 4;
        config.scan.catalog_dir = Some(self.catalogs.clone());
        config.process.workers = 2;
        config.process.staging_root = Some(self.staging.clone());
        config.process.production_root = Some(self.production.clone());
        config.store.database = Some(self.database.clone());
        config
    }

    pub async fn store(&self) -> SqlitePool {
        open_store(&self.database, &self.config().store).await.unwrap()
    }
}

/// Relative paths of every file below `root` (empty when `root` is missing)
pub fn snapshot_tree(root: &Path) -> BTreeSet<PathBuf> {
    if !root.exists() {
        return BTreeSet::new();
    }
    WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().strip_prefix(root).unwrap().to_path_buf())
        .collect()
}

/// Check if `table` has `column`
pub async fn has_column(pool: &SqlitePool, table: &str, column: &str) -> bool {
    let rows = sqlx::query(&format!("PRAGMA table_info({})", table))
        .fetch_all(pool)
        .await
        .unwrap();
    rows.iter().any(|r| r.get::<String, _>("name") == column)
}
