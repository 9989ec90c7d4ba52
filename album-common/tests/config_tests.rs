//! Configuration loading tests
//!
//! Uses serial_test because these tests manipulate process environment
//! variables that `PipelineConfig::load` reads.

use album_common::config::{PipelineConfig, ENV_PREFIX};
use album_common::Error;
use serial_test::serial;
use std::env;
use std::path::PathBuf;
use tempfile::TempDir;

fn clear_env() {
    for name in [
        "SCAN_WORKERS",
        "BATCH_SIZE",
        "CATALOG_DIR",
        "PROCESS_WORKERS",
        "RATE_LIMIT",
        "STAGING_ROOT",
        "PRODUCTION_ROOT",
        "MAX_YEAR_CLUSTERS",
        "MIN_CLUSTER_SIZE",
        "DATABASE",
        "LOG_LEVEL",
    ] {
        env::remove_var(format!("{}{}", ENV_PREFIX, name));
    }
}

#[test]
#[serial]
fn test_explicit_file_then_env_priority() {
    clear_env();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("ingest.toml");
    std::fs::write(
        &path,
        r#"
        [process]
        rate_limit = 10
        staging_root = "/srv/staging"

        [store]
        database = "/srv/store.db"
        "#,
    )
    .unwrap();

    env::set_var("ALBUM_INGEST_RATE_LIMIT", "3");
    let config = PipelineConfig::load(Some(&path)).unwrap();
    clear_env();

    assert_eq!(config.process.rate_limit, 3);
    assert_eq!(config.process.staging_root, Some(PathBuf::from("/srv/staging")));
    assert_eq!(config.store.database, Some(PathBuf::from("/srv/store.db")));
}

#[test]
#[serial]
fn test_missing_explicit_file_is_error() {
    clear_env();
    let result = PipelineConfig::load(Some(std::path::Path::new("/nonexistent/ingest.toml")));
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
#[serial]
fn test_env_validation_runs_after_overrides() {
    clear_env();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("ingest.toml");
    std::fs::write(&path, "").unwrap();

    env::set_var("ALBUM_INGEST_PROCESS_WORKERS", "0");
    let result = PipelineConfig::load(Some(&path));
    clear_env();

    assert!(result.is_err(), "zero workers must be rejected");
}
