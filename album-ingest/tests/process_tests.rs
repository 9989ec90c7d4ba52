//! Processing grouped catalogs into the staging tree

mod helpers;

use album_common::Error;
use album_ingest::db::{staging_records, ScanCatalog};
use album_ingest::models::{AlbumOutcome, AlbumSidecar, ReviewStatus, StagingFilter, SIDECAR_FILE_NAME};
use album_ingest::services::{DirectoryCodeAllocator, ProcessOptions, Processor};
use album_ingest::utils::relocation::RenameOp;
use album_ingest::utils::{sha256_bytes, sha256_file, Relocator};
use album_ingest::workflow::{run_process, run_scan};
use helpers::{build_library, snapshot_tree, write_tagged_track, TestEnv, TrackTags, LZ_ALBUM, LZ_ARTIST, PF_ALBUM};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

async fn scan(env: &TestEnv) -> PathBuf {
    let (catalog, _) = run_scan(&env.config(), &env.source, &env.catalogs, &CancellationToken::new())
        .await
        .unwrap();
    let path = catalog.path().to_path_buf();
    catalog.close().await;
    path
}

fn options(env: &TestEnv, workers: usize, rate_limit: u32) -> ProcessOptions {
    ProcessOptions {
        staging_root: env.staging.clone(),
        workers,
        rate_limit,
        dry_run: false,
        max_lock_wait_ms: 1000,
    }
}

fn file_name_is(path: &Path, name: &str) -> bool {
    path.file_name().and_then(|n| n.to_str()) == Some(name)
}

fn lz_staging_dir(env: &TestEnv) -> PathBuf {
    env.staging.join("LED").join(LZ_ARTIST).join(format!("1971 - {}", LZ_ALBUM))
}

#[tokio::test]
async fn test_dry_run_changes_nothing() {
    let env = TestEnv::new();
    build_library(&env.source);
    let catalog_path = scan(&env).await;
    let source_before = snapshot_tree(&env.source);

    let summary = run_process(&env.config(), &catalog_path, true, &CancellationToken::new())
        .await
        .unwrap();

    assert!(summary.dry_run);
    assert_eq!(summary.albums_total, 3);
    assert_eq!(summary.albums_processed, 2);
    assert_eq!(summary.albums_skipped_invalid, 1);
    assert_eq!(summary.tracks_moved, 5);

    let planned: Vec<_> = summary
        .results
        .iter()
        .filter(|r| r.outcome == AlbumOutcome::Planned)
        .collect();
    assert_eq!(planned.len(), 2);
    assert!(planned
        .iter()
        .any(|r| r.destination.as_deref() == Some(lz_staging_dir(&env).as_path())));

    assert_eq!(snapshot_tree(&env.source), source_before);
    assert!(!env.staging.exists());
    assert!(!env.production.exists());
    assert!(!env.database.exists(), "dry run must not create the store");
}

#[tokio::test]
async fn test_process_stages_albums_with_sidecars() {
    let env = TestEnv::new();
    let library = build_library(&env.source);
    let catalog_path = scan(&env).await;
    let lz_checksums: Vec<String> = library
        .led_zeppelin
        .iter()
        .map(|p| sha256_file(p).unwrap())
        .collect();

    let summary = run_process(&env.config(), &catalog_path, false, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.albums_processed, 2);
    assert_eq!(summary.albums_failed, 0);
    assert_eq!(summary.albums_skipped_invalid, 1);
    assert_eq!(summary.tracks_moved, 5);

    let album_dir = lz_staging_dir(&env);
    for (source, checksum) in library.led_zeppelin.iter().zip(&lz_checksums) {
        assert!(!source.exists(), "{} should have moved", source.display());
        let staged = album_dir.join(source.file_name().unwrap());
        assert_eq!(&sha256_file(&staged).unwrap(), checksum);
    }
    assert!(library.broken.exists(), "invalid albums are left in place");

    let pf_dir = env.staging.join("PIN").join("Pink Floyd").join("1973 - Dark Side");
    assert!(pf_dir.join("01 - Speak.wav").exists());

    let sidecar_bytes = std::fs::read(album_dir.join(SIDECAR_FILE_NAME)).unwrap();
    let sidecar = AlbumSidecar::from_json(&sidecar_bytes).unwrap();
    assert_eq!(sidecar.artist, LZ_ARTIST);
    assert_eq!(sidecar.album, LZ_ALBUM);
    assert_eq!(sidecar.year, Some(1971));
    assert_eq!(sidecar.directory_code, "LED");
    assert_eq!(sidecar.tracks.len(), 3);
    assert_eq!(sidecar.tracks[0].title.as_deref(), Some("Black Dog"));
    assert_eq!(sidecar.tracks[2].track_number, Some(3));
    assert_eq!(sidecar.tracks[0].checksum, lz_checksums[0]);

    let store = env.store().await;
    let records = staging_records::list_records(&store, &StagingFilter::default())
        .await
        .unwrap();
    assert_eq!(records.len(), 2);

    let lz_record = records.iter().find(|r| r.album == LZ_ALBUM).unwrap();
    assert_eq!(lz_record.status, ReviewStatus::PendingReview);
    assert_eq!(lz_record.staging_path, album_dir);
    assert_eq!(lz_record.track_count, 3);
    assert_eq!(lz_record.checksum, sha256_bytes(&sidecar_bytes));
    assert!(records.iter().all(|r| r.scan_session_id == summary.session_id));
}

#[tokio::test]
async fn test_process_requires_grouped_catalog() {
    let env = TestEnv::new();
    build_library(&env.source);

    let cancel = CancellationToken::new();
    let catalog = ScanCatalog::create(&env.catalogs, &env.source).await.unwrap();
    let path = catalog.path().to_path_buf();
    album_ingest::services::ContentScanner::new(2, 4, env.config().validation)
        .scan(&env.source, &catalog, &cancel)
        .await
        .unwrap();
    catalog.close().await;

    let result = run_process(&env.config(), &path, false, &cancel).await;
    assert!(matches!(result, Err(Error::Precondition(_))));
    assert!(!env.staging.exists());
}

#[tokio::test]
async fn test_missing_catalog_is_fatal() {
    let env = TestEnv::new();
    let result = run_process(
        &env.config(),
        &env.catalogs.join("scan-missing.db"),
        false,
        &CancellationToken::new(),
    )
    .await;

    assert!(matches!(result, Err(Error::NotFound(_))));
}

struct CrossDevice;

impl RenameOp for CrossDevice {
    fn rename(&self, _from: &Path, _to: &Path) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::Other, "Invalid cross-device link"))
    }
}

#[tokio::test]
async fn test_cross_device_moves_fall_back_to_verified_copy() {
    let env = TestEnv::new();
    let library = build_library(&env.source);
    let catalog_path = scan(&env).await;

    let catalog = ScanCatalog::open(&catalog_path).await.unwrap();
    let store = env.store().await;
    let options = ProcessOptions {
        staging_root: env.staging.clone(),
        workers: 2,
        rate_limit: 0,
        dry_run: false,
        max_lock_wait_ms: 1000,
    };

    let summary = Processor::new(options, Some(store))
        .with_relocator(Relocator::with_rename_op(Box::new(CrossDevice)))
        .run(&catalog, &CancellationToken::new())
        .await
        .unwrap();
    catalog.close().await;

    assert_eq!(summary.albums_processed, 2);
    for source in &library.led_zeppelin {
        assert!(!source.exists());
        assert!(lz_staging_dir(&env).join(source.file_name().unwrap()).exists());
    }
    // no partial files left behind
    assert!(snapshot_tree(&env.staging)
        .iter()
        .all(|p| !p.to_string_lossy().contains(".partial")));
}

#[tokio::test]
async fn test_directory_codes_stable_across_runs() {
    let env = TestEnv::new();
    build_library(&env.source);
    let catalog_path = scan(&env).await;
    run_process(&env.config(), &catalog_path, false, &CancellationToken::new())
        .await
        .unwrap();

    // a second library with a colliding artist and the same artist again
    write_tagged_track(
        &env.source.join("Led Astray").join("First").join("01 - Intro.wav"),
        &TrackTags::new("Led Astray", "First", "Intro").year(2001).track(1),
        600.0,
    )
    .unwrap();
    write_tagged_track(
        &env.source.join("Led Zeppelin").join("Coda").join("01 - Were Ready.wav"),
        &TrackTags::new(LZ_ARTIST, "Coda", "We're Gonna Groove").year(1982).track(1),
        650.0,
    )
    .unwrap();

    let second_catalog = scan(&env).await;
    run_process(&env.config(), &second_catalog, false, &CancellationToken::new())
        .await
        .unwrap();

    assert!(env.staging.join("LED").join(LZ_ARTIST).join("1982 - Coda").exists());
    assert!(env.staging.join("LED-2").join("Led Astray").join("2001 - First").exists());

    // a fresh allocator over the same store agrees
    let store = env.store().await;
    let allocator = DirectoryCodeAllocator::new(store);
    assert_eq!(allocator.allocate("Led Astray").await.unwrap(), "LED-2");
    assert_eq!(allocator.allocate("led zeppelin").await.unwrap(), "LED");
}

/// Reports the named file as vanished, so its album fails mid-way
struct VanishOnRename {
    file_name: &'static str,
}

impl RenameOp for VanishOnRename {
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        if file_name_is(from, self.file_name) {
            return Err(io::Error::new(io::ErrorKind::NotFound, "file vanished"));
        }
        std::fs::rename(from, to)
    }
}

/// Fires the run's cancellation token right after moving the named file
struct CancelAfterRename {
    file_name: &'static str,
    cancel: CancellationToken,
}

impl RenameOp for CancelAfterRename {
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        std::fs::rename(from, to)?;
        if file_name_is(from, self.file_name) {
            self.cancel.cancel();
        }
        Ok(())
    }
}

/// Records when each move happens
struct TimedRename {
    moves: Arc<Mutex<Vec<Instant>>>,
}

impl RenameOp for TimedRename {
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        self.moves.lock().unwrap().push(Instant::now());
        std::fs::rename(from, to)
    }
}

#[tokio::test]
async fn test_failed_album_is_restored_and_run_continues() {
    let env = TestEnv::new();
    let library = build_library(&env.source);
    let lz_checksums: Vec<String> = library.led_zeppelin.iter().map(|p| sha256_file(p).unwrap()).collect();
    let catalog_path = scan(&env).await;

    let catalog = ScanCatalog::open(&catalog_path).await.unwrap();
    let store = env.store().await;
    let summary = Processor::new(options(&env, 2, 0), Some(store.clone()))
        .with_relocator(Relocator::with_rename_op(Box::new(VanishOnRename {
            file_name: "02 - Rock and Roll.wav",
        })))
        .run(&catalog, &CancellationToken::new())
        .await
        .unwrap();
    catalog.close().await;

    assert_eq!(summary.albums_failed, 1);
    assert_eq!(summary.albums_processed, 1);

    let lz = summary.results.iter().find(|r| r.album == LZ_ALBUM).unwrap();
    assert_eq!(lz.outcome, AlbumOutcome::Failed);
    assert!(lz.error.is_some());
    for (source, checksum) in library.led_zeppelin.iter().zip(&lz_checksums) {
        assert_eq!(&sha256_file(source).unwrap(), checksum, "{} restored", source.display());
    }
    assert!(!lz_staging_dir(&env).exists());
    assert!(!env.staging.join("LED").exists());

    let pf = summary.results.iter().find(|r| r.album == PF_ALBUM).unwrap();
    assert_eq!(pf.outcome, AlbumOutcome::Staged);
    assert!(library.pink_floyd.iter().all(|p| !p.exists()));

    let records = staging_records::list_records(&store, &StagingFilter::default()).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].album, PF_ALBUM);
}

#[tokio::test]
async fn test_cancel_between_files_restores_album() {
    let env = TestEnv::new();
    let library = build_library(&env.source);
    let catalog_path = scan(&env).await;

    let cancel = CancellationToken::new();
    let catalog = ScanCatalog::open(&catalog_path).await.unwrap();
    let store = env.store().await;
    let summary = Processor::new(options(&env, 1, 0), Some(store.clone()))
        .with_relocator(Relocator::with_rename_op(Box::new(CancelAfterRename {
            file_name: "01 - Black Dog.wav",
            cancel: cancel.clone(),
        })))
        .run(&catalog, &cancel)
        .await
        .unwrap();
    catalog.close().await;

    let lz = summary.results.iter().find(|r| r.album == LZ_ALBUM).unwrap();
    assert_eq!(lz.outcome, AlbumOutcome::Cancelled);
    assert!(library.led_zeppelin.iter().all(|p| p.exists()), "moved tracks are put back");
    assert!(!lz_staging_dir(&env).exists());
    assert!(summary.albums_cancelled >= 1);

    // whichever album ran first, nothing is left half-staged
    let pf = summary.results.iter().find(|r| r.album == PF_ALBUM).unwrap();
    match pf.outcome {
        AlbumOutcome::Staged => assert!(library.pink_floyd.iter().all(|p| !p.exists())),
        AlbumOutcome::Cancelled => assert!(library.pink_floyd.iter().all(|p| p.exists())),
        other => panic!("unexpected outcome {:?}", other),
    }

    let records = staging_records::list_records(&store, &StagingFilter::default()).await.unwrap();
    assert!(records.iter().all(|r| r.album != LZ_ALBUM));
}

#[tokio::test]
async fn test_rate_limit_spaces_moves_across_workers() {
    let env = TestEnv::new();
    build_library(&env.source);
    let catalog_path = scan(&env).await;

    let moves = Arc::new(Mutex::new(Vec::new()));
    let catalog = ScanCatalog::open(&catalog_path).await.unwrap();
    let summary = Processor::new(options(&env, 2, 2), None)
        .with_relocator(Relocator::with_rename_op(Box::new(TimedRename {
            moves: Arc::clone(&moves),
        })))
        .run(&catalog, &CancellationToken::new())
        .await
        .unwrap();
    catalog.close().await;

    assert_eq!(summary.albums_processed, 2);
    let moves = moves.lock().unwrap().clone();
    assert_eq!(moves.len(), 5);

    // at most two moves in any one-second window
    for window in moves.windows(3) {
        let spread = window[2].duration_since(window[0]);
        assert!(spread >= Duration::from_millis(900), "three moves within {:?}", spread);
    }
}

#[tokio::test]
async fn test_foreign_sidecar_blocks_album_and_survives() {
    let env = TestEnv::new();
    let library = build_library(&env.source);
    let catalog_path = scan(&env).await;

    // another album already owns the folder Led Zeppelin IV would use
    let album_dir = lz_staging_dir(&env);
    std::fs::create_dir_all(&album_dir).unwrap();
    let foreign = album_dir.join(SIDECAR_FILE_NAME);
    std::fs::write(&foreign, b"{\"group_id\": \"someone-else\"}").unwrap();

    let mut config = env.config();
    config.store.database = None;
    let summary = run_process(&config, &catalog_path, false, &CancellationToken::new())
        .await
        .unwrap();

    let lz = summary.results.iter().find(|r| r.album == LZ_ALBUM).unwrap();
    assert_eq!(lz.outcome, AlbumOutcome::Failed);
    assert!(library.led_zeppelin.iter().all(|p| p.exists()));
    assert_eq!(std::fs::read(&foreign).unwrap(), b"{\"group_id\": \"someone-else\"}");
    assert_eq!(snapshot_tree(&album_dir).len(), 1);

    let pf = summary.results.iter().find(|r| r.album == PF_ALBUM).unwrap();
    assert_eq!(pf.outcome, AlbumOutcome::Staged);
}
