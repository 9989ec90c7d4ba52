//! Content scanner
//!
//! Walks a source tree, analyzes every eligible file on a bounded set of
//! blocking workers and streams the resulting rows to a single catalog
//! writer task that commits them in batches.

use super::file_scanner::{verify_magic_bytes, FileScanner};
use super::metadata::MetadataChain;
use crate::db::ScanCatalog;
use crate::models::{ScannedEntry, ValidationFailure};
use crate::utils::sha256_file;
use album_common::{Error, Result, ValidationSettings};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Validates and describes one file
pub struct FileAnalyzer {
    chain: MetadataChain,
    bounds: ValidationSettings,
}

impl FileAnalyzer {
    pub fn new(chain: MetadataChain, bounds: ValidationSettings) -> Self {
        Self { chain, bounds }
    }

    /// Build the catalog row for `path`
    ///
    /// Never fails: anything wrong with the file is recorded as the entry's
    /// validation failure. When several checks fail the first one wins, in
    /// the order I/O, empty, signature, container, duration, bitrate.
    pub fn analyze(&self, path: &Path) -> ScannedEntry {
        let mut entry = ScannedEntry::new(path.to_path_buf());

        let metadata = match std::fs::metadata(path) {
            Ok(m) => m,
            Err(e) => {
                entry.mark_invalid(ValidationFailure::IoError, e.to_string());
                return entry;
            }
        };
        entry.size_bytes = metadata.len();
        entry.modified_at = metadata.modified().ok().map(DateTime::<Utc>::from);

        match sha256_file(path) {
            Ok(checksum) => entry.checksum = Some(checksum),
            Err(e) => {
                entry.mark_invalid(ValidationFailure::IoError, e.to_string());
                return entry;
            }
        }

        if entry.size_bytes == 0 {
            entry.mark_invalid(ValidationFailure::EmptyFile, "file is empty");
        }

        match verify_magic_bytes(path) {
            Ok(true) => {}
            Ok(false) => entry.mark_invalid(
                ValidationFailure::UnsupportedType,
                "leading bytes match no known audio container",
            ),
            Err(e) => entry.mark_invalid(ValidationFailure::IoError, e.to_string()),
        }

        let extraction = self.chain.extract(path);
        entry.tags = extraction.tags.clone();
        entry.metadata_sources = extraction.sources.clone();

        match extraction.properties {
            Some(properties) => {
                self.check_bounds(&mut entry, properties.duration_secs, properties.bitrate_kbps);
                entry.properties = properties;
            }
            None => {
                let detail = extraction
                    .error_from("tags")
                    .unwrap_or("container could not be parsed")
                    .to_string();
                entry.mark_invalid(ValidationFailure::UnreadableContainer, detail);
            }
        }

        entry
    }

    fn check_bounds(&self, entry: &mut ScannedEntry, duration: Option<f64>, bitrate: Option<u32>) {
        let b = &self.bounds;

        match duration {
            Some(d) if d >= b.min_duration_secs && d <= b.max_duration_secs => {}
            Some(d) => entry.mark_invalid(
                ValidationFailure::DurationOutOfBounds,
                format!(
                    "duration {:.2}s outside {}..{}s",
                    d, b.min_duration_secs, b.max_duration_secs
                ),
            ),
            None => entry.mark_invalid(ValidationFailure::DurationOutOfBounds, "duration unknown"),
        }

        // containers that do not report a bitrate are accepted
        if let Some(kbps) = bitrate {
            if kbps < b.min_bitrate_kbps || kbps > b.max_bitrate_kbps {
                entry.mark_invalid(
                    ValidationFailure::BitrateOutOfBounds,
                    format!(
                        "bitrate {}kbps outside {}..{}kbps",
                        kbps, b.min_bitrate_kbps, b.max_bitrate_kbps
                    ),
                );
            }
        }
    }
}

/// Counts produced by one scan pass
#[derive(Debug, Clone, Default)]
pub struct ScanStats {
    pub files_seen: u64,
    pub eligible: u64,
    pub skipped: u64,
    pub valid: u64,
    pub invalid: u64,
    pub invalid_by_reason: BTreeMap<String, u64>,
    pub walk_errors: u64,
    pub cancelled: bool,
}

impl ScanStats {
    fn tally(&mut self, entry: &ScannedEntry) {
        if entry.is_valid {
            self.valid += 1;
        } else {
            self.invalid += 1;
            let reason = entry
                .failure
                .map(|f| f.as_str().to_string())
                .unwrap_or_else(|| "unknown".to_string());
            *self.invalid_by_reason.entry(reason).or_insert(0) += 1;
        }
    }
}

/// Concurrent scanner feeding a [`ScanCatalog`]
pub struct ContentScanner {
    workers: usize,
    batch_size: usize,
    bounds: ValidationSettings,
}

impl ContentScanner {
    pub fn new(workers: usize, batch_size: usize, bounds: ValidationSettings) -> Self {
        Self {
            workers: workers.max(1),
            batch_size: batch_size.max(1),
            bounds,
        }
    }

    /// Scan `root` into `catalog`
    ///
    /// A missing or unreadable root fails before any row is written. Once
    /// `cancel` fires, workers stop picking up new files; rows already
    /// analyzed are still committed.
    pub async fn scan(
        &self,
        root: &Path,
        catalog: &ScanCatalog,
        cancel: &CancellationToken,
    ) -> Result<ScanStats> {
        let walk_root = root.to_path_buf();
        let discovery = tokio::task::spawn_blocking(move || FileScanner::new().scan(&walk_root))
            .await
            .map_err(|e| Error::Internal(format!("Directory walk task failed: {}", e)))??;

        info!(
            root = %root.display(),
            eligible = discovery.eligible.len(),
            skipped = discovery.skipped,
            workers = self.workers,
            "Discovered audio files"
        );

        let mut stats = ScanStats {
            files_seen: discovery.files_seen(),
            eligible: discovery.eligible.len() as u64,
            skipped: discovery.skipped,
            walk_errors: discovery.errors.len() as u64,
            ..Default::default()
        };

        let (tx, rx) = mpsc::channel::<ScannedEntry>(self.batch_size * 2);
        let writer = tokio::spawn(write_entries(catalog.clone(), rx, self.batch_size));

        let analyzer = Arc::new(FileAnalyzer::new(
            MetadataChain::standard(root.to_path_buf()),
            self.bounds.clone(),
        ));

        let mut handles = Vec::with_capacity(self.workers);
        for (worker_id, files) in partition(discovery.eligible, self.workers).into_iter().enumerate() {
            let analyzer = Arc::clone(&analyzer);
            let tx = tx.clone();
            let cancel = cancel.clone();

            handles.push(tokio::task::spawn_blocking(move || {
                let mut analyzed = 0usize;
                for path in files {
                    if cancel.is_cancelled() {
                        debug!(worker_id, analyzed, "Scan worker stopping on cancellation");
                        break;
                    }
                    let entry = analyzer.analyze(&path);
                    if tx.blocking_send(entry).is_err() {
                        // writer gone; its error is reported below
                        break;
                    }
                    analyzed += 1;
                }
                analyzed
            }));
        }
        drop(tx);

        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Scan worker panicked");
            }
        }

        let written = writer
            .await
            .map_err(|e| Error::Internal(format!("Catalog writer task failed: {}", e)))??;

        stats.valid = written.valid;
        stats.invalid = written.invalid;
        stats.invalid_by_reason = written.invalid_by_reason;
        stats.cancelled = cancel.is_cancelled();

        info!(
            valid = stats.valid,
            invalid = stats.invalid,
            cancelled = stats.cancelled,
            "Scan pass complete"
        );

        Ok(stats)
    }
}

/// Split files across `workers` round-robin so each worker owns a fixed batch
fn partition(files: Vec<PathBuf>, workers: usize) -> Vec<Vec<PathBuf>> {
    let mut batches: Vec<Vec<PathBuf>> = (0..workers).map(|_| Vec::new()).collect();
    for (i, file) in files.into_iter().enumerate() {
        batches[i % workers].push(file);
    }
    batches.retain(|b| !b.is_empty());
    batches
}

/// Single catalog writer: group commits of `batch_size` rows
async fn write_entries(
    catalog: ScanCatalog,
    mut rx: mpsc::Receiver<ScannedEntry>,
    batch_size: usize,
) -> Result<ScanStats> {
    let mut stats = ScanStats::default();
    let mut batch = Vec::with_capacity(batch_size);

    while let Some(entry) = rx.recv().await {
        stats.tally(&entry);
        batch.push(entry);
        if batch.len() >= batch_size {
            catalog.insert_batch(&batch).await?;
            batch.clear();
        }
    }

    catalog.insert_batch(&batch).await?;
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partition_round_robin() {
        let files: Vec<PathBuf> = (0..5).map(|i| PathBuf::from(format!("{}.mp3", i))).collect();
        let batches = partition(files, 3);

        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0], vec![PathBuf::from("0.mp3"), PathBuf::from("3.mp3")]);
        assert_eq!(batches[2], vec![PathBuf::from("2.mp3")]);

        assert_eq!(partition(vec![PathBuf::from("a.mp3")], 8).len(), 1);
    }

    #[test]
    fn test_analyze_empty_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("Album/01 - Empty.mp3");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"").unwrap();

        let analyzer = FileAnalyzer::new(
            MetadataChain::standard(temp_dir.path()),
            ValidationSettings::default(),
        );
        let entry = analyzer.analyze(&path);

        assert!(!entry.is_valid);
        assert_eq!(entry.failure, Some(ValidationFailure::EmptyFile));
        assert_eq!(entry.tags.title.as_deref(), Some("Empty"));
        assert_eq!(entry.tags.album.as_deref(), Some("Album"));
    }

    #[test]
    fn test_analyze_wrong_signature() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("fake.flac");
        std::fs::write(&path, b"this is a text file, not audio").unwrap();

        let analyzer = FileAnalyzer::new(
            MetadataChain::standard(temp_dir.path()),
            ValidationSettings::default(),
        );
        let entry = analyzer.analyze(&path);

        assert_eq!(entry.failure, Some(ValidationFailure::UnsupportedType));
        assert!(entry.checksum.is_some());
        assert_eq!(entry.size_bytes, 30);
    }

    #[test]
    fn test_bounds() {
        let analyzer = FileAnalyzer::new(MetadataChain::new(Vec::new()), ValidationSettings::default());

        let mut short = ScannedEntry::new(PathBuf::from("a.mp3"));
        analyzer.check_bounds(&mut short, Some(0.2), Some(128));
        assert_eq!(short.failure, Some(ValidationFailure::DurationOutOfBounds));

        let mut thin = ScannedEntry::new(PathBuf::from("a.mp3"));
        analyzer.check_bounds(&mut thin, Some(200.0), Some(8));
        assert_eq!(thin.failure, Some(ValidationFailure::BitrateOutOfBounds));

        let mut fine = ScannedEntry::new(PathBuf::from("a.mp3"));
        analyzer.check_bounds(&mut fine, Some(200.0), None);
        assert!(fine.is_valid);
    }
}
