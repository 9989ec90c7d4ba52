//! File relocation with cross-device fallback
//!
//! Moves try an atomic rename first. When the rename fails for any reason other
//! than a missing source (typically EXDEV across filesystems), the file is
//! copied to a hidden `.partial` sibling, synced, checksum-verified, renamed
//! into place and only then is the source removed. A crash mid-copy leaves at
//! most a `.partial` file, which the next attempt removes.

use super::hashing::sha256_file;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocationStrategy {
    /// Same-filesystem atomic rename
    Rename,
    /// Copy, fsync, verify, rename, delete source
    CopyVerify,
    /// Target already held identical content (resumed or repeated move)
    AlreadyPresent,
}

#[derive(Debug, Clone)]
pub struct RelocationOutcome {
    pub strategy: RelocationStrategy,
    pub bytes: u64,
    /// Set whenever the content was hashed during the move
    pub checksum: Option<String>,
    pub verified: bool,
    /// Why the rename attempt failed when falling back to copy
    pub rename_error: Option<String>,
}

#[derive(Debug, Error)]
pub enum RelocationError {
    #[error("source file missing: {0}")]
    SourceMissing(PathBuf),

    #[error("destination already exists with different content: {target}")]
    Conflict { target: PathBuf },

    #[error("checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl From<RelocationError> for album_common::Error {
    fn from(err: RelocationError) -> Self {
        match err {
            RelocationError::SourceMissing(path) => {
                album_common::Error::NotFound(format!("source file missing: {}", path.display()))
            }
            RelocationError::Conflict { .. } => album_common::Error::Conflict(err.to_string()),
            RelocationError::ChecksumMismatch { .. } => {
                album_common::Error::Precondition(err.to_string())
            }
            RelocationError::Io { .. } => album_common::Error::Internal(err.to_string()),
        }
    }
}

/// Rename primitive, swappable so tests can simulate cross-device failures
pub trait RenameOp: Send + Sync {
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;
}

/// `std::fs::rename`
pub struct FsRename;

impl RenameOp for FsRename {
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        std::fs::rename(from, to)
    }
}

pub struct Relocator {
    rename: Box<dyn RenameOp>,
}

impl Default for Relocator {
    fn default() -> Self {
        Self::new()
    }
}

impl Relocator {
    pub fn new() -> Self {
        Self {
            rename: Box::new(FsRename),
        }
    }

    pub fn with_rename_op(rename: Box<dyn RenameOp>) -> Self {
        Self { rename }
    }

    /// Move `from` to `to`
    ///
    /// `expected` is the known content checksum of the source. When given it
    /// is checked against copies, and lets a repeated move whose source is
    /// already gone succeed if the target holds the expected content.
    pub fn relocate(
        &self,
        from: &Path,
        to: &Path,
        expected: Option<&str>,
    ) -> Result<RelocationOutcome, RelocationError> {
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source: io::Error| RelocationError::Io { path, source }
        };

        if !from.exists() {
            if let (Some(expected), true) = (expected, to.exists()) {
                let actual = sha256_file(to).map_err(io_err(to))?;
                if actual == expected {
                    let bytes = std::fs::metadata(to).map_err(io_err(to))?.len();
                    debug!(target = %to.display(), "Source already relocated");
                    return Ok(RelocationOutcome {
                        strategy: RelocationStrategy::AlreadyPresent,
                        bytes,
                        checksum: Some(actual),
                        verified: true,
                        rename_error: None,
                    });
                }
            }
            return Err(RelocationError::SourceMissing(from.to_path_buf()));
        }

        let bytes = std::fs::metadata(from).map_err(io_err(from))?.len();

        if to.exists() {
            let source_hash = match expected {
                Some(e) => e.to_string(),
                None => sha256_file(from).map_err(io_err(from))?,
            };
            let target_hash = sha256_file(to).map_err(io_err(to))?;
            if source_hash != target_hash {
                return Err(RelocationError::Conflict {
                    target: to.to_path_buf(),
                });
            }
            std::fs::remove_file(from).map_err(io_err(from))?;
            return Ok(RelocationOutcome {
                strategy: RelocationStrategy::AlreadyPresent,
                bytes,
                checksum: Some(target_hash),
                verified: true,
                rename_error: None,
            });
        }

        if let Some(parent) = to.parent() {
            std::fs::create_dir_all(parent).map_err(io_err(parent))?;
        }

        let partial = partial_path(to);
        if partial.exists() {
            debug!(partial = %partial.display(), "Removing stale partial copy");
            std::fs::remove_file(&partial).map_err(io_err(&partial))?;
        }

        let rename_error = match self.rename.rename(from, to) {
            Ok(()) => {
                return Ok(RelocationOutcome {
                    strategy: RelocationStrategy::Rename,
                    bytes,
                    checksum: expected.map(str::to_string),
                    verified: false,
                    rename_error: None,
                })
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(RelocationError::SourceMissing(from.to_path_buf()));
            }
            Err(e) => e,
        };

        debug!(
            source = %from.display(),
            error = %rename_error,
            "Rename failed, falling back to copy"
        );

        let checksum = self.copy_verified(from, to, &partial, expected)?;

        if let Err(e) = std::fs::remove_file(from) {
            // target is complete and verified; a leftover source is recoverable
            warn!(source = %from.display(), error = %e, "Failed to remove source after copy");
        }

        Ok(RelocationOutcome {
            strategy: RelocationStrategy::CopyVerify,
            bytes,
            checksum: Some(checksum),
            verified: true,
            rename_error: Some(rename_error.to_string()),
        })
    }

    /// Copy `from` to `to`, leaving the source in place
    ///
    /// A target that already holds the expected content is left alone.
    pub fn duplicate(
        &self,
        from: &Path,
        to: &Path,
        expected: Option<&str>,
    ) -> Result<RelocationOutcome, RelocationError> {
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source: io::Error| RelocationError::Io { path, source }
        };

        if !from.exists() {
            return Err(RelocationError::SourceMissing(from.to_path_buf()));
        }
        let bytes = std::fs::metadata(from).map_err(io_err(from))?.len();

        if to.exists() {
            let source_hash = match expected {
                Some(e) => e.to_string(),
                None => sha256_file(from).map_err(io_err(from))?,
            };
            let target_hash = sha256_file(to).map_err(io_err(to))?;
            if source_hash != target_hash {
                return Err(RelocationError::Conflict {
                    target: to.to_path_buf(),
                });
            }
            return Ok(RelocationOutcome {
                strategy: RelocationStrategy::AlreadyPresent,
                bytes,
                checksum: Some(target_hash),
                verified: true,
                rename_error: None,
            });
        }

        if let Some(parent) = to.parent() {
            std::fs::create_dir_all(parent).map_err(io_err(parent))?;
        }
        let partial = partial_path(to);
        if partial.exists() {
            std::fs::remove_file(&partial).map_err(io_err(&partial))?;
        }

        let checksum = self.copy_verified(from, to, &partial, expected)?;
        Ok(RelocationOutcome {
            strategy: RelocationStrategy::CopyVerify,
            bytes,
            checksum: Some(checksum),
            verified: true,
            rename_error: None,
        })
    }

    fn copy_verified(
        &self,
        from: &Path,
        to: &Path,
        partial: &Path,
        expected: Option<&str>,
    ) -> Result<String, RelocationError> {
        let cleanup = |err: RelocationError| {
            let _ = std::fs::remove_file(partial);
            err
        };

        let expected = match expected {
            Some(e) => e.to_string(),
            None => sha256_file(from).map_err(|source| RelocationError::Io {
                path: from.to_path_buf(),
                source,
            })?,
        };

        std::fs::copy(from, partial)
            .and_then(|_| std::fs::File::open(partial)?.sync_all())
            .map_err(|source| {
                cleanup(RelocationError::Io {
                    path: partial.to_path_buf(),
                    source,
                })
            })?;

        let actual = sha256_file(partial).map_err(|source| {
            cleanup(RelocationError::Io {
                path: partial.to_path_buf(),
                source,
            })
        })?;

        if actual != expected {
            return Err(cleanup(RelocationError::ChecksumMismatch {
                path: from.to_path_buf(),
                expected,
                actual,
            }));
        }

        std::fs::rename(partial, to).map_err(|source| {
            cleanup(RelocationError::Io {
                path: to.to_path_buf(),
                source,
            })
        })?;

        Ok(actual)
    }
}

/// Hidden sibling used while a copy is in flight
pub fn partial_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{}.partial", name))
}
