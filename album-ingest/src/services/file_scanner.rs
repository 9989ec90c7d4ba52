//! Audio file discovery
//!
//! Sequential directory walk with symlink loop detection and an extension
//! allow-list, plus container signature checks used by validation.

use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

/// Extensions considered audio containers
pub const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "flac", "ogg", "oga", "opus", "m4a", "mp4", "aac", "wav", "aiff", "aif", "wma", "wv",
    "ape",
];

/// Audio file scanner errors
#[derive(Debug, Error)]
pub enum ScanError {
    /// Specified path does not exist
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// Path exists but is not a directory
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// Root exists but cannot be listed
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// Cannot access file
    #[error("File access error {0}: {1}")]
    FileAccessError(PathBuf, String),
}

impl From<ScanError> for album_common::Error {
    fn from(err: ScanError) -> Self {
        match err {
            ScanError::PathNotFound(_) => album_common::Error::NotFound(err.to_string()),
            ScanError::NotADirectory(_) => album_common::Error::InvalidInput(err.to_string()),
            ScanError::PermissionDenied(_) | ScanError::FileAccessError(..) => {
                album_common::Error::Io(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    err.to_string(),
                ))
            }
        }
    }
}

/// Result of walking a source tree
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    /// Allow-listed files, sorted
    pub eligible: Vec<PathBuf>,
    /// Regular files not on the allow-list
    pub skipped: u64,
    /// Entries the walk could not read
    pub errors: Vec<String>,
}

impl Discovery {
    pub fn files_seen(&self) -> u64 {
        self.eligible.len() as u64 + self.skipped
    }
}

/// Audio file scanner
pub struct FileScanner {
    ignore_names: Vec<String>,
}

impl FileScanner {
    /// Create new file scanner with default ignore patterns
    ///
    /// Ignores system entries like .DS_Store, Thumbs.db, .git and any other
    /// dot-file or dot-directory.
    pub fn new() -> Self {
        Self {
            ignore_names: vec![
                ".DS_Store".to_string(),
                "Thumbs.db".to_string(),
                "desktop.ini".to_string(),
                ".git".to_string(),
                ".svn".to_string(),
            ],
        }
    }

    /// Walk `root_path` and sort files into eligible and skipped
    ///
    /// A missing, non-directory or unlistable root is an error; unreadable
    /// entries below the root are collected and the walk continues.
    pub fn scan(&self, root_path: &Path) -> Result<Discovery, ScanError> {
        if !root_path.exists() {
            return Err(ScanError::PathNotFound(root_path.to_path_buf()));
        }

        if !root_path.is_dir() {
            return Err(ScanError::NotADirectory(root_path.to_path_buf()));
        }

        if std::fs::read_dir(root_path).is_err() {
            return Err(ScanError::PermissionDenied(root_path.to_path_buf()));
        }

        let mut discovery = Discovery::default();
        let mut symlink_visited = HashSet::new();

        let walker = WalkDir::new(root_path)
            .follow_links(true)
            .into_iter()
            .filter_entry(|e| self.should_process_entry(e, &mut symlink_visited));

        for entry in walker {
            match entry {
                Ok(entry) => {
                    if !entry.file_type().is_file() {
                        continue;
                    }
                    if is_audio_extension(entry.path()) {
                        discovery.eligible.push(entry.path().to_path_buf());
                    } else {
                        discovery.skipped += 1;
                    }
                }
                Err(e) => {
                    // walkdir reports loops it detects itself as errors too
                    tracing::warn!("Error accessing entry: {}", e);
                    discovery.errors.push(e.to_string());
                }
            }
        }

        discovery.eligible.sort();

        tracing::debug!(
            eligible = discovery.eligible.len(),
            skipped = discovery.skipped,
            errors = discovery.errors.len(),
            "Directory walk complete"
        );

        Ok(discovery)
    }

    /// Check if entry should be processed
    fn should_process_entry(
        &self,
        entry: &DirEntry,
        symlink_visited: &mut HashSet<PathBuf>,
    ) -> bool {
        if entry.depth() == 0 {
            return true;
        }

        let file_name = entry.file_name().to_string_lossy();

        if file_name.starts_with('.') || self.ignore_names.iter().any(|n| *n == file_name) {
            return false;
        }

        // Detect symlink loops
        if entry.path_is_symlink() {
            if let Ok(canonical) = entry.path().canonicalize() {
                if !symlink_visited.insert(canonical) {
                    tracing::warn!("Symlink loop detected: {}", entry.path().display());
                    return false;
                }
            }
        }

        true
    }
}

impl Default for FileScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Check if the extension is on the allow-list
pub fn is_audio_extension(path: &Path) -> bool {
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_lowercase();
            AUDIO_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Verify file type using magic bytes
pub fn verify_magic_bytes(path: &Path) -> Result<bool, ScanError> {
    let mut file = File::open(path)
        .map_err(|e| ScanError::FileAccessError(path.to_path_buf(), e.to_string()))?;

    let mut buffer = [0u8; 12];
    let mut filled = 0;
    while filled < buffer.len() {
        let n = file
            .read(&mut buffer[filled..])
            .map_err(|e| ScanError::FileAccessError(path.to_path_buf(), e.to_string()))?;
        if n == 0 {
            break;
        }
        filled += n;
    }

    Ok(is_audio_signature(&buffer[..filled]))
}

/// Known audio container signatures
pub fn is_audio_signature(header: &[u8]) -> bool {
    if header.len() < 4 {
        return false; // Too small to be audio
    }

    match header {
        // MP3 with ID3 tag
        [b'I', b'D', b'3', ..] => true,
        // MPEG audio / ADTS AAC frame sync
        [0xFF, b, ..] if b & 0xE0 == 0xE0 => true,

        [b'f', b'L', b'a', b'C', ..] => true,

        // Vorbis/Opus
        [b'O', b'g', b'g', b'S', ..] => true,

        // M4A/AAC (MP4 container)
        [_, _, _, _, b'f', b't', b'y', b'p', ..] => true,

        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'A', b'V', b'E', ..] => true,

        // AIFF / AIFF-C
        [b'F', b'O', b'R', b'M', _, _, _, _, b'A', b'I', b'F', b'F', ..]
        | [b'F', b'O', b'R', b'M', _, _, _, _, b'A', b'I', b'F', b'C', ..] => true,

        // ASF (WMA)
        [0x30, 0x26, 0xB2, 0x75, ..] => true,

        // WavPack
        [b'w', b'v', b'p', b'k', ..] => true,

        // Monkey's Audio
        [b'M', b'A', b'C', b' ', ..] => true,

        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_audio_extension_detection() {
        assert!(is_audio_extension(Path::new("a.mp3")));
        assert!(is_audio_extension(Path::new("a.FLAC")));
        assert!(is_audio_extension(Path::new("a.wv")));
        assert!(!is_audio_extension(Path::new("cover.jpg")));
        assert!(!is_audio_extension(Path::new("README")));
    }

    #[test]
    fn test_signatures() {
        assert!(is_audio_signature(b"ID3\x04\x00\x00\x00\x00\x00\x00"));
        assert!(is_audio_signature(&[0xFF, 0xFB, 0x90, 0x00]));
        assert!(is_audio_signature(b"fLaC\x00\x00\x00\x22"));
        assert!(is_audio_signature(b"RIFF\x24\x08\x00\x00WAVE"));
        assert!(is_audio_signature(b"FORM\x00\x00\x00\x00AIFF"));
        assert!(!is_audio_signature(b"RIFF\x24\x08\x00\x00AVI "));
        assert!(!is_audio_signature(b"\x89PNG\r\n\x1a\n"));
        assert!(!is_audio_signature(b"ID"));
    }

    #[test]
    fn test_scan_nonexistent_path() {
        let scanner = FileScanner::new();
        let result = scanner.scan(Path::new("/nonexistent/path"));
        assert!(matches!(result, Err(ScanError::PathNotFound(_))));
    }

    #[test]
    fn test_scan_file_as_root() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("a.mp3");
        fs::write(&file, b"x").unwrap();

        let result = FileScanner::new().scan(&file);
        assert!(matches!(result, Err(ScanError::NotADirectory(_))));
    }

    #[test]
    fn test_scan_skips_hidden_and_ineligible() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("Artist/Album")).unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::write(root.join("Artist/Album/01.flac"), b"x").unwrap();
        fs::write(root.join("Artist/Album/cover.jpg"), b"x").unwrap();
        fs::write(root.join("Artist/Album/.DS_Store"), b"x").unwrap();
        fs::write(root.join("Artist/Album/._01.flac"), b"x").unwrap();
        fs::write(root.join(".git/blob.mp3"), b"x").unwrap();

        let discovery = FileScanner::new().scan(root).unwrap();

        assert_eq!(discovery.eligible, vec![root.join("Artist/Album/01.flac")]);
        assert_eq!(discovery.skipped, 1);
        assert_eq!(discovery.files_seen(), 2);
    }

    #[cfg(unix)]
    #[test]
    fn test_scan_survives_symlink_loop() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("a")).unwrap();
        fs::write(root.join("a/01.mp3"), b"x").unwrap();
        std::os::unix::fs::symlink(root.join("a"), root.join("a/loop")).unwrap();

        let discovery = FileScanner::new().scan(root).unwrap();

        assert!(discovery.eligible.contains(&root.join("a/01.mp3")));
    }
}
