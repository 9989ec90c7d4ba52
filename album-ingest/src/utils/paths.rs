//! Destination path construction for staged and production album folders

use std::path::{Path, PathBuf};

/// Longest path component we produce, in bytes
const MAX_COMPONENT_BYTES: usize = 120;

/// Year bucket used when an album has no resolved year
pub const UNKNOWN_YEAR: &str = "Unknown Year";

/// Make a display string safe to use as a single path component
///
/// Replaces separators, reserved characters and control characters with `_`,
/// trims leading/trailing dots and spaces, and caps the length at a char
/// boundary. Falls back to `fallback` when nothing usable remains.
pub fn sanitize_component(input: &str, fallback: &str) -> String {
    let replaced: String = input
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let collapsed = replaced.split_whitespace().collect::<Vec<_>>().join(" ");
    let trimmed = collapsed.trim_matches(|c: char| c == '.' || c == ' ');

    let mut out = String::new();
    for ch in trimmed.chars() {
        if out.len() + ch.len_utf8() > MAX_COMPONENT_BYTES {
            break;
        }
        out.push(ch);
    }
    let out = out.trim_end_matches(|c: char| c == '.' || c == ' ').to_string();

    if out.is_empty() {
        fallback.to_string()
    } else {
        out
    }
}

/// `{code}/{artist}/{year} - {album}` relative to a staging or production root
pub fn album_relative_dir(code: &str, artist: &str, year: Option<u32>, album: &str) -> PathBuf {
    let year_label = year
        .map(|y| y.to_string())
        .unwrap_or_else(|| UNKNOWN_YEAR.to_string());

    PathBuf::from(code)
        .join(sanitize_component(artist, "Unknown Artist"))
        .join(format!("{} - {}", year_label, sanitize_component(album, "Unknown Album")))
}

/// Remove empty directories from `start` upward, stopping at (and keeping) `root`
pub fn prune_empty_dirs(start: &Path, root: &Path) {
    let mut current = Some(start.to_path_buf());

    while let Some(dir) = current {
        if dir == root || !dir.starts_with(root) {
            break;
        }
        // remove_dir fails on non-empty directories, which ends the walk
        if std::fs::remove_dir(&dir).is_err() {
            break;
        }
        current = dir.parent().map(Path::to_path_buf);
    }
}
