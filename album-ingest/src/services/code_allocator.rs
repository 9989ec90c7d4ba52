//! Directory code allocator
//!
//! Shards artists across the staged and production trees by a short code
//! derived from the artist name ("Led Zeppelin" -> `LED`). Colliding artists
//! get `-2`, `-3`, ... suffixes. Once stored, a mapping never changes.

use crate::db::directory_codes;
use album_common::{normalize_key, Result};
use sqlx::SqlitePool;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

pub const DEFAULT_CODE_LENGTH: usize = 3;

/// Code used when a name has no letters or digits
const EMPTY_NAME_CODE: &str = "0";

/// Base code for an artist: leading letters of the normalized name,
/// a leading "the" dropped, upper-cased
pub fn base_code(artist: &str, length: usize) -> String {
    let normalized = normalize_key(artist);
    let mut words: Vec<&str> = normalized.split(' ').filter(|w| !w.is_empty()).collect();
    if words.len() > 1 && words[0] == "the" {
        words.remove(0);
    }

    let code: String = words
        .concat()
        .chars()
        .filter(|c| c.is_alphanumeric())
        .take(length)
        .flat_map(char::to_uppercase)
        .collect();

    if code.is_empty() {
        EMPTY_NAME_CODE.to_string()
    } else {
        code
    }
}

#[derive(Default)]
struct AllocatorState {
    by_artist: HashMap<String, String>,
    /// Highest suffix seen per base code; 1 is the bare base
    highest_suffix: HashMap<String, u32>,
}

impl AllocatorState {
    fn note_code(&mut self, base: &str, code: &str) {
        let suffix = if code == base {
            Some(1)
        } else {
            code.strip_prefix(base)
                .and_then(|rest| rest.strip_prefix('-'))
                .and_then(|n| n.parse::<u32>().ok())
        };
        if let Some(suffix) = suffix {
            let highest = self.highest_suffix.entry(base.to_string()).or_insert(0);
            *highest = (*highest).max(suffix);
        }
    }

    fn next_suffix(&self, base: &str) -> u32 {
        self.highest_suffix.get(base).map_or(1, |highest| highest + 1)
    }
}

fn code_with_suffix(base: &str, suffix: u32) -> String {
    if suffix == 1 {
        base.to_string()
    } else {
        format!("{}-{}", base, suffix)
    }
}

/// Allocate-or-fetch of artist directory codes
///
/// With a store and persistence on, new mappings are inserted with
/// insert-or-ignore and re-read, so concurrent allocators agree. Without
/// persistence (dry runs, or no store at all) existing mappings are still
/// honored but new ones live only in this allocator.
pub struct DirectoryCodeAllocator {
    db: Option<SqlitePool>,
    persist: bool,
    state: Mutex<AllocatorState>,
}

impl DirectoryCodeAllocator {
    /// Allocator backed by the durable store
    pub fn new(db: SqlitePool) -> Self {
        Self {
            db: Some(db),
            persist: true,
            state: Mutex::new(AllocatorState::default()),
        }
    }

    /// Allocator that reads `db` (if any) but never writes
    pub fn non_persisting(db: Option<SqlitePool>) -> Self {
        Self {
            db,
            persist: false,
            state: Mutex::new(AllocatorState::default()),
        }
    }

    /// Code for `artist`, allocating one on first sight
    ///
    /// A new artist costs one lookup of the codes sharing its base, then
    /// normally a single insert starting above the highest suffix in use.
    pub async fn allocate(&self, artist: &str) -> Result<String> {
        let artist_key = normalize_key(artist);
        let base = base_code(artist, DEFAULT_CODE_LENGTH);
        let mut state = self.state.lock().await;

        if let Some(code) = state.by_artist.get(&artist_key) {
            return Ok(code.clone());
        }

        if let Some(db) = &self.db {
            if let Some(code) = directory_codes::find_code(db, &artist_key).await? {
                state.note_code(&base, &code);
                state.by_artist.insert(artist_key, code.clone());
                return Ok(code);
            }
            for code in directory_codes::codes_with_base(db, &base).await? {
                state.note_code(&base, &code);
            }
        }

        let mut suffix = state.next_suffix(&base);

        let code = loop {
            let candidate = code_with_suffix(&base, suffix);
            suffix += 1;

            match (&self.db, self.persist) {
                (Some(db), true) => {
                    if directory_codes::try_insert(db, &artist_key, &candidate, artist).await? {
                        break candidate;
                    }
                    // lost a race for this artist, or another writer took the code
                    if let Some(existing) = directory_codes::find_code(db, &artist_key).await? {
                        break existing;
                    }
                }
                _ => break candidate,
            }
        };

        debug!(artist = %artist, code = %code, persisted = self.persist && self.db.is_some(), "Allocated directory code");

        state.note_code(&base, &code);
        state.by_artist.insert(artist_key, code.clone());
        Ok(code)
    }
}
