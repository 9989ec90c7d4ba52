//! Album grouping engine
//!
//! Two passes over the catalog:
//! 1. normalize artist and album title and hash them into provisional groups
//! 2. vote on a year per provisional group, splitting groups whose members
//!    disagree across too many well-supported years
//!
//! The result depends only on the catalog contents and the policy, so
//! re-running on an unchanged catalog reproduces the same groups.

use crate::db::ScanCatalog;
use crate::models::{AlbumGroup, GroupAssignment, ScannedEntry};
use crate::utils::sha256_parts;
use album_common::normalize::normalize_opt;
use album_common::{normalize_key, GroupingSettings, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const UNKNOWN_ARTIST: &str = "Unknown Artist";
pub const UNKNOWN_ALBUM: &str = "Unknown Album";

static YEAR_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(19|20)\d{2}\b").unwrap());
static DISC_FOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:cd|disc|disk)[\s._-]*\d{1,2}$").unwrap());

/// Where an entry's artist key came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArtistSource {
    Tags,
    Directory,
}

#[derive(Debug, Clone)]
enum GroupKey {
    /// Grouped by containing directory (invalid or untitled entries)
    Directory(String),
    Album {
        artist: String,
        album: String,
        source: ArtistSource,
    },
}

/// Result of one grouping pass
#[derive(Debug, Clone, Default)]
pub struct GroupingOutcome {
    pub assignments: Vec<GroupAssignment>,
    pub groups: usize,
    /// Provisional groups that were split by year
    pub splits: usize,
    /// Groups with at least one invalid member
    pub invalid_groups: usize,
}

pub struct GroupingEngine {
    policy: GroupingSettings,
}

impl GroupingEngine {
    pub fn new(policy: GroupingSettings) -> Self {
        Self { policy }
    }

    /// Group every entry of `catalog` and write the assignments back
    pub async fn run(&self, catalog: &ScanCatalog, batch_size: usize) -> Result<GroupingOutcome> {
        let session = catalog.session().await?;
        let entries = catalog.load_entries().await?;

        let outcome = self.assign(&entries, &session.root);
        catalog.apply_grouping(&outcome.assignments, batch_size).await?;

        info!(
            entries = entries.len(),
            groups = outcome.groups,
            splits = outcome.splits,
            invalid_groups = outcome.invalid_groups,
            "Grouping complete"
        );

        Ok(outcome)
    }

    /// Compute group assignments for `entries` scanned below `root`
    pub fn assign(&self, entries: &[ScannedEntry], root: &Path) -> GroupingOutcome {
        let mut keys: Vec<GroupKey> = entries.iter().map(|e| group_key(e, root)).collect();
        merge_directory_orphans(&mut keys);

        let mut provisional: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (idx, key) in keys.iter().enumerate() {
            provisional.entry(hash_key(key)).or_default().push(idx);
        }

        let mut outcome = GroupingOutcome::default();
        let mut group_members: BTreeMap<String, Vec<usize>> = BTreeMap::new();

        for (hash, members) in &provisional {
            let (clusters, split) = self.refine(entries, members);
            if split {
                outcome.splits += 1;
                warn!(
                    grouping_hash = %&hash[..16],
                    sub_groups = clusters.len(),
                    years = ?clusters.iter().map(|(y, _)| *y).collect::<Vec<_>>(),
                    "Album members disagree on year, splitting"
                );
            }

            for (year, cluster) in clusters {
                let group_id = group_id(hash, year);
                for &idx in &cluster {
                    outcome.assignments.push(GroupAssignment {
                        entry_id: entries[idx].id,
                        grouping_hash: hash.clone(),
                        group_id: group_id.clone(),
                        group_year: year,
                    });
                }
                group_members.entry(group_id).or_default().extend(cluster);
            }
        }

        outcome.groups = group_members.len();
        outcome.invalid_groups = group_members
            .values()
            .filter(|members| members.iter().any(|&idx| !entries[idx].is_valid))
            .count();
        outcome.assignments.sort_by_key(|a| a.entry_id);
        outcome
    }

    /// Year vote over one provisional group
    ///
    /// Returns the year clusters and whether the group was split. Without a
    /// split there is exactly one cluster holding every member.
    fn refine(&self, entries: &[ScannedEntry], members: &[usize]) -> (Vec<(Option<u32>, Vec<usize>)>, bool) {
        let mut counts: BTreeMap<u32, usize> = BTreeMap::new();
        for &idx in members {
            if let Some(year) = entries[idx].tags.year {
                *counts.entry(year).or_insert(0) += 1;
            }
        }

        // most members first, earliest year on ties
        let mut ranked: Vec<(u32, usize)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        let winner = ranked.first().map(|(year, _)| *year);
        let supported: Vec<u32> = ranked
            .iter()
            .filter(|(_, count)| *count >= self.policy.min_cluster_size)
            .map(|(year, _)| *year)
            .collect();

        if supported.len() <= self.policy.max_year_clusters {
            return (vec![(winner, members.to_vec())], false);
        }

        let mut clusters: Vec<(Option<u32>, Vec<usize>)> =
            supported.iter().map(|year| (Some(*year), Vec::new())).collect();

        for &idx in members {
            let slot = entries[idx]
                .tags
                .year
                .and_then(|year| supported.iter().position(|y| *y == year))
                // minority and missing years join the winner, which ranks first
                .unwrap_or(0);
            clusters[slot].1.push(idx);
        }

        (clusters, true)
    }
}

fn group_key(entry: &ScannedEntry, root: &Path) -> GroupKey {
    let directory = || GroupKey::Directory(entry.parent_dir().to_string_lossy().into_owned());

    if !entry.is_valid {
        return directory();
    }

    let album = match normalize_opt(entry.tags.album.as_deref()) {
        Some(album) => album,
        None => return directory(),
    };

    let tagged_artist = normalize_opt(entry.tags.album_artist.as_deref())
        .or_else(|| normalize_opt(entry.tags.artist.as_deref()));

    match tagged_artist {
        Some(artist) => GroupKey::Album {
            artist,
            album,
            source: ArtistSource::Tags,
        },
        None => GroupKey::Album {
            artist: directory_artist(entry, &album, root)
                .map(|name| normalize_key(&name))
                .unwrap_or_default(),
            album,
            source: ArtistSource::Directory,
        },
    }
}

/// Point directory-derived artists at the tagged group with the same album
/// title, when exactly one such group exists
fn merge_directory_orphans(keys: &mut [GroupKey]) {
    let mut tagged: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for key in keys.iter() {
        if let GroupKey::Album {
            artist,
            album,
            source: ArtistSource::Tags,
        } = key
        {
            tagged.entry(album.clone()).or_default().insert(artist.clone());
        }
    }

    for key in keys.iter_mut() {
        if let GroupKey::Album {
            artist,
            album,
            source: ArtistSource::Directory,
        } = key
        {
            if let Some(candidates) = tagged.get(album.as_str()) {
                if candidates.len() == 1 {
                    if let Some(only) = candidates.iter().next() {
                        *artist = only.clone();
                    }
                }
            }
        }
    }
}

fn hash_key(key: &GroupKey) -> String {
    match key {
        GroupKey::Directory(dir) => sha256_parts(["dir", dir.as_str()]),
        GroupKey::Album { artist, album, .. } => sha256_parts([artist.as_str(), album.as_str()]),
    }
}

fn group_id(grouping_hash: &str, year: Option<u32>) -> String {
    let year = year.map(|y| y.to_string()).unwrap_or_else(|| "-".to_string());
    sha256_parts([grouping_hash, year.as_str()])[..16].to_string()
}

/// True when `dir_name` names the album itself (or one disc of it)
fn is_album_folder(dir_name: &str, album_key: &str) -> bool {
    if DISC_FOLDER.is_match(dir_name.trim()) {
        return true;
    }
    let without_years = YEAR_TOKEN.replace_all(dir_name, " ");
    let key = normalize_key(&without_years);
    !album_key.is_empty() && key.contains(album_key)
}

/// Artist name guessed from the folder layout
///
/// The parent folder, or the first folder above it that is not the album
/// folder itself. Folders at or above the scan root are not used.
pub fn directory_artist(entry: &ScannedEntry, album_key: &str, root: &Path) -> Option<String> {
    let mut dir: Option<PathBuf> = entry.source_path.parent().map(Path::to_path_buf);

    while let Some(current) = dir {
        if current == root || !current.starts_with(root) {
            return None;
        }
        let name = current.file_name()?.to_string_lossy().into_owned();
        if !is_album_folder(&name, album_key) {
            return Some(name);
        }
        dir = current.parent().map(Path::to_path_buf);
    }

    None
}

/// Most frequent value; ties go to the lexicographically smallest
fn majority<'a>(values: impl Iterator<Item = &'a str>) -> Option<String> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for value in values {
        *counts.entry(value).or_insert(0) += 1;
    }

    let mut best: Option<(&str, usize)> = None;
    for (value, count) in counts {
        if best.map_or(true, |(_, best_count)| count > best_count) {
            best = Some((value, count));
        }
    }
    best.map(|(value, _)| value.to_string())
}

/// Rebuild album groups from grouped catalog entries, ordered by group id
pub fn collect_groups(entries: Vec<ScannedEntry>, root: &Path) -> Vec<AlbumGroup> {
    let mut by_group: BTreeMap<String, Vec<ScannedEntry>> = BTreeMap::new();
    for entry in entries {
        if let Some(group_id) = entry.group_id.clone() {
            by_group.entry(group_id).or_default().push(entry);
        }
    }

    by_group
        .into_iter()
        .map(|(group_id, entries)| {
            let album = majority(entries.iter().filter_map(|e| e.tags.album.as_deref()))
                .or_else(|| {
                    entries
                        .first()
                        .and_then(|e| e.parent_dir().file_name())
                        .map(|n| n.to_string_lossy().into_owned())
                })
                .unwrap_or_else(|| UNKNOWN_ALBUM.to_string());

            let album_key = normalize_key(&album);
            let artist = majority(
                entries
                    .iter()
                    .filter_map(|e| e.tags.album_artist.as_deref().or(e.tags.artist.as_deref())),
            )
            .or_else(|| entries.iter().find_map(|e| directory_artist(e, &album_key, root)))
            .unwrap_or_else(|| UNKNOWN_ARTIST.to_string());

            AlbumGroup {
                grouping_hash: entries
                    .first()
                    .and_then(|e| e.grouping_hash.clone())
                    .unwrap_or_default(),
                year: entries.first().and_then(|e| e.group_year),
                group_id,
                artist,
                album,
                entries,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ValidationFailure;

    fn entry(id: i64, path: &str) -> ScannedEntry {
        let mut entry = ScannedEntry::new(PathBuf::from(path));
        entry.id = id;
        entry
    }

    fn tagged(id: i64, path: &str, artist: &str, album: &str, year: Option<u32>) -> ScannedEntry {
        let mut e = entry(id, path);
        e.tags.album_artist = Some(artist.to_string());
        e.tags.album = Some(album.to_string());
        e.tags.year = year;
        e
    }

    fn engine() -> GroupingEngine {
        GroupingEngine::new(GroupingSettings::default())
    }

    fn group_of(outcome: &GroupingOutcome, id: i64) -> &GroupAssignment {
        outcome.assignments.iter().find(|a| a.entry_id == id).unwrap()
    }

    fn apply(entries: &mut [ScannedEntry], outcome: &GroupingOutcome) {
        for e in entries.iter_mut() {
            let a = group_of(outcome, e.id);
            e.grouping_hash = Some(a.grouping_hash.clone());
            e.group_id = Some(a.group_id.clone());
            e.group_year = a.group_year;
        }
    }

    #[test]
    fn test_led_zeppelin_iv_resolves_one_group() {
        let root = Path::new("/music");
        let mut third = entry(3, "/music/lz4/03 The Battle of Evermore.mp3");
        third.tags.artist = Some("led zeppelin".to_string());
        third.tags.album = Some("LED ZEPPELIN IV".to_string());

        let mut entries = vec![
            tagged(1, "/music/lz4/01 Black Dog.mp3", "Led Zeppelin", "Led Zeppelin IV", Some(1971)),
            tagged(2, "/music/lz4/02 Rock and Roll.mp3", "Led Zeppelin", "Led Zeppelin IV", Some(1971)),
            third,
        ];

        let outcome = engine().assign(&entries, root);

        assert_eq!(outcome.groups, 1);
        assert_eq!(outcome.splits, 0);
        assert!(outcome.assignments.iter().all(|a| a.group_year == Some(1971)));

        apply(&mut entries, &outcome);
        let groups = collect_groups(entries, root);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].artist, "Led Zeppelin");
        assert_eq!(groups[0].album, "Led Zeppelin IV");
        assert_eq!(groups[0].year, Some(1971));
        assert_eq!(groups[0].track_count(), 3);
    }

    #[test]
    fn test_grouping_is_idempotent_and_order_independent() {
        let root = Path::new("/music");
        let entries = vec![
            tagged(1, "/music/a/1.mp3", "Nina Simone", "Pastel Blues", Some(1965)),
            tagged(2, "/music/a/2.mp3", "Nina Simone", "Pastel Blues", None),
            tagged(3, "/music/b/1.mp3", "Miles Davis", "Kind of Blue", Some(1959)),
            entry(4, "/music/c/untitled.mp3"),
        ];

        let first = engine().assign(&entries, root);
        let second = engine().assign(&entries, root);
        let mut reversed = entries.clone();
        reversed.reverse();
        let third = engine().assign(&reversed, root);

        assert_eq!(first.assignments, second.assignments);
        assert_eq!(first.assignments, third.assignments);
        assert_eq!(first.groups, 3);
    }

    #[test]
    fn test_year_disagreement_splits() {
        let root = Path::new("/music");
        let entries = vec![
            tagged(1, "/music/x/1.mp3", "Queen", "Greatest Hits", Some(1981)),
            tagged(2, "/music/x/2.mp3", "Queen", "Greatest Hits", Some(1981)),
            tagged(3, "/music/y/1.mp3", "Queen", "Greatest Hits", Some(1991)),
            tagged(4, "/music/y/2.mp3", "Queen", "Greatest Hits", Some(1991)),
            tagged(5, "/music/y/3.mp3", "Queen", "Greatest Hits", Some(1994)),
            tagged(6, "/music/y/4.mp3", "Queen", "Greatest Hits", None),
        ];

        let outcome = engine().assign(&entries, root);

        assert_eq!(outcome.splits, 1);
        assert_eq!(outcome.groups, 2);
        // tie on size goes to the earlier year, which absorbs the stragglers
        assert_eq!(group_of(&outcome, 5).group_year, Some(1981));
        assert_eq!(group_of(&outcome, 6).group_year, Some(1981));
        assert_eq!(group_of(&outcome, 3).group_year, Some(1991));
        assert_ne!(group_of(&outcome, 1).group_id, group_of(&outcome, 3).group_id);
        assert_eq!(group_of(&outcome, 1).grouping_hash, group_of(&outcome, 3).grouping_hash);
    }

    #[test]
    fn test_single_outlier_year_does_not_split() {
        let root = Path::new("/music");
        let entries = vec![
            tagged(1, "/music/x/1.mp3", "Queen", "Jazz", Some(1978)),
            tagged(2, "/music/x/2.mp3", "Queen", "Jazz", Some(1978)),
            tagged(3, "/music/x/3.mp3", "Queen", "Jazz", Some(2011)),
        ];

        let outcome = engine().assign(&entries, root);

        assert_eq!(outcome.groups, 1);
        assert!(outcome.assignments.iter().all(|a| a.group_year == Some(1978)));
    }

    #[test]
    fn test_directory_orphan_merges_into_tagged_group() {
        let root = Path::new("/music");
        let mut orphan = entry(3, "/music/incoming/Led Zeppelin IV/04 Stairway to Heaven.mp3");
        orphan.tags.album = Some("Led Zeppelin IV".to_string());

        let entries = vec![
            tagged(1, "/music/lz/1.mp3", "Led Zeppelin", "Led Zeppelin IV", Some(1971)),
            tagged(2, "/music/lz/2.mp3", "Led Zeppelin", "Led Zeppelin IV", Some(1971)),
            orphan,
        ];

        let outcome = engine().assign(&entries, root);

        assert_eq!(outcome.groups, 1);
        assert_eq!(group_of(&outcome, 3).group_id, group_of(&outcome, 1).group_id);
    }

    #[test]
    fn test_directory_artist_skips_album_and_disc_folders() {
        let root = Path::new("/music");
        let e = entry(1, "/music/Led Zeppelin/1975 - Physical Graffiti/CD1/01.mp3");
        assert_eq!(
            directory_artist(&e, "physical graffiti", root).as_deref(),
            Some("Led Zeppelin")
        );

        let shallow = entry(2, "/music/Physical Graffiti/01.mp3");
        assert_eq!(directory_artist(&shallow, "physical graffiti", root), None);
    }

    #[test]
    fn test_invalid_entries_grouped_by_directory() {
        let root = Path::new("/music");
        let mut bad = tagged(2, "/music/a/2.mp3", "Nina Simone", "Pastel Blues", Some(1965));
        bad.mark_invalid(ValidationFailure::EmptyFile, "0 bytes");
        let mut bad_sibling = entry(3, "/music/a/3.mp3");
        bad_sibling.mark_invalid(ValidationFailure::UnsupportedType, "text");

        let entries = vec![
            tagged(1, "/music/a/1.mp3", "Nina Simone", "Pastel Blues", Some(1965)),
            bad,
            bad_sibling,
        ];

        let outcome = engine().assign(&entries, root);

        assert_eq!(outcome.groups, 2);
        assert_eq!(outcome.invalid_groups, 1);
        assert_eq!(group_of(&outcome, 2).group_id, group_of(&outcome, 3).group_id);
        assert_ne!(group_of(&outcome, 1).group_id, group_of(&outcome, 2).group_id);
    }

    #[test]
    fn test_majority_tie_breaks_lexicographically() {
        let values = ["b", "a", "b", "a"];
        assert_eq!(majority(values.iter().copied()).as_deref(), Some("a"));
        assert_eq!(majority(std::iter::empty()), None);
    }
}
