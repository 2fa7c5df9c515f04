use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::collections::btree_map;
use std::fmt;
use std::path::{Component, Path, PathBuf};

use crate::utils::normalize_to_posix;

/// Canonical identity of a document: absolute, `/`-separated, and case-folded on
/// platforms whose default filesystems are case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileKey(String);

impl FileKey {
    /// The only way to build a key. Relative paths are resolved against `base`.
    pub fn new(path: &Path, base: &Path) -> FileKey {
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            base.join(path)
        };
        let resolved = joined
            .canonicalize()
            .unwrap_or_else(|_| lexical_clean(&joined));
        let mut key = normalize_to_posix(&strip_verbatim_prefix(&resolved.to_string_lossy()));
        if cfg!(any(windows, target_os = "macos")) {
            key = key.to_lowercase();
        }
        FileKey(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for FileKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

fn lexical_clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

// canonicalize() on Windows yields `\\?\C:\...`
fn strip_verbatim_prefix(path: &str) -> String {
    path.strip_prefix(r"\\?\").unwrap_or(path).to_string()
}

/// Attributed line count per document, for file tree badges
pub type ChangeCountMap = BTreeMap<FileKey, usize>;

/// Zero-based highlighted line indices per document. Every stored vector is sorted
/// ascending. Entries are deduplicated on insert; deletion edits may later collapse
/// several indices onto one line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct HighlightMap {
    files: BTreeMap<FileKey, Vec<u32>>,
}

impl HighlightMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the lines for `key`. Input order does not matter.
    pub fn insert(&mut self, key: FileKey, mut lines: Vec<u32>) {
        lines.sort_unstable();
        lines.dedup();
        self.files.insert(key, lines);
    }

    pub fn get(&self, key: &FileKey) -> Option<&[u32]> {
        self.files.get(key).map(Vec::as_slice)
    }

    pub(crate) fn get_mut(&mut self, key: &FileKey) -> Option<&mut Vec<u32>> {
        self.files.get_mut(key)
    }

    pub fn remove(&mut self, key: &FileKey) -> Option<Vec<u32>> {
        self.files.remove(key)
    }

    pub fn contains(&self, key: &FileKey) -> bool {
        self.files.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn clear(&mut self) {
        self.files.clear();
    }

    pub fn keys(&self) -> impl Iterator<Item = &FileKey> {
        self.files.keys()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, FileKey, Vec<u32>> {
        self.files.iter()
    }

    /// Add `line` if absent, remove it if present. Returns true when the line is
    /// highlighted afterwards. Empty entries are dropped.
    pub fn toggle(&mut self, key: FileKey, line: u32) -> bool {
        let lines = self.files.entry(key.clone()).or_default();
        let highlighted = match lines.binary_search(&line) {
            Ok(idx) => {
                lines.remove(idx);
                false
            }
            Err(idx) => {
                lines.insert(idx, line);
                true
            }
        };
        if lines.is_empty() {
            self.files.remove(&key);
        }
        highlighted
    }
}

impl<'a> IntoIterator for &'a HighlightMap {
    type Item = (&'a FileKey, &'a Vec<u32>);
    type IntoIter = btree_map::Iter<'a, FileKey, Vec<u32>>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.iter()
    }
}

/// Maximal run of consecutive highlighted lines, inclusive on both ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LineBlock {
    pub start: u32,
    pub end: u32,
}

pub fn blocks(lines: &[u32]) -> Vec<LineBlock> {
    let mut out: Vec<LineBlock> = Vec::new();
    for &line in lines {
        match out.last_mut() {
            Some(block) if block.end.checked_add(1) == Some(line) => block.end = line,
            Some(block) if block.end == line => {}
            _ => out.push(LineBlock {
                start: line,
                end: line,
            }),
        }
    }
    out
}

/// Start of the first block below `cursor`, wrapping around to the top.
pub fn next_block_start(lines: &[u32], cursor: u32) -> Option<u32> {
    let starts: Vec<u32> = blocks(lines).iter().map(|b| b.start).collect();
    starts
        .iter()
        .copied()
        .find(|&s| s > cursor)
        .or_else(|| starts.first().copied())
}

/// Start of the block above the one containing `cursor`, wrapping around to the bottom.
pub fn previous_block_start(lines: &[u32], cursor: u32) -> Option<u32> {
    let all = blocks(lines);
    // Jumping back from inside a block skips that block's own start
    let current = all
        .iter()
        .position(|b| b.start <= cursor && cursor <= b.end);
    let candidates = match current {
        Some(idx) => &all[..idx],
        None => {
            let split = all.partition_point(|b| b.end < cursor);
            &all[..split]
        }
    };
    candidates
        .last()
        .or_else(|| all.last())
        .map(|b| b.start)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_key_resolves_relative_against_base() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::create_dir(temp.path().join("sub")).unwrap();
        std::fs::write(temp.path().join("a.txt"), "x").unwrap();
        let relative = FileKey::new(Path::new("./sub/../a.txt"), temp.path());
        let absolute = FileKey::new(&temp.path().join("a.txt"), Path::new("/elsewhere"));
        assert_eq!(relative, absolute);
        assert!(!relative.as_str().contains('\\'));
    }

    #[test]
    fn test_file_key_for_missing_file_is_lexical() {
        if cfg!(unix) {
            let key = FileKey::new(Path::new("x/./y/../z.rs"), Path::new("/no-such-repo"));
            assert_eq!(key.as_str(), "/no-such-repo/x/z.rs");
        }
    }

    #[test]
    fn test_insert_sorts_and_dedups() {
        let mut map = HighlightMap::new();
        let key = FileKey("/r/a".to_string());
        map.insert(key.clone(), vec![5, 1, 3, 1]);
        assert_eq!(map.get(&key), Some(&[1, 3, 5][..]));
    }

    #[test]
    fn test_toggle_adds_and_removes() {
        let mut map = HighlightMap::new();
        let key = FileKey("/r/a".to_string());
        assert!(map.toggle(key.clone(), 4));
        assert!(map.toggle(key.clone(), 2));
        assert_eq!(map.get(&key), Some(&[2, 4][..]));
        assert!(!map.toggle(key.clone(), 4));
        assert!(!map.toggle(key.clone(), 2));
        assert!(!map.contains(&key));
    }

    #[test]
    fn test_blocks() {
        assert_eq!(
            blocks(&[0, 1, 2, 5, 7, 8]),
            vec![
                LineBlock { start: 0, end: 2 },
                LineBlock { start: 5, end: 5 },
                LineBlock { start: 7, end: 8 },
            ]
        );
        assert!(blocks(&[]).is_empty());
    }

    #[test]
    fn test_block_navigation_wraps() {
        let lines = [2, 3, 10, 11, 20];
        assert_eq!(next_block_start(&lines, 0), Some(2));
        assert_eq!(next_block_start(&lines, 2), Some(10));
        assert_eq!(next_block_start(&lines, 20), Some(2));
        assert_eq!(previous_block_start(&lines, 11), Some(2));
        assert_eq!(previous_block_start(&lines, 15), Some(10));
        assert_eq!(previous_block_start(&lines, 3), Some(20));
        assert_eq!(next_block_start(&[], 5), None);
        assert_eq!(previous_block_start(&[], 5), None);
    }
}
