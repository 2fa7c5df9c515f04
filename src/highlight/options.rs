use glob::Pattern;

use crate::config::{
    DEFAULT_LARGE_CHANGE_SET_THRESHOLD, DEFAULT_MAX_CONCURRENT_GIT, DEFAULT_MAX_FILES_PER_COMMIT,
    DEFAULT_RENAME_THRESHOLD,
};

/// Tuning knobs a `HighlightSession` reads. Snapshotted from `Config` when a session
/// starts; tests build it directly.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Hide merge commits from the index and number the remaining messages
    pub trim_merges: bool,
    /// Inverse of trimming: keep only merges
    pub merges_only: bool,
    pub find_renamed_files: bool,
    pub rename_threshold: u8,
    /// Watching a merge also watches the commits it brought in
    pub bundle_merged_branches: bool,
    /// A commit touching more files than this contributes none
    pub max_files_per_commit: usize,
    /// Change sets above this size need confirmation before blaming
    pub large_change_set_threshold: usize,
    pub max_concurrent_git: usize,
    pub exclude_paths: Vec<Pattern>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions {
            trim_merges: true,
            merges_only: false,
            find_renamed_files: false,
            rename_threshold: DEFAULT_RENAME_THRESHOLD,
            bundle_merged_branches: false,
            max_files_per_commit: DEFAULT_MAX_FILES_PER_COMMIT,
            large_change_set_threshold: DEFAULT_LARGE_CHANGE_SET_THRESHOLD,
            max_concurrent_git: DEFAULT_MAX_CONCURRENT_GIT,
            exclude_paths: Vec::new(),
        }
    }
}

impl SessionOptions {
    pub fn is_excluded(&self, relative_path: &str) -> bool {
        self.exclude_paths.iter().any(|p| p.matches(relative_path))
    }
}
