use std::collections::{HashMap, HashSet};

use crate::error::GitVisionError;
use crate::git::repository::Repository;
use crate::highlight::commit_resolver::UNCOMMITTED_HASH;
use crate::highlight::options::SessionOptions;
use crate::utils::{basename, debug_log};

/// Maps a commit to the tracked files it touched.
pub struct ChangeSetLocator {
    repo: Repository,
    tracked: HashSet<String>,
    by_basename: HashMap<String, Vec<String>>,
    root_commits: HashSet<String>,
    find_renamed_files: bool,
    rename_threshold: u8,
    max_files_per_commit: usize,
}

impl ChangeSetLocator {
    /// Load the tracked index and root commits once. Either query failing leaves
    /// that part empty.
    pub fn load(repo: &Repository, options: &SessionOptions) -> ChangeSetLocator {
        let tracked = repo.ls_files().unwrap_or_else(|e| {
            debug_log(&format!("git ls-files failed: {}", e));
            Vec::new()
        });
        let root_commits = repo.root_commits().unwrap_or_else(|e| {
            debug_log(&format!("could not find root commits: {}", e));
            HashSet::new()
        });
        ChangeSetLocator::from_parts(repo.clone(), tracked, root_commits, options)
    }

    pub fn from_parts(
        repo: Repository,
        tracked: Vec<String>,
        root_commits: HashSet<String>,
        options: &SessionOptions,
    ) -> ChangeSetLocator {
        let mut by_basename: HashMap<String, Vec<String>> = HashMap::new();
        for path in &tracked {
            by_basename
                .entry(basename(path).to_string())
                .or_default()
                .push(path.clone());
        }
        ChangeSetLocator {
            repo,
            tracked: tracked.into_iter().collect(),
            by_basename,
            root_commits,
            find_renamed_files: options.find_renamed_files,
            rename_threshold: options.rename_threshold,
            max_files_per_commit: options.max_files_per_commit,
        }
    }

    pub fn is_tracked(&self, path: &str) -> bool {
        self.tracked.contains(path)
    }

    pub fn tracked_count(&self) -> usize {
        self.tracked.len()
    }

    /// Tracked files changed by `hash`, deduplicated in first-seen order. Any git
    /// failure yields an empty list.
    pub fn changed_files(&self, hash: &str) -> Vec<String> {
        let candidates = match self.candidates(hash) {
            Ok(candidates) => candidates,
            Err(e) => {
                debug_log(&format!("could not list files changed by {}: {}", hash, e));
                return Vec::new();
            }
        };
        if candidates.len() > self.max_files_per_commit {
            debug_log(&format!(
                "{} touches {} files (limit {}), skipping",
                hash,
                candidates.len(),
                self.max_files_per_commit
            ));
            return Vec::new();
        }
        let files = self.match_tracked(candidates);
        if files.is_empty() {
            debug_log(&format!("found 0 files with changes for commit {}", hash));
        }
        files
    }

    fn candidates(&self, hash: &str) -> Result<Vec<String>, GitVisionError> {
        if hash == UNCOMMITTED_HASH || self.root_commits.contains(hash) {
            return self.repo.diff_worktree_names();
        }
        let mut names = self.repo.diff_commit_names(hash)?;
        if self.find_renamed_files {
            names.extend(self.repo.diff_renamed_since(hash, self.rename_threshold)?);
        }
        Ok(names)
    }

    /// Keep tracked candidates. Untracked ones are taken to be renamed and accepted
    /// only when exactly one tracked path shares their file name.
    pub fn match_tracked(&self, candidates: Vec<String>) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut files = Vec::new();
        for candidate in candidates {
            let resolved = if self.tracked.contains(&candidate) {
                Some(candidate)
            } else {
                match self.by_basename.get(basename(&candidate)).map(Vec::as_slice) {
                    Some([only]) => Some(only.clone()),
                    _ => None,
                }
            };
            if let Some(path) = resolved
                && seen.insert(path.clone())
            {
                files.push(path);
            }
        }
        files
    }
}
