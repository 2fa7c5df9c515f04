use chrono::{DateTime, FixedOffset};
use futures::future::join_all;
use serde::Serialize;
use smol::lock::Semaphore;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::git::repository::{HeadState, Repository};
use crate::highlight::blame_attributor::{Attribution, BlameAttributor};
use crate::highlight::change_set::ChangeSetLocator;
use crate::highlight::collaborators::{Notifier, ProgressSink};
use crate::highlight::commit_resolver::{CommitRecord, CommitResolver};
use crate::highlight::highlight_map::{ChangeCountMap, FileKey, HighlightMap};
use crate::highlight::line_tracker::{EditDelta, apply_delta};
use crate::highlight::options::SessionOptions;
use crate::highlight::render_throttle::RenderThrottle;
use crate::utils::{PhaseTimer, debug_log};

/// Outcome of one `add_commits` run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AddCommitsReport {
    /// Selected messages that matched a commit
    pub resolved: usize,
    /// Size of the watched hash set afterwards, bundled siblings included
    pub watched: usize,
    /// Files that went to blame
    pub files: usize,
    pub highlighted_files: usize,
    pub total_lines: usize,
    /// The user declined to process a large change set
    pub cancelled: bool,
}

/// All highlight state for one repository. Callers serialize access through a
/// `ConcurrencyGate`.
pub struct HighlightSession {
    repo: Repository,
    options: SessionOptions,
    notifier: Arc<dyn Notifier>,
    progress: Arc<dyn ProgressSink>,
    resolver: Arc<CommitResolver>,
    locator: Arc<ChangeSetLocator>,
    attributor: BlameAttributor,
    head: HeadState,
    watched: HashSet<String>,
    changed_files: BTreeSet<String>,
    highlights: HighlightMap,
    change_counts: ChangeCountMap,
    // keys already resolved for paths seen by store, toggle_line or remember_key
    key_cache: HashMap<PathBuf, FileKey>,
    throttle: Option<RenderThrottle>,
    sibling_notice_shown: bool,
}

impl HighlightSession {
    /// Load history and the tracked index. Runs git synchronously.
    pub fn open(
        repo: Repository,
        options: SessionOptions,
        notifier: Arc<dyn Notifier>,
        progress: Arc<dyn ProgressSink>,
    ) -> HighlightSession {
        let _timer = PhaseTimer::start("open session");
        let head = repo.head_state();
        let resolver = CommitResolver::initialize(&repo, &options, notifier.as_ref());
        let locator = ChangeSetLocator::load(&repo, &options);
        debug_log(&format!(
            "session opened at {}: {} commits, {} tracked files",
            repo.workdir().display(),
            resolver.records().count(),
            locator.tracked_count()
        ));
        HighlightSession {
            attributor: BlameAttributor::new(repo.clone()),
            repo,
            options,
            notifier,
            progress,
            resolver: Arc::new(resolver),
            locator: Arc::new(locator),
            head,
            watched: HashSet::new(),
            changed_files: BTreeSet::new(),
            highlights: HighlightMap::new(),
            change_counts: ChangeCountMap::new(),
            key_cache: HashMap::new(),
            throttle: None,
            sibling_notice_shown: false,
        }
    }

    /// Watch the commits behind `watchlist` (message to date) and re-blame every
    /// changed file.
    pub async fn add_commits(&mut self, watchlist: &BTreeMap<String, String>) -> AddCommitsReport {
        let _timer = PhaseTimer::start("add_commits");
        if self.resolver.is_empty() {
            self.notifier.error("No git log found.");
        }

        let resolved = self
            .resolver
            .resolve(watchlist.keys().map(String::as_str));
        let mut hashes = resolved.clone();
        if self.options.bundle_merged_branches {
            let siblings = self.bundled_siblings(&resolved).await;
            hashes.extend(siblings);
        }
        self.watched.extend(hashes.iter().cloned());

        let candidates = self.collect_changed_files(hashes).await;
        debug_log(&format!("{} potential files found", candidates.len()));
        for file in candidates {
            if self.options.is_excluded(&file) {
                debug_log(&format!("skipping excluded file {}", file));
            } else if self.repo.absolute_path(&file).exists() {
                self.changed_files.insert(file);
            } else {
                debug_log(&format!("could not find path to file {}", file));
            }
        }
        debug_log(&format!(
            "{} files with changes found",
            self.changed_files.len()
        ));

        if self.changed_files.len() > self.options.large_change_set_threshold {
            let question = format!(
                "Detected a large number of changes: {} files found with changes. Are you sure you wish to process them?",
                self.changed_files.len()
            );
            if !self.notifier.confirm(&question) {
                self.clear_highlight_data();
                return AddCommitsReport {
                    resolved: resolved.len(),
                    cancelled: true,
                    ..Default::default()
                };
            }
        }

        let files = self.changed_files.len();
        self.fill_highlights().await;

        AddCommitsReport {
            resolved: resolved.len(),
            watched: self.watched.len(),
            files,
            highlighted_files: self.highlights.len(),
            total_lines: self.change_counts.values().sum(),
            cancelled: false,
        }
    }

    async fn bundled_siblings(&mut self, resolved: &[String]) -> Vec<String> {
        let merges: Vec<String> = resolved
            .iter()
            .filter(|h| self.resolver.record_for_hash(h).is_some_and(|r| r.is_merge))
            .cloned()
            .collect();
        if merges.is_empty() {
            return Vec::new();
        }

        let resolver = Arc::clone(&self.resolver);
        let siblings: Vec<String> = smol::unblock(move || {
            merges
                .iter()
                .flat_map(|merge| resolver.siblings_of(merge))
                .map(|record| record.hash)
                .collect()
        })
        .await;

        let already: HashSet<&String> = resolved.iter().collect();
        let mut seen = HashSet::new();
        let added: Vec<String> = siblings
            .into_iter()
            .filter(|h| !already.contains(h) && seen.insert(h.clone()))
            .collect();
        if !added.is_empty() && !self.sibling_notice_shown {
            self.notifier.info(&format!(
                "Link merged commits enabled: {} additional commits added to watch list",
                added.len()
            ));
            self.sibling_notice_shown = true;
        }
        added
    }

    async fn collect_changed_files(&self, hashes: Vec<String>) -> Vec<String> {
        let semaphore = Arc::new(Semaphore::new(self.options.max_concurrent_git.max(1)));
        let tasks: Vec<_> = hashes
            .into_iter()
            .map(|hash| {
                let locator = Arc::clone(&self.locator);
                let semaphore = Arc::clone(&semaphore);
                smol::spawn(async move {
                    let _permit = semaphore.acquire().await;
                    smol::unblock(move || locator.changed_files(&hash)).await
                })
            })
            .collect();

        join_all(tasks).await.into_iter().flatten().collect()
    }

    /// Rebuild both maps from empty by blaming every file in the change set.
    async fn fill_highlights(&mut self) {
        self.highlights.clear();
        self.change_counts.clear();

        let total = self.changed_files.len();
        if total == 0 {
            return;
        }
        self.progress.start("Highlighting changes", total);
        let increment = 1.0 / total as f64;

        let semaphore = Arc::new(Semaphore::new(self.options.max_concurrent_git.max(1)));
        let watched = Arc::new(self.watched.clone());
        let tasks: Vec<_> = self
            .changed_files
            .iter()
            .cloned()
            .map(|file| {
                let attributor = self.attributor.clone();
                let semaphore = Arc::clone(&semaphore);
                let watched = Arc::clone(&watched);
                let progress = Arc::clone(&self.progress);
                smol::spawn(async move {
                    let _permit = semaphore.acquire().await;
                    let result = smol::unblock(move || {
                        let attribution = attributor.attribute(&file, &watched);
                        (file, attribution)
                    })
                    .await;
                    progress.advance(increment);
                    result
                })
            })
            .collect();

        for (file, attribution) in join_all(tasks).await {
            self.store(file, attribution);
        }
        self.progress.finish();
    }

    fn store(&mut self, relative: String, attribution: Attribution) {
        let key = self.remember_key(Path::new(&relative));
        self.key_cache
            .entry(self.repo.absolute_path(&relative))
            .or_insert_with(|| key.clone());
        if attribution.count > 0 {
            self.change_counts.insert(key.clone(), attribution.count);
            self.highlights.insert(key, attribution.lines);
            self.changed_files.insert(relative);
        } else {
            self.forget(&relative, &key);
        }
    }

    fn forget(&mut self, relative: &str, key: &FileKey) {
        self.highlights.remove(key);
        self.change_counts.remove(key);
        self.changed_files.remove(relative);
    }

    /// Re-blame one file against the current watch set, e.g. after a save.
    /// Returns the attributed line count; files outside the working tree or
    /// missing on disk count as zero without running git.
    pub async fn update_file_highlights(&mut self, path: &Path) -> usize {
        let Some(relative) = self.repo.relative_path(path) else {
            debug_log(&format!("{} is outside the working tree", path.display()));
            return 0;
        };
        let key = self.key_for(Path::new(&relative));
        if !self.repo.absolute_path(&relative).is_file() {
            self.forget(&relative, &key);
            return 0;
        }

        let attributor = self.attributor.clone();
        let watched = self.watched.clone();
        let file = relative.clone();
        let attribution = smol::unblock(move || attributor.attribute(&file, &watched)).await;
        let count = attribution.count;
        self.store(relative, attribution);
        count
    }

    pub fn clear_highlight_data(&mut self) {
        self.watched.clear();
        self.changed_files.clear();
        self.highlights.clear();
        self.change_counts.clear();
    }

    /// Shift the stored lines of `path` for an edit. Purely in memory once the
    /// path's key is cached; a changed file is handed to the attached render
    /// throttle.
    pub fn on_edit(&mut self, path: &Path, deltas: &[EditDelta]) -> bool {
        let key = self.remember_key(path);
        let Some(lines) = self.highlights.get_mut(&key) else {
            return false;
        };
        let mut moved = false;
        for delta in deltas {
            moved |= apply_delta(lines, *delta);
        }
        if moved && let Some(throttle) = &self.throttle {
            throttle.mark_dirty(key, lines.clone());
        }
        moved
    }

    /// Manually add or remove one highlighted line. Returns whether the line is
    /// highlighted afterwards.
    pub fn toggle_line(&mut self, path: &Path, line: u32) -> bool {
        let key = self.remember_key(path);
        let highlighted = self.highlights.toggle(key.clone(), line);
        let relative = self.repo.relative_path(path);
        match self.highlights.get(&key).map(<[u32]>::len) {
            Some(count) => {
                self.change_counts.insert(key, count);
                if let Some(relative) = relative {
                    self.changed_files.insert(relative);
                }
            }
            None => {
                self.change_counts.remove(&key);
                if let Some(relative) = relative {
                    self.changed_files.remove(&relative);
                }
            }
        }
        highlighted
    }

    /// True when HEAD moved or the checked out branch changed since the session
    /// was built.
    pub fn head_changed(&self) -> bool {
        self.repo.head_state() != self.head
    }

    /// Tear down every derived structure and reload history for the current HEAD.
    pub async fn rebuild_for_head(&mut self) {
        let _timer = PhaseTimer::start("rebuild_for_head");
        let repo = self.repo.clone();
        let options = self.options.clone();
        let notifier = Arc::clone(&self.notifier);
        let (head, resolver, locator) = smol::unblock(move || {
            let head = repo.head_state();
            let resolver = CommitResolver::initialize(&repo, &options, notifier.as_ref());
            let locator = ChangeSetLocator::load(&repo, &options);
            (head, resolver, locator)
        })
        .await;

        self.clear_highlight_data();
        self.head = head;
        self.resolver = Arc::new(resolver);
        self.locator = Arc::new(locator);
        self.sibling_notice_shown = false;
    }

    /// Rebuild if HEAD moved. Returns whether a rebuild happened.
    pub async fn refresh_if_head_moved(&mut self) -> bool {
        if !self.head_changed() {
            return false;
        }
        debug_log("HEAD moved, rebuilding highlight session");
        self.rebuild_for_head().await;
        true
    }

    pub fn attach_render_throttle(&mut self, throttle: RenderThrottle) {
        self.throttle = Some(throttle);
    }

    pub fn take_render_throttle(&mut self) -> Option<RenderThrottle> {
        self.throttle.take()
    }

    /// Key for an absolute path or one relative to the working tree root
    pub fn key_for(&self, path: &Path) -> FileKey {
        FileKey::new(path, self.repo.canonical_workdir())
    }

    /// `key_for`, resolved once per path so repeated edits skip the filesystem
    pub fn remember_key(&mut self, path: &Path) -> FileKey {
        if let Some(key) = self.key_cache.get(path) {
            return key.clone();
        }
        let key = self.key_for(path);
        self.key_cache.insert(path.to_path_buf(), key.clone());
        key
    }

    pub fn lines_for(&self, path: &Path) -> Option<&[u32]> {
        match self.key_cache.get(path) {
            Some(key) => self.highlights.get(key),
            None => self.highlights.get(&self.key_for(path)),
        }
    }

    pub fn highlight_map(&self) -> &HighlightMap {
        &self.highlights
    }

    pub fn change_counts(&self) -> &ChangeCountMap {
        &self.change_counts
    }

    pub fn changed_files(&self) -> &BTreeSet<String> {
        &self.changed_files
    }

    pub fn watched_hashes(&self) -> &HashSet<String> {
        &self.watched
    }

    pub fn commit_list(&self) -> Vec<(String, Option<DateTime<FixedOffset>>)> {
        self.resolver.commit_list()
    }

    pub fn resolver(&self) -> &CommitResolver {
        &self.resolver
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    /// Sibling records for a selected message, empty if it does not resolve
    pub async fn siblings_for_message(&self, message: &str) -> Vec<CommitRecord> {
        let Some(hash) = self.resolver.lookup(message).map(|r| r.hash.clone()) else {
            return Vec::new();
        };
        let resolver = Arc::clone(&self.resolver);
        smol::unblock(move || resolver.siblings_of(&hash)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::find_repository_in_path;
    use crate::highlight::collaborators::{NoProgress, QuietNotifier};
    use std::fs;
    use std::process::Command;

    fn git(dir: &Path, args: &[&str]) {
        let status = Command::new("git")
            .args(args)
            .current_dir(dir)
            .status()
            .expect("git should run");
        assert!(status.success(), "git {:?} failed", args);
    }

    fn session_with_one_commit() -> (tempfile::TempDir, HighlightSession) {
        let temp = tempfile::tempdir().unwrap();
        let dir = temp.path();
        git(dir, &["init", "-q"]);
        git(dir, &["config", "user.name", "Test User"]);
        git(dir, &["config", "user.email", "test@example.com"]);
        fs::write(dir.join("a.txt"), "one\ntwo\nthree\n").unwrap();
        git(dir, &["add", "."]);
        git(dir, &["commit", "-q", "-m", "initial"]);

        let repo = find_repository_in_path(&dir.to_string_lossy()).unwrap();
        let session = HighlightSession::open(
            repo,
            SessionOptions::default(),
            Arc::new(QuietNotifier {
                confirm_answer: true,
            }),
            Arc::new(NoProgress),
        );
        (temp, session)
    }

    #[test]
    fn test_toggle_line_tracks_counts() {
        let (temp, mut session) = session_with_one_commit();
        let file = temp.path().join("a.txt");
        assert!(session.toggle_line(&file, 2));
        assert!(session.toggle_line(&file, 0));
        assert_eq!(session.lines_for(&file), Some(&[0, 2][..]));
        assert_eq!(session.change_counts().values().copied().collect::<Vec<_>>(), vec![2]);
        assert!(session.changed_files().contains("a.txt"));

        assert!(!session.toggle_line(&file, 0));
        assert!(!session.toggle_line(&file, 2));
        assert!(session.change_counts().is_empty());
        assert!(session.changed_files().is_empty());
    }

    #[test]
    fn test_on_edit_shifts_without_git() {
        let (temp, mut session) = session_with_one_commit();
        let file = temp.path().join("a.txt");
        session.toggle_line(&file, 1);
        session.toggle_line(&file, 2);
        assert!(session.on_edit(&file, &EditDelta::from_change(0, 0, "new\n")));
        assert_eq!(session.lines_for(&file), Some(&[2, 3][..]));
        assert!(!session.on_edit(&temp.path().join("other.txt"), &[EditDelta::Insert {
            line: 0,
            count: 1
        }]));
    }

    #[cfg(unix)]
    #[test]
    fn test_edit_reuses_key_resolved_on_toggle() {
        let (temp, mut session) = session_with_one_commit();
        let outside = tempfile::tempdir().unwrap();
        let link = outside.path().join("link");
        std::os::unix::fs::symlink(temp.path(), &link).unwrap();
        let via_link = link.join("a.txt");

        session.toggle_line(&via_link, 1);
        assert_eq!(session.lines_for(&temp.path().join("a.txt")), Some(&[1][..]));

        // resolving again would give a different key now that the link is gone
        fs::remove_file(&link).unwrap();
        assert_ne!(session.key_for(&via_link), session.remember_key(&via_link));
        assert!(session.on_edit(&via_link, &EditDelta::from_change(0, 0, "new\n")));
        assert_eq!(session.lines_for(&via_link), Some(&[2][..]));
        assert_eq!(session.change_counts().len(), 1);
    }

    #[test]
    fn test_update_outside_worktree_is_zero() {
        let (_temp, mut session) = session_with_one_commit();
        let outside = tempfile::tempdir().unwrap();
        let stray = outside.path().join("stray.txt");
        fs::write(&stray, "x\n").unwrap();
        assert_eq!(smol::block_on(session.update_file_highlights(&stray)), 0);
    }

    #[test]
    fn test_head_change_detected_and_rebuilt() {
        let (temp, mut session) = session_with_one_commit();
        assert!(!session.head_changed());
        fs::write(temp.path().join("b.txt"), "bee\n").unwrap();
        git(temp.path(), &["add", "."]);
        git(temp.path(), &["commit", "-q", "-m", "second"]);
        session.toggle_line(&temp.path().join("a.txt"), 0);

        assert!(session.head_changed());
        assert!(smol::block_on(session.refresh_if_head_moved()));
        assert!(!session.head_changed());
        assert!(session.highlight_map().is_empty());
        assert!(session.resolver().lookup("1) second").is_some());
    }
}
