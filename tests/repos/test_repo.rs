#![allow(dead_code)]

use git_vision::config::ConfigPatch;
use git_vision::git::find_repository_in_path;
use git_vision::git::repository::Repository as VisionRepository;
use git_vision::highlight::HighlightSession;
use git_vision::highlight::collaborators::{NoProgress, RecordingNotifier, RecordingProgress};
use git_vision::highlight::options::SessionOptions;
use git2::Repository;
use rand::Rng;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

#[derive(Debug)]
pub struct TestRepo {
    path: PathBuf,
    pub(crate) config_patch: Option<ConfigPatch>,
}

impl Default for TestRepo {
    fn default() -> Self {
        Self::new()
    }
}

impl TestRepo {
    pub fn new() -> Self {
        let mut rng = rand::thread_rng();
        let n: u64 = rng.gen_range(0..10000000000);
        let path = std::env::temp_dir().join(format!("git-vision-{}", n));
        let repo = Repository::init(&path).expect("failed to initialize git2 repository");
        let mut config = Repository::config(&repo).expect("failed to open repository config");
        config
            .set_str("user.name", "Test User")
            .expect("failed to set user.name");
        config
            .set_str("user.email", "test@example.com")
            .expect("failed to set user.email");

        Self {
            path,
            config_patch: None,
        }
    }

    /// Patch the session options used by this test repo, both for in-process
    /// sessions and for the binary (via `GIT_VISION_TEST_CONFIG_PATCH`).
    pub fn patch_config<F>(&mut self, f: F)
    where
        F: FnOnce(&mut ConfigPatch),
    {
        let mut patch = self.config_patch.take().unwrap_or_default();
        f(&mut patch);
        self.config_patch = Some(patch);
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn canonical_path(&self) -> PathBuf {
        self.path
            .canonicalize()
            .expect("failed to canonicalize test repo path")
    }

    pub fn git(&self, args: &[&str]) -> Result<String, String> {
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.path)
            .args(args)
            .output()
            .unwrap_or_else(|_| panic!("Failed to execute git command: {:?}", args));
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if output.status.success() {
            Ok(stdout)
        } else {
            Err(stderr)
        }
    }

    pub fn write_file(&self, name: &str, contents: &str) -> PathBuf {
        let file = self.path.join(name);
        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent).expect("failed to create parent directories");
        }
        fs::write(&file, contents).expect("failed to write file");
        file
    }

    pub fn read_file(&self, name: &str) -> Option<String> {
        fs::read_to_string(self.path.join(name)).ok()
    }

    /// Stage everything and commit. Returns the new commit's hash.
    pub fn commit(&self, message: &str) -> String {
        self.git(&["add", "-A"]).expect("git add should succeed");
        self.git(&["commit", "-q", "-m", message])
            .expect("git commit should succeed");
        self.head_sha()
    }

    pub fn head_sha(&self) -> String {
        self.git(&["rev-parse", "HEAD"])
            .expect("HEAD should resolve")
            .trim()
            .to_string()
    }

    pub fn current_branch(&self) -> String {
        self.git(&["branch", "--show-current"])
            .unwrap()
            .trim()
            .to_string()
    }

    pub fn switch_new(&self, branch: &str) {
        self.git(&["switch", "-q", "-c", branch])
            .expect("git switch -c should succeed");
    }

    pub fn switch(&self, branch: &str) {
        self.git(&["switch", "-q", branch])
            .expect("git switch should succeed");
    }

    /// Non fast-forward merge of `branch` into the current branch
    pub fn merge(&self, branch: &str, message: &str) -> String {
        self.git(&["merge", "-q", "--no-ff", "-m", message, branch])
            .expect("git merge should succeed");
        self.head_sha()
    }

    pub fn repository(&self) -> VisionRepository {
        find_repository_in_path(&self.path.to_string_lossy()).expect("test repo should be found")
    }

    pub fn session_options(&self) -> SessionOptions {
        let mut options = SessionOptions::default();
        if let Some(patch) = &self.config_patch {
            patch.apply_to(&mut options);
        }
        options
    }

    /// Open an in-process session whose confirmations answer `confirm_answer`
    pub fn open_session(&self, confirm_answer: bool) -> (HighlightSession, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::new(confirm_answer));
        let session = HighlightSession::open(
            self.repository(),
            self.session_options(),
            notifier.clone(),
            Arc::new(NoProgress),
        );
        (session, notifier)
    }

    /// Open an in-process session that records every progress tick
    pub fn open_session_with_progress(&self) -> (HighlightSession, Arc<RecordingProgress>) {
        let progress = Arc::new(RecordingProgress::default());
        let session = HighlightSession::open(
            self.repository(),
            self.session_options(),
            Arc::new(RecordingNotifier::new(true)),
            progress.clone(),
        );
        (session, progress)
    }

    /// `git-vision` invocation rooted at this repo
    pub fn git_vision_cmd(&self) -> assert_cmd::Command {
        let mut command =
            assert_cmd::Command::cargo_bin("git-vision").expect("git-vision binary should build");
        command.current_dir(&self.path);
        if let Some(patch) = &self.config_patch
            && let Ok(patch_json) = serde_json::to_string(patch)
        {
            command.env("GIT_VISION_TEST_CONFIG_PATCH", patch_json);
        }
        command
    }

    pub fn git_vision(&self, args: &[&str]) -> Result<String, String> {
        let output = self
            .git_vision_cmd()
            .args(args)
            .output()
            .unwrap_or_else(|_| panic!("Failed to execute git-vision command: {:?}", args));
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if output.status.success() {
            Ok(stdout)
        } else {
            Err(stderr)
        }
    }

    pub fn file_key(&self, session: &HighlightSession, name: &str) -> String {
        session.key_for(Path::new(name)).to_string()
    }
}

impl Drop for TestRepo {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}
