use crate::config;
use crate::error::GitVisionError;
#[cfg(windows)]
use crate::utils::is_interactive_terminal;
use crate::utils::{normalize_to_posix, split_nul_separated};

use chrono::{DateTime, FixedOffset};
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::process::{Command, Output};

#[cfg(windows)]
use crate::utils::CREATE_NO_WINDOW;
#[cfg(windows)]
use std::os::windows::process::CommandExt;

/// Field and record separators used in our `git log` pretty formats.
const FIELD_SEP: char = '\x1f';
const RECORD_SEP: char = '\x1e';
const LOG_FORMAT: &str = "--pretty=format:%H%x1f%P%x1f%aI%x1f%s%x1e";

/// One commit as reported by `git log`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub hash: String,
    pub parents: Vec<String>,
    pub date: DateTime<FixedOffset>,
    pub subject: String,
}

/// Where HEAD points. Two states differing in either field mean every
/// previously resolved hash-to-file relationship may be stale.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HeadState {
    pub head_sha: Option<String>,
    pub refname: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Repository {
    global_args: Vec<String>,
    workdir: PathBuf,
    /// Canonical (absolute, resolved) version of workdir for reliable path comparisons
    canonical_workdir: PathBuf,
}

impl Repository {
    // Util for preparing global args for execution
    pub fn global_args_for_exec(&self) -> Vec<String> {
        let mut args = self.global_args.clone();
        if !args.iter().any(|arg| arg == "--no-pager") {
            args.push("--no-pager".to_string());
        }
        args
    }

    /// Execute an arbitrary git command and return stdout as string
    pub fn git(&self, args: &[&str]) -> Result<String, GitVisionError> {
        Ok(String::from_utf8(self.git_bytes(args)?)?)
    }

    fn git_bytes(&self, args: &[&str]) -> Result<Vec<u8>, GitVisionError> {
        let mut full_args = self.global_args_for_exec();
        full_args.extend(args.iter().map(|s| s.to_string()));
        Ok(exec_git(&full_args)?.stdout)
    }

    // Get the path of the working directory for this repository.
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Get the canonical (absolute, resolved) path of the working directory
    pub fn canonical_workdir(&self) -> &Path {
        &self.canonical_workdir
    }

    /// Convert an absolute or workdir-relative path into the `/`-separated path git uses.
    /// Returns None for paths outside the working tree.
    pub fn relative_path(&self, path: &Path) -> Option<String> {
        if path.is_relative() {
            let normalized = lexically_normalize(path);
            if normalized.as_os_str().is_empty()
                || normalized
                    .components()
                    .next()
                    .is_some_and(|c| matches!(c, Component::ParentDir))
            {
                return None;
            }
            return Some(normalize_to_posix(&normalized.to_string_lossy()));
        }

        let resolved = path
            .canonicalize()
            .unwrap_or_else(|_| lexically_normalize(path));
        let relative = resolved
            .strip_prefix(&self.canonical_workdir)
            .or_else(|_| resolved.strip_prefix(&self.workdir))
            .ok()?;
        if relative.as_os_str().is_empty() {
            return None;
        }
        Some(normalize_to_posix(&relative.to_string_lossy()))
    }

    /// Absolute on-disk path for a repository-relative path
    pub fn absolute_path(&self, relative: &str) -> PathBuf {
        self.workdir.join(relative)
    }

    /// Full history reachable from HEAD, newest first.
    pub fn log_entries(&self) -> Result<Vec<LogEntry>, GitVisionError> {
        let output = self.git(&["log", LOG_FORMAT])?;
        parse_log_output(&output)
    }

    /// Every parentless commit reachable from HEAD
    pub fn root_commits(&self) -> Result<HashSet<String>, GitVisionError> {
        let output = self.git(&["rev-list", "--max-parents=0", "HEAD"])?;
        Ok(output
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// All paths in the index, relative to the repository root
    pub fn ls_files(&self) -> Result<Vec<String>, GitVisionError> {
        let stdout = self.git_bytes(&["ls-files", "-z", "--full-name"])?;
        Ok(split_nul_separated(&stdout))
    }

    /// Files that differ between HEAD and the working tree
    pub fn diff_worktree_names(&self) -> Result<Vec<String>, GitVisionError> {
        let stdout = self.git_bytes(&["diff", "HEAD", "--name-only", "-z"])?;
        Ok(split_nul_separated(&stdout))
    }

    /// Files changed by `rev` relative to its first parent
    pub fn diff_commit_names(&self, rev: &str) -> Result<Vec<String>, GitVisionError> {
        let range = format!("{}~..{}", rev, rev);
        let stdout = self.git_bytes(&["diff", &range, "--name-only", "-z"])?;
        Ok(split_nul_separated(&stdout))
    }

    /// Files changed between `rev`'s parent and HEAD with rename detection, which
    /// reports paths under their current names.
    pub fn diff_renamed_since(
        &self,
        rev: &str,
        threshold: u8,
    ) -> Result<Vec<String>, GitVisionError> {
        let range = format!("{}~..HEAD", rev);
        let renames = format!("--find-renames={}%", threshold);
        let stdout = self.git_bytes(&["diff", &range, &renames, "--name-only", "-z"])?;
        Ok(split_nul_separated(&stdout))
    }

    /// Long commit hash of every line in the working-tree version of `path`
    pub fn blame_line_hashes(&self, path: &str) -> Result<Vec<String>, GitVisionError> {
        let stdout = self.git_bytes(&["blame", "-l", "--root", "--", path])?;
        Ok(parse_blame_hashes(&String::from_utf8_lossy(&stdout)))
    }

    /// Commits reachable from `rev` but not from its first parent, newest first.
    /// For a merge this is the merge itself plus the merged-in branch.
    pub fn merge_range_hashes(&self, rev: &str) -> Result<Vec<String>, GitVisionError> {
        let range = format!("{}^1..{}", rev, rev);
        let output = self.git(&["log", "--pretty=format:%H", &range])?;
        Ok(output
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    pub fn commit_subject(&self, rev: &str) -> Result<String, GitVisionError> {
        Ok(self.git(&["show", "-s", "--format=%s", rev])?.trim().to_string())
    }

    /// HEAD sha and symbolic ref. Both are optional: an unborn branch has no sha and
    /// a detached HEAD has no refname.
    pub fn head_state(&self) -> HeadState {
        let head_sha = self
            .git(&["rev-parse", "--verify", "-q", "HEAD"])
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let refname = self
            .git(&["symbolic-ref", "-q", "HEAD"])
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        HeadState { head_sha, refname }
    }
}

fn lexically_normalize(path: &Path) -> PathBuf {
    path.components().fold(PathBuf::new(), |mut acc, component| {
        match component {
            Component::ParentDir => {
                if !acc.pop() {
                    acc.push(component);
                }
            }
            Component::CurDir => {}
            _ => acc.push(component),
        }
        acc
    })
}

pub fn parse_log_output(output: &str) -> Result<Vec<LogEntry>, GitVisionError> {
    let mut entries = Vec::new();
    for record in output.split(RECORD_SEP) {
        let record = record.trim_start_matches(['\n', '\r']);
        if record.trim().is_empty() {
            continue;
        }
        let mut fields = record.splitn(4, FIELD_SEP);
        let (Some(hash), Some(parents), Some(date), Some(subject)) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return Err(GitVisionError::Generic(format!(
                "Malformed git log record: {:?}",
                record
            )));
        };
        let date = DateTime::parse_from_rfc3339(date.trim()).map_err(|e| {
            GitVisionError::Generic(format!("Invalid commit date '{}': {}", date, e))
        })?;
        entries.push(LogEntry {
            hash: hash.trim().to_string(),
            parents: parents.split_whitespace().map(str::to_string).collect(),
            date,
            subject: subject.trim_end().to_string(),
        });
    }
    Ok(entries)
}

/// Leading hash token of each `git blame -l` line. Boundary markers (`^`) are stripped.
pub fn parse_blame_hashes(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .map(|token| token.trim_start_matches('^').to_string())
        .collect()
}

/// Helper to execute a git command
pub fn exec_git(args: &[String]) -> Result<Output, GitVisionError> {
    let mut cmd = Command::new(config::Config::get().git_cmd());
    cmd.args(args);

    #[cfg(windows)]
    {
        if !is_interactive_terminal() {
            cmd.creation_flags(CREATE_NO_WINDOW);
        }
    }

    let output = cmd.output().map_err(GitVisionError::IoError)?;

    if !output.status.success() {
        let code = output.status.code();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        return Err(GitVisionError::GitCliError {
            code,
            stderr,
            args: args.to_vec(),
        });
    }

    Ok(output)
}

pub fn find_repository(global_args: &[String]) -> Result<Repository, GitVisionError> {
    let mut top_level_args = global_args.to_owned();
    top_level_args.push("rev-parse".to_string());
    top_level_args.push("--show-toplevel".to_string());

    let output = exec_git(&top_level_args).map_err(|e| match e {
        GitVisionError::GitCliError { .. } => {
            GitVisionError::NotARepository(command_base_dir(global_args).display().to_string())
        }
        other => other,
    })?;
    let workdir = PathBuf::from(String::from_utf8(output.stdout)?.trim());

    if workdir.as_os_str().is_empty() || !workdir.is_dir() {
        return Err(GitVisionError::NotARepository(workdir.display().to_string()));
    }

    let canonical_workdir = workdir.canonicalize().unwrap_or_else(|_| workdir.clone());

    Ok(Repository {
        global_args: vec!["-C".to_string(), workdir.to_string_lossy().to_string()],
        workdir,
        canonical_workdir,
    })
}

pub fn find_repository_in_path(path: &str) -> Result<Repository, GitVisionError> {
    let global_args = vec!["-C".to_string(), path.to_string()];
    find_repository(&global_args)
}

fn command_base_dir(global_args: &[String]) -> PathBuf {
    global_args
        .iter()
        .position(|a| a == "-C")
        .and_then(|i| global_args.get(i + 1))
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::process::Command;

    fn run_git(cwd: &Path, args: &[&str]) {
        let output = Command::new("git")
            .args(args)
            .current_dir(cwd)
            .output()
            .expect("git command should run");
        assert!(
            output.status.success(),
            "git {:?} failed:\nstdout: {}\nstderr: {}",
            args,
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
    }

    fn init_repo(dir: &Path) {
        run_git(dir, &["init", "-q"]);
        run_git(dir, &["config", "user.name", "Test User"]);
        run_git(dir, &["config", "user.email", "test@example.com"]);
    }

    #[test]
    fn test_parse_log_output_records() {
        let output = "aaa\x1f\x1f2024-03-01T10:00:00+01:00\x1finitial\x1e\n\
                      bbb\x1faaa ccc\x1f2024-03-02T10:00:00+00:00\x1fMerge branch 'x'\x1e";
        let entries = parse_log_output(output).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].hash, "aaa");
        assert!(entries[0].parents.is_empty());
        assert_eq!(entries[0].subject, "initial");
        assert_eq!(entries[1].parents, vec!["aaa".to_string(), "ccc".to_string()]);
        assert_eq!(entries[1].date.to_rfc3339(), "2024-03-02T10:00:00+00:00");
    }

    #[test]
    fn test_parse_log_output_keeps_separators_in_subject() {
        let output = "aaa\x1f\x1f2024-03-01T10:00:00+00:00\x1ffix: a - b - c\x1e";
        let entries = parse_log_output(output).unwrap();
        assert_eq!(entries[0].subject, "fix: a - b - c");
    }

    #[test]
    fn test_parse_log_output_rejects_bad_date() {
        let output = "aaa\x1f\x1fyesterday\x1fsubject\x1e";
        assert!(parse_log_output(output).is_err());
    }

    #[test]
    fn test_parse_log_output_empty() {
        assert!(parse_log_output("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_blame_hashes() {
        let output = "\
1111111111111111111111111111111111111111 (Test User 2024-01-01 10:00:00 +0000 1) one
^222222222222222222222222222222222222222 (Test User 2024-01-01 10:00:00 +0000 2) two
0000000000000000000000000000000000000000 (Not Committed Yet 2024-01-02 10:00:00 +0000 3) three
";
        assert_eq!(
            parse_blame_hashes(output),
            vec![
                "1111111111111111111111111111111111111111".to_string(),
                "222222222222222222222222222222222222222".to_string(),
                "0000000000000000000000000000000000000000".to_string(),
            ]
        );
    }

    #[test]
    fn test_lexically_normalize() {
        assert_eq!(
            lexically_normalize(Path::new("a/./b/../c")),
            PathBuf::from("a/c")
        );
        assert_eq!(lexically_normalize(Path::new("../x")), PathBuf::from("../x"));
    }

    #[test]
    fn test_find_repository_outside_repo_is_not_a_repository() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = find_repository_in_path(&temp.path().to_string_lossy()).unwrap_err();
        assert!(matches!(err, GitVisionError::NotARepository(_)));
    }

    #[test]
    fn test_repository_operations_on_small_history() {
        let temp = tempfile::tempdir().expect("tempdir");
        let dir = temp.path();
        init_repo(dir);
        fs::create_dir_all(dir.join("src")).unwrap();
        fs::write(dir.join("src/a.txt"), "one\ntwo\n").unwrap();
        run_git(dir, &["add", "."]);
        run_git(dir, &["commit", "-q", "-m", "first"]);
        fs::write(dir.join("src/a.txt"), "one\ntwo\nthree\n").unwrap();
        fs::write(dir.join("b.txt"), "bee\n").unwrap();
        run_git(dir, &["add", "."]);
        run_git(dir, &["commit", "-q", "-m", "second"]);

        let repo = find_repository_in_path(&dir.to_string_lossy()).unwrap();
        let log = repo.log_entries().unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].subject, "second");
        assert_eq!(log[1].subject, "first");

        let roots = repo.root_commits().unwrap();
        assert!(roots.contains(&log[1].hash));

        let mut files = repo.ls_files().unwrap();
        files.sort();
        assert_eq!(files, vec!["b.txt".to_string(), "src/a.txt".to_string()]);

        let mut changed = repo.diff_commit_names(&log[0].hash).unwrap();
        changed.sort();
        assert_eq!(changed, vec!["b.txt".to_string(), "src/a.txt".to_string()]);

        let blame = repo.blame_line_hashes("src/a.txt").unwrap();
        assert_eq!(blame, vec![log[1].hash.clone(), log[1].hash.clone(), log[0].hash.clone()]);

        assert_eq!(repo.commit_subject(&log[1].hash).unwrap(), "first");
        assert!(repo.diff_worktree_names().unwrap().is_empty());

        let head = repo.head_state();
        assert_eq!(head.head_sha.as_deref(), Some(log[0].hash.as_str()));
        assert!(head.refname.is_some());

        assert_eq!(
            repo.relative_path(&dir.join("src/a.txt")).as_deref(),
            Some("src/a.txt")
        );
        assert_eq!(repo.relative_path(Path::new("src/../b.txt")).as_deref(), Some("b.txt"));
        assert_eq!(repo.relative_path(Path::new("../outside.txt")), None);
    }
}
