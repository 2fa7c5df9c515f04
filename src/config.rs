use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use glob::Pattern;
use serde::{Deserialize, Serialize};

use crate::highlight::color::HighlightColor;
use crate::highlight::options::SessionOptions;
use crate::utils::debug_log;

pub const DEFAULT_RENAME_THRESHOLD: u8 = 70;
pub const DEFAULT_MAX_FILES_PER_COMMIT: usize = 100;
pub const DEFAULT_LARGE_CHANGE_SET_THRESHOLD: usize = 100;
pub const DEFAULT_MAX_CONCURRENT_GIT: usize = 10;
pub const DEFAULT_RENDER_WINDOW: Duration = Duration::from_millis(300);
pub const DEFAULT_HIGHLIGHT_COLOR: &str = "rgba(79, 190, 255, 0.15)";

pub struct Config {
    git_path: String,
    trim_merges: bool,
    merges_only: bool,
    find_renamed_files: bool,
    rename_threshold: u8,
    bundle_merged_branches: bool,
    max_files_per_commit: usize,
    large_change_set_threshold: usize,
    max_concurrent_git: usize,
    realtime_highlighting: bool,
    render_window: Duration,
    highlight_color: HighlightColor,
    exclude_paths: Vec<Pattern>,
}

#[derive(Deserialize, Serialize, Default, Debug, Clone)]
pub struct FileConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trim_merges: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merges_only: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub find_renamed_files: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rename_threshold: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle_merged_branches: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_files_per_commit: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub large_change_set_threshold: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent_git: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realtime_highlighting: Option<bool>,
    /// Human readable duration, e.g. "300ms"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub render_window: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlight_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_paths: Option<Vec<String>>,
}

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Serializable config patch for test overrides
/// All fields are optional to allow patching only specific properties
#[cfg(any(test, feature = "test-support"))]
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConfigPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trim_merges: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub find_renamed_files: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle_merged_branches: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub large_change_set_threshold: Option<usize>,
}

#[cfg(any(test, feature = "test-support"))]
impl ConfigPatch {
    /// Apply the patch to an options snapshot directly, for in-process sessions
    pub fn apply_to(&self, options: &mut SessionOptions) {
        if let Some(trim_merges) = self.trim_merges {
            options.trim_merges = trim_merges;
        }
        if let Some(find_renamed_files) = self.find_renamed_files {
            options.find_renamed_files = find_renamed_files;
        }
        if let Some(bundle) = self.bundle_merged_branches {
            options.bundle_merged_branches = bundle;
        }
        if let Some(threshold) = self.large_change_set_threshold {
            options.large_change_set_threshold = threshold;
        }
    }
}

impl Config {
    /// Initialize the global configuration exactly once.
    /// Safe to call multiple times; subsequent calls are no-ops.
    pub fn init() {
        let _ = CONFIG.get_or_init(build_config);
    }

    /// Access the global configuration. Lazily initializes if not already initialized.
    pub fn get() -> &'static Config {
        CONFIG.get_or_init(build_config)
    }

    /// Returns the command to invoke git.
    pub fn git_cmd(&self) -> &str {
        &self.git_path
    }

    pub fn realtime_highlighting(&self) -> bool {
        self.realtime_highlighting
    }

    pub fn render_window(&self) -> Duration {
        self.render_window
    }

    pub fn highlight_color(&self) -> &HighlightColor {
        &self.highlight_color
    }

    /// Snapshot of everything a highlight session needs, so sessions never read
    /// the global config mid-run.
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            trim_merges: self.trim_merges,
            merges_only: self.merges_only,
            find_renamed_files: self.find_renamed_files,
            rename_threshold: self.rename_threshold,
            bundle_merged_branches: self.bundle_merged_branches,
            max_files_per_commit: self.max_files_per_commit,
            large_change_set_threshold: self.large_change_set_threshold,
            max_concurrent_git: self.max_concurrent_git,
            exclude_paths: self.exclude_paths.clone(),
        }
    }
}

fn build_config() -> Config {
    let file_cfg = load_file_config();
    #[allow(unused_mut)]
    let mut config = build_config_from(file_cfg.as_ref());

    #[cfg(any(test, feature = "test-support"))]
    apply_test_config_patch(&mut config);

    config
}

fn build_config_from(file_cfg: Option<&FileConfig>) -> Config {
    let exclude_paths = file_cfg
        .and_then(|c| c.exclude_paths.clone())
        .unwrap_or_default()
        .into_iter()
        .filter_map(|pattern_str| {
            Pattern::new(&pattern_str)
                .map_err(|e| {
                    eprintln!(
                        "Warning: Invalid glob pattern in exclude_paths '{}': {}",
                        pattern_str, e
                    );
                })
                .ok()
        })
        .collect();

    let rename_threshold = file_cfg
        .and_then(|c| c.rename_threshold)
        .map(|t| t.min(100))
        .unwrap_or(DEFAULT_RENAME_THRESHOLD);

    // A zero-permit semaphore would deadlock every fan-out
    let max_concurrent_git = env::var("GIT_VISION_MAX_CONCURRENT")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .or_else(|| file_cfg.and_then(|c| c.max_concurrent_git))
        .unwrap_or(DEFAULT_MAX_CONCURRENT_GIT)
        .max(1);

    let render_window = env::var("GIT_VISION_RENDER_WINDOW")
        .ok()
        .or_else(|| file_cfg.and_then(|c| c.render_window.clone()))
        .and_then(|raw| match humantime::parse_duration(raw.trim()) {
            Ok(d) => Some(d),
            Err(e) => {
                eprintln!("Warning: Invalid render_window '{}': {}", raw, e);
                None
            }
        })
        .unwrap_or(DEFAULT_RENDER_WINDOW);

    let highlight_color = file_cfg
        .and_then(|c| c.highlight_color.as_deref())
        .and_then(|raw| {
            let parsed = HighlightColor::parse(raw);
            if parsed.is_none() {
                eprintln!("Warning: Invalid highlight_color '{}', using default", raw);
            }
            parsed
        })
        .unwrap_or_default();

    Config {
        git_path: resolve_git_path(file_cfg),
        trim_merges: file_cfg.and_then(|c| c.trim_merges).unwrap_or(true),
        merges_only: file_cfg.and_then(|c| c.merges_only).unwrap_or(false),
        find_renamed_files: file_cfg
            .and_then(|c| c.find_renamed_files)
            .unwrap_or(false),
        rename_threshold,
        bundle_merged_branches: file_cfg
            .and_then(|c| c.bundle_merged_branches)
            .unwrap_or(false),
        max_files_per_commit: file_cfg
            .and_then(|c| c.max_files_per_commit)
            .unwrap_or(DEFAULT_MAX_FILES_PER_COMMIT),
        large_change_set_threshold: file_cfg
            .and_then(|c| c.large_change_set_threshold)
            .unwrap_or(DEFAULT_LARGE_CHANGE_SET_THRESHOLD),
        max_concurrent_git,
        realtime_highlighting: file_cfg
            .and_then(|c| c.realtime_highlighting)
            .unwrap_or(true),
        render_window,
        highlight_color,
        exclude_paths,
    }
}

fn resolve_git_path(file_cfg: Option<&FileConfig>) -> String {
    // 1) Environment override
    if let Ok(path) = env::var("GIT_VISION_GIT_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    // 2) From config file
    if let Some(path) = file_cfg.and_then(|cfg| cfg.git_path.as_ref()) {
        let trimmed = path.trim();
        if !trimmed.is_empty() && is_executable(Path::new(trimmed)) {
            return trimmed.to_string();
        }
        debug_log(&format!(
            "Configured git_path '{}' is not a file, falling back to PATH lookup",
            trimmed
        ));
    }

    // 3) Let the OS resolve it from PATH
    "git".to_string()
}

fn load_file_config() -> Option<FileConfig> {
    let path = config_file_path()?;
    let data = fs::read(&path).ok()?;
    match serde_json::from_slice::<FileConfig>(&data) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            eprintln!(
                "Warning: Ignoring unparseable config file {}: {}",
                path.display(),
                e
            );
            None
        }
    }
}

pub fn config_file_path() -> Option<PathBuf> {
    let home = dirs::home_dir()?;
    Some(home.join(".git-vision").join("config.json"))
}

fn is_executable(path: &Path) -> bool {
    // Existence is sufficient for our purposes; the OS enforces exec perms.
    path.exists() && path.is_file()
}

/// Apply test config patch from environment variable (test-only)
/// Reads GIT_VISION_TEST_CONFIG_PATCH env var containing JSON and applies patches to config
#[cfg(any(test, feature = "test-support"))]
fn apply_test_config_patch(config: &mut Config) {
    if let Ok(patch_json) = env::var("GIT_VISION_TEST_CONFIG_PATCH")
        && let Ok(patch) = serde_json::from_str::<ConfigPatch>(&patch_json)
    {
        if let Some(trim_merges) = patch.trim_merges {
            config.trim_merges = trim_merges;
        }
        if let Some(find_renamed_files) = patch.find_renamed_files {
            config.find_renamed_files = find_renamed_files;
        }
        if let Some(bundle) = patch.bundle_merged_branches {
            config.bundle_merged_branches = bundle;
        }
        if let Some(threshold) = patch.large_change_set_threshold {
            config.large_change_set_threshold = threshold;
        }
    }
}
