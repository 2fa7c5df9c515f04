use std::io::IsTerminal;
use std::time::Instant;

/// Check if debug logging is enabled via environment variable
///
/// This is checked once at first use to avoid repeated environment variable lookups.
static DEBUG_ENABLED: std::sync::OnceLock<bool> = std::sync::OnceLock::new();
static DEBUG_PERFORMANCE_ENABLED: std::sync::OnceLock<bool> = std::sync::OnceLock::new();
static IS_TERMINAL: std::sync::OnceLock<bool> = std::sync::OnceLock::new();

fn is_debug_enabled() -> bool {
    *DEBUG_ENABLED.get_or_init(|| {
        (cfg!(debug_assertions) || std::env::var("GIT_VISION_DEBUG").unwrap_or_default() == "1")
            && std::env::var("GIT_VISION_DEBUG").unwrap_or_default() != "0"
    })
}

fn is_debug_performance_enabled() -> bool {
    *DEBUG_PERFORMANCE_ENABLED.get_or_init(|| {
        !std::env::var("GIT_VISION_DEBUG_PERFORMANCE")
            .unwrap_or_default()
            .is_empty()
    })
}

/// Debug logging utility function
///
/// Prints debug messages with a colored prefix when debug assertions are enabled or when
/// the `GIT_VISION_DEBUG` environment variable is set to "1". `GIT_VISION_DEBUG=0`
/// silences debug builds too.
pub fn debug_log(msg: &str) {
    if is_debug_enabled() {
        eprintln!("\x1b[1;33m[git-vision]\x1b[0m {}", msg);
    }
}

pub fn debug_performance_log(msg: &str) {
    if is_debug_performance_enabled() {
        eprintln!("\x1b[1;33m[git-vision (perf)]\x1b[0m {}", msg);
    }
}

/// Logs how long a labelled phase took once dropped
pub struct PhaseTimer {
    label: String,
    started: Instant,
}

impl PhaseTimer {
    pub fn start(label: impl Into<String>) -> Self {
        PhaseTimer {
            label: label.into(),
            started: Instant::now(),
        }
    }
}

impl Drop for PhaseTimer {
    fn drop(&mut self) {
        debug_performance_log(&format!(
            "{} took {}ms",
            self.label,
            self.started.elapsed().as_millis()
        ));
    }
}

#[inline]
pub fn normalize_to_posix(path: &str) -> String {
    path.replace('\\', "/")
}

pub fn is_interactive_terminal() -> bool {
    *IS_TERMINAL.get_or_init(|| std::io::stdin().is_terminal())
}

/// Windows-specific flag to prevent console window creation
#[cfg(windows)]
pub const CREATE_NO_WINDOW: u32 = 0x08000000;

/// Split NUL-separated git output (`-z`) into owned UTF-8 strings, dropping empties
/// and anything that is not valid UTF-8.
pub fn split_nul_separated(bytes: &[u8]) -> Vec<String> {
    bytes
        .split(|&b| b == 0)
        .filter(|bytes| !bytes.is_empty())
        .filter_map(|bytes| String::from_utf8(bytes.to_vec()).ok())
        .collect()
}

/// Final path component of a repository-relative, `/`-separated path
pub fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_to_posix() {
        assert_eq!(normalize_to_posix(r"src\git\mod.rs"), "src/git/mod.rs");
        assert_eq!(normalize_to_posix("already/posix.rs"), "already/posix.rs");
    }

    #[test]
    fn test_split_nul_separated_drops_trailing_empty() {
        let out = b"a.txt\0dir/b.txt\0\0";
        assert_eq!(
            split_nul_separated(out),
            vec!["a.txt".to_string(), "dir/b.txt".to_string()]
        );
    }

    #[test]
    fn test_split_nul_separated_keeps_utf8_names() {
        let out = "中文.txt\0".as_bytes();
        assert_eq!(split_nul_separated(out), vec!["中文.txt".to_string()]);
    }

    #[test]
    fn test_basename() {
        assert_eq!(basename("src/highlight/gate.rs"), "gate.rs");
        assert_eq!(basename("README.md"), "README.md");
        assert_eq!(basename("trailing/"), "");
    }
}
