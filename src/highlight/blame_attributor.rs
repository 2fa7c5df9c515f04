use std::collections::HashSet;

use crate::git::repository::Repository;
use crate::utils::debug_log;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attribution {
    /// Zero-based, ascending
    pub lines: Vec<u32>,
    pub count: usize,
}

impl Attribution {
    /// Lines whose blamed hash is watched. `line_hashes[i]` belongs to line `i`.
    pub fn from_line_hashes(line_hashes: &[String], watched: &HashSet<String>) -> Attribution {
        let lines: Vec<u32> = line_hashes
            .iter()
            .enumerate()
            .filter(|(_, hash)| watched.contains(hash.as_str()))
            .map(|(idx, _)| idx as u32)
            .collect();
        Attribution {
            count: lines.len(),
            lines,
        }
    }
}

#[derive(Clone)]
pub struct BlameAttributor {
    repo: Repository,
}

impl BlameAttributor {
    pub fn new(repo: Repository) -> Self {
        BlameAttributor { repo }
    }

    /// Blame the working-tree version of `file` (repository-relative). Failures
    /// such as binary or vanished files give an empty attribution.
    pub fn attribute(&self, file: &str, watched: &HashSet<String>) -> Attribution {
        if watched.is_empty() {
            return Attribution::default();
        }
        match self.repo.blame_line_hashes(file) {
            Ok(line_hashes) => Attribution::from_line_hashes(&line_hashes, watched),
            Err(e) => {
                debug_log(&format!("error getting blame for file {}: {}", file, e));
                Attribution::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hashes(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_from_line_hashes_keeps_watched_lines() {
        let watched: HashSet<String> = ["aa".to_string(), "cc".to_string()].into();
        let attribution =
            Attribution::from_line_hashes(&hashes(&["aa", "bb", "cc", "aa", "dd"]), &watched);
        assert_eq!(attribution.lines, vec![0, 2, 3]);
        assert_eq!(attribution.count, 3);
    }

    #[test]
    fn test_from_line_hashes_nothing_watched() {
        let attribution = Attribution::from_line_hashes(&hashes(&["aa"]), &HashSet::new());
        assert_eq!(attribution, Attribution::default());
    }
}
