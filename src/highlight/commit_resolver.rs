use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::error::GitVisionError;
use crate::git::repository::{LogEntry, Repository};
use crate::highlight::collaborators::Notifier;
use crate::highlight::options::SessionOptions;
use crate::utils::debug_log;

/// Blame reports lines that are not committed yet under this hash
pub const UNCOMMITTED_HASH: &str = "0000000000000000000000000000000000000000";
pub const UNCOMMITTED_MESSAGE: &str = "Uncommitted changes";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitRecord {
    pub hash: String,
    /// Selection key. Numbered (`"3) fix parser"`) when merges are trimmed.
    pub message: String,
    /// None only for the uncommitted-changes entry
    pub date: Option<DateTime<FixedOffset>>,
    pub is_merge: bool,
    pub parents: Vec<String>,
}

impl CommitRecord {
    fn uncommitted() -> Self {
        CommitRecord {
            hash: UNCOMMITTED_HASH.to_string(),
            message: UNCOMMITTED_MESSAGE.to_string(),
            date: None,
            is_merge: false,
            parents: Vec::new(),
        }
    }

    fn from_entry(entry: LogEntry) -> Self {
        CommitRecord {
            is_merge: entry.parents.len() > 1,
            hash: entry.hash,
            message: entry.subject,
            date: Some(entry.date),
            parents: entry.parents,
        }
    }
}

/// Message-keyed view of the repository history, built once per session.
pub struct CommitResolver {
    repo: Option<Repository>,
    /// Selectable records, uncommitted entry first, then log order
    records: Vec<CommitRecord>,
    by_message: HashMap<String, usize>,
    by_hash: HashMap<String, usize>,
    /// Undecorated record for every commit in the log, selectable or not
    history: HashMap<String, CommitRecord>,
}

impl CommitResolver {
    /// Read the full log. Failure leaves an empty index and tells the user.
    pub fn initialize(
        repo: &Repository,
        options: &SessionOptions,
        notifier: &dyn Notifier,
    ) -> CommitResolver {
        match repo.log_entries() {
            Ok(entries) => {
                let mut resolver = CommitResolver::from_log(entries, options);
                resolver.repo = Some(repo.clone());
                resolver
            }
            Err(e) => {
                debug_log(&format!("git log failed: {}", e));
                notifier.error("Error getting git log");
                CommitResolver::empty()
            }
        }
    }

    fn empty() -> CommitResolver {
        CommitResolver {
            repo: None,
            records: Vec::new(),
            by_message: HashMap::new(),
            by_hash: HashMap::new(),
            history: HashMap::new(),
        }
    }

    /// Build the index from already parsed log entries (newest first)
    pub fn from_log(entries: Vec<LogEntry>, options: &SessionOptions) -> CommitResolver {
        let mut resolver = CommitResolver::empty();
        resolver.push(CommitRecord::uncommitted());

        let mut ordinal = 0usize;
        let mut merges_ignored = 0usize;
        for entry in entries {
            let raw = CommitRecord::from_entry(entry);
            resolver.history.insert(raw.hash.clone(), raw.clone());

            if !options.trim_merges {
                resolver.push(raw);
                continue;
            }
            let keep = if options.merges_only {
                raw.is_merge
            } else {
                !raw.is_merge
            };
            if keep {
                ordinal += 1;
                let message = format!("{}) {}", ordinal, raw.message);
                resolver.push(CommitRecord { message, ..raw });
            } else {
                merges_ignored += 1;
            }
        }

        if options.trim_merges && !options.merges_only {
            debug_log(&format!(
                "{} merge commits removed from the commit list",
                merges_ignored
            ));
        }
        resolver
    }

    // Later records win the message slot, matching a plain map insert in log order
    fn push(&mut self, record: CommitRecord) {
        let idx = self.records.len();
        if let Some(previous) = self.by_message.insert(record.message.clone(), idx) {
            debug_log(&format!(
                "duplicate commit message '{}': {} replaces {}",
                record.message, record.hash, self.records[previous].hash
            ));
        }
        self.by_hash.insert(record.hash.clone(), idx);
        self.records.push(record);
    }

    pub fn is_empty(&self) -> bool {
        self.by_message.is_empty()
    }

    /// Every selectable record in index order
    pub fn records(&self) -> impl Iterator<Item = &CommitRecord> {
        self.records
            .iter()
            .enumerate()
            .filter(|(idx, r)| self.by_message.get(&r.message) == Some(idx))
            .map(|(_, r)| r)
    }

    pub fn lookup(&self, message: &str) -> Option<&CommitRecord> {
        self.by_message.get(message).map(|&idx| &self.records[idx])
    }

    pub fn record_for_hash(&self, hash: &str) -> Option<&CommitRecord> {
        self.by_hash
            .get(hash)
            .map(|&idx| &self.records[idx])
            .or_else(|| self.history.get(hash))
    }

    /// Hashes for `messages` in first-seen order. Unknown messages are skipped.
    pub fn resolve<'m, I>(&self, messages: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'m str>,
    {
        let mut seen = HashSet::new();
        let mut hashes = Vec::new();
        for message in messages {
            match self.lookup(message) {
                Some(record) => {
                    if seen.insert(record.hash.clone()) {
                        hashes.push(record.hash.clone());
                    }
                }
                None => debug_log(&format!("no commit found for message '{}'", message)),
            }
        }
        hashes
    }

    /// `message -> date` pairs for the commit list, in index order
    pub fn commit_list(&self) -> Vec<(String, Option<DateTime<FixedOffset>>)> {
        self.records()
            .map(|r| (r.message.clone(), r.date))
            .collect()
    }

    /// The commits `hash` brought in relative to its first parent, itself included.
    pub fn siblings_of(&self, hash: &str) -> Vec<CommitRecord> {
        let Some(repo) = &self.repo else {
            return Vec::new();
        };
        let hashes = match repo.merge_range_hashes(hash) {
            Ok(hashes) => hashes,
            Err(e) => {
                debug_log(&format!("could not list commits merged by {}: {}", hash, e));
                return Vec::new();
            }
        };
        hashes
            .into_iter()
            .filter_map(|h| match self.record_for_hash(&h) {
                Some(record) => Some(record.clone()),
                None => self.record_from_show(repo, &h).ok(),
            })
            .collect()
    }

    fn record_from_show(
        &self,
        repo: &Repository,
        hash: &str,
    ) -> Result<CommitRecord, GitVisionError> {
        let subject = repo.commit_subject(hash)?;
        Ok(CommitRecord {
            hash: hash.to_string(),
            message: subject,
            date: None,
            is_merge: false,
            parents: Vec::new(),
        })
    }
}
