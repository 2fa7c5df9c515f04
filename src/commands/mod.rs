pub mod blame;
pub mod highlight;
pub mod log;
pub mod session;
pub mod siblings;
pub mod terminal;

use std::collections::BTreeMap;

use crate::highlight::HighlightSession;
use crate::highlight::highlight_map::blocks;

/// Selection map (message to date) for `messages`, dated from the commit list.
/// Unknown messages are kept so the resolver can report them.
pub fn watchlist_for(session: &HighlightSession, messages: &[String]) -> BTreeMap<String, String> {
    let dates: BTreeMap<String, String> = session
        .commit_list()
        .into_iter()
        .map(|(message, date)| (message, date.map(|d| d.to_rfc3339()).unwrap_or_default()))
        .collect();
    messages
        .iter()
        .map(|m| (m.clone(), dates.get(m).cloned().unwrap_or_default()))
        .collect()
}

/// One-based, human readable line ranges: `1-5, 9, 12-13`
pub fn format_ranges(lines: &[u32]) -> String {
    blocks(lines)
        .iter()
        .map(|b| {
            if b.start == b.end {
                format!("{}", b.start + 1)
            } else {
                format!("{}-{}", b.start + 1, b.end + 1)
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}
