use clap::Args;
use serde::Serialize;
use std::io::IsTerminal;
use std::sync::Arc;

use crate::config::Config;
use crate::error::GitVisionError;
use crate::git::repository::Repository;
use crate::highlight::HighlightSession;
use crate::highlight::aggregator::AddCommitsReport;
use crate::highlight::collaborators::{NoProgress, ProgressSink};
use crate::highlight::highlight_map::{LineBlock, blocks};

use super::terminal::{BarProgress, TerminalNotifier, print_success};
use super::{format_ranges, watchlist_for};

#[derive(Args, Debug)]
pub struct HighlightArgs {
    /// Commit messages exactly as `git-vision log` prints them
    #[arg(required = true)]
    pub messages: Vec<String>,
    /// Also watch the commits each selected merge brought in
    #[arg(long)]
    pub bundle: bool,
    /// Follow files renamed since the commit
    #[arg(long)]
    pub renames: bool,
    #[arg(long)]
    pub json: bool,
    /// Process large change sets without asking
    #[arg(short = 'y', long)]
    pub yes: bool,
}

#[derive(Serialize)]
struct FileHighlights<'a> {
    file: &'a str,
    count: usize,
    lines: &'a [u32],
    blocks: Vec<LineBlock>,
}

#[derive(Serialize)]
struct HighlightOutput<'a> {
    report: &'a AddCommitsReport,
    files: Vec<FileHighlights<'a>>,
}

pub fn run(repo: &Repository, args: &HighlightArgs) -> Result<(), GitVisionError> {
    let mut options = Config::get().session_options();
    if args.bundle {
        options.bundle_merged_branches = true;
    }
    if args.renames {
        options.find_renamed_files = true;
    }

    let progress: Arc<dyn ProgressSink> = if args.json || !std::io::stderr().is_terminal() {
        Arc::new(NoProgress)
    } else {
        Arc::new(BarProgress::new())
    };
    let mut session = HighlightSession::open(
        repo.clone(),
        options,
        Arc::new(TerminalNotifier::new(args.yes)),
        progress,
    );

    let watchlist = watchlist_for(&session, &args.messages);
    let report = smol::block_on(session.add_commits(&watchlist));

    let counts = session.change_counts();
    let files: Vec<FileHighlights> = session
        .highlight_map()
        .iter()
        .map(|(key, lines)| FileHighlights {
            file: key.as_str(),
            count: counts.get(key).copied().unwrap_or(lines.len()),
            lines,
            blocks: blocks(lines),
        })
        .collect();

    if args.json {
        let output = HighlightOutput {
            report: &report,
            files,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if report.cancelled {
        eprintln!("Cancelled: no highlights computed");
        return Ok(());
    }
    let workdir = session.repository().canonical_workdir().to_string_lossy().replace('\\', "/");
    for file in &files {
        let shown = file
            .file
            .strip_prefix(workdir.as_str())
            .map(|p| p.trim_start_matches('/'))
            .unwrap_or(file.file);
        println!("{:>6}  {}  \x1b[90m{}\x1b[0m", file.count, shown, format_ranges(file.lines));
    }
    print_success(&format!(
        "{} commits watched, {} lines in {} files",
        report.watched, report.total_lines, report.highlighted_files
    ));
    Ok(())
}
