use clap::Args;
use serde::Serialize;

use crate::config::Config;
use crate::error::GitVisionError;
use crate::git::repository::Repository;
use crate::highlight::commit_resolver::CommitResolver;

use super::terminal::TerminalNotifier;

#[derive(Args, Debug)]
pub struct LogArgs {
    /// List merge commits too, under their plain messages
    #[arg(long)]
    pub all: bool,
    /// Only merges (diagnostic)
    #[arg(long, conflicts_with = "all")]
    pub merges: bool,
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct Listing<'a> {
    message: &'a str,
    hash: &'a str,
    date: Option<String>,
    is_merge: bool,
}

pub fn run(repo: &Repository, args: &LogArgs) -> Result<(), GitVisionError> {
    let mut options = Config::get().session_options();
    if args.all {
        options.trim_merges = false;
    }
    if args.merges {
        options.trim_merges = true;
        options.merges_only = true;
    }

    let resolver = CommitResolver::initialize(repo, &options, &TerminalNotifier::new(false));
    if args.json {
        let listings: Vec<Listing> = resolver
            .records()
            .map(|r| Listing {
                message: &r.message,
                hash: &r.hash,
                date: r.date.map(|d| d.to_rfc3339()),
                is_merge: r.is_merge,
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&listings)?);
        return Ok(());
    }

    for record in resolver.records() {
        let date = record
            .date
            .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        let short = record.hash.get(..8).unwrap_or(&record.hash);
        println!("\x1b[33m{}\x1b[0m  {:<16}  {}", short, date, record.message);
    }
    Ok(())
}
