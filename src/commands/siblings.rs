use clap::Args;
use std::sync::Arc;

use crate::config::Config;
use crate::error::GitVisionError;
use crate::git::repository::Repository;
use crate::highlight::HighlightSession;
use crate::highlight::collaborators::NoProgress;

use super::terminal::TerminalNotifier;

#[derive(Args, Debug)]
pub struct SiblingsArgs {
    /// Message of a merge commit as listed by `git-vision log`
    pub message: String,
    #[arg(long)]
    pub json: bool,
}

pub fn run(repo: &Repository, args: &SiblingsArgs) -> Result<(), GitVisionError> {
    let session = HighlightSession::open(
        repo.clone(),
        Config::get().session_options(),
        Arc::new(TerminalNotifier::new(false)),
        Arc::new(NoProgress),
    );
    if session.resolver().lookup(&args.message).is_none() {
        return Err(GitVisionError::Generic(format!(
            "no commit found for message '{}'",
            args.message
        )));
    }

    let siblings = smol::block_on(session.siblings_for_message(&args.message));
    if args.json {
        println!("{}", serde_json::to_string_pretty(&siblings)?);
        return Ok(());
    }
    for record in &siblings {
        let short = record.hash.get(..8).unwrap_or(&record.hash);
        println!("\x1b[33m{}\x1b[0m  {}", short, record.message);
    }
    Ok(())
}
