use clap::Args;
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use crate::config::Config;
use crate::error::GitVisionError;
use crate::git::repository::Repository;
use crate::highlight::blame_attributor::BlameAttributor;
use crate::highlight::commit_resolver::CommitResolver;

use super::format_ranges;
use super::terminal::TerminalNotifier;

#[derive(Args, Debug)]
pub struct BlameArgs {
    pub file: PathBuf,
    /// Commit messages whose lines are marked
    #[arg(required = true)]
    pub messages: Vec<String>,
    /// Print only the line ranges
    #[arg(long)]
    pub ranges: bool,
}

pub fn run(repo: &Repository, args: &BlameArgs) -> Result<(), GitVisionError> {
    let absolute = if args.file.is_absolute() {
        args.file.clone()
    } else {
        std::env::current_dir()?.join(&args.file)
    };
    let relative = repo.relative_path(&absolute).ok_or_else(|| {
        GitVisionError::Generic(format!(
            "{} is outside the repository at {}",
            args.file.display(),
            repo.workdir().display()
        ))
    })?;

    let options = Config::get().session_options();
    let resolver = CommitResolver::initialize(repo, &options, &TerminalNotifier::new(false));
    let watched: HashSet<String> = resolver
        .resolve(args.messages.iter().map(String::as_str))
        .into_iter()
        .collect();
    let attribution = BlameAttributor::new(repo.clone()).attribute(&relative, &watched);

    if args.ranges {
        println!("{}", format_ranges(&attribution.lines));
        return Ok(());
    }

    let contents = fs::read_to_string(repo.absolute_path(&relative))?;
    let marked: HashSet<u32> = attribution.lines.iter().copied().collect();
    for (idx, line) in contents.lines().enumerate() {
        if marked.contains(&(idx as u32)) {
            println!("\x1b[1;36m▌\x1b[0m{:>5} {}", idx + 1, line);
        } else {
            println!(" {:>5} {}", idx + 1, line);
        }
    }
    Ok(())
}
