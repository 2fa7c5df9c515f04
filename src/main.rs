use clap::{Parser, Subcommand};
use std::path::PathBuf;

use git_vision::commands::{blame, highlight, log, session, siblings};
use git_vision::config::Config;
use git_vision::error::GitVisionError;
use git_vision::git::find_repository_in_path;

#[derive(Parser)]
#[command(name = "git-vision")]
#[command(version, about = "Highlight the lines a set of commits is still responsible for", long_about = None)]
struct Cli {
    /// Run as if started in this directory
    #[arg(short = 'C', long = "repo", global = true)]
    repo: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List selectable commit messages, newest first
    Log(log::LogArgs),
    /// Blame every file the selected commits touched
    Highlight(highlight::HighlightArgs),
    /// Show the commits a merge brought in
    Siblings(siblings::SiblingsArgs),
    /// Print one file with the selected commits' lines marked
    Blame(blame::BlameArgs),
    /// Serve JSON-lines requests on stdin for an editor
    Session(session::SessionArgs),
}

fn main() {
    let cli = Cli::parse();
    Config::init();

    if let Err(e) = run(&cli) {
        eprintln!("git-vision: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), GitVisionError> {
    let start = match &cli.repo {
        Some(dir) => dir.clone(),
        None => std::env::current_dir()?,
    };
    let repo = find_repository_in_path(&start.to_string_lossy())?;

    match &cli.command {
        Command::Log(args) => log::run(&repo, args),
        Command::Highlight(args) => highlight::run(&repo, args),
        Command::Siblings(args) => siblings::run(&repo, args),
        Command::Blame(args) => blame::run(&repo, args),
        Command::Session(args) => session::run(&repo, args),
    }
}
