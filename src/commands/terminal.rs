use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, BufRead, IsTerminal, Write};
use std::sync::Mutex;

use crate::highlight::collaborators::{Notifier, ProgressSink};
use crate::utils::is_interactive_terminal;

/// Notices on stderr, confirmations read from the controlling terminal
pub struct TerminalNotifier {
    assume_yes: bool,
}

impl TerminalNotifier {
    pub fn new(assume_yes: bool) -> Self {
        TerminalNotifier { assume_yes }
    }
}

impl Notifier for TerminalNotifier {
    fn info(&self, message: &str) {
        eprintln!("\x1b[1;36mi\x1b[0m {}", message);
    }

    fn error(&self, message: &str) {
        eprintln!("\x1b[1;31m✗ {}\x1b[0m", message);
    }

    fn confirm(&self, message: &str) -> bool {
        if self.assume_yes {
            return true;
        }
        if !is_interactive_terminal() {
            eprintln!("{} (pass --yes to proceed non-interactively)", message);
            return false;
        }
        eprint!("\x1b[1;33m⚠ {}\x1b[0m [y/N] ", message);
        let _ = io::stderr().flush();
        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }
}

const BAR_RESOLUTION: u64 = 1000;

/// Progress bar on stderr, hidden when stderr is not a terminal
pub struct BarProgress {
    bar: Mutex<Option<ProgressBar>>,
    done: Mutex<f64>,
}

impl Default for BarProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl BarProgress {
    pub fn new() -> Self {
        BarProgress {
            bar: Mutex::new(None),
            done: Mutex::new(0.0),
        }
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        if let Ok(guard) = self.bar.lock()
            && let Some(bar) = guard.as_ref()
        {
            f(bar);
        }
    }
}

impl ProgressSink for BarProgress {
    fn start(&self, title: &str, total: usize) {
        if !io::stderr().is_terminal() {
            return;
        }
        let bar = ProgressBar::new(BAR_RESOLUTION);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} {msg} [{bar:30.cyan/blue}] {percent}%")
        {
            bar.set_style(style.progress_chars("=> "));
        }
        bar.set_message(format!("{} ({} files)", title, total));
        if let Ok(mut done) = self.done.lock() {
            *done = 0.0;
        }
        if let Ok(mut guard) = self.bar.lock() {
            *guard = Some(bar);
        }
    }

    fn advance(&self, fraction: f64) {
        let position = match self.done.lock() {
            Ok(mut done) => {
                *done = (*done + fraction).min(1.0);
                (*done * BAR_RESOLUTION as f64).round() as u64
            }
            Err(_) => return,
        };
        self.with_bar(|bar| bar.set_position(position));
    }

    fn finish(&self) {
        if let Ok(mut guard) = self.bar.lock()
            && let Some(bar) = guard.take()
        {
            bar.finish_and_clear();
        }
    }
}

pub fn print_success(message: &str) {
    println!("\x1b[1;32m✓ {}\x1b[0m", message);
}
