//! Long-running editor bridge: JSON-lines requests on stdin, JSON-lines events on
//! stdout. Heavy requests (`add_commits`, `head_check`) are refused while one is
//! running; everything else waits its turn.

use clap::Args;
use futures::io::AsyncBufRead;
use serde::{Deserialize, Serialize};
use smol::io::{AsyncBufReadExt, BufReader};
use smol::stream::StreamExt;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::config::Config;
use crate::error::GitVisionError;
use crate::git::repository::Repository;
use crate::highlight::aggregator::AddCommitsReport;
use crate::highlight::collaborators::{HighlightRenderer, NoProgress, Notifier};
use crate::highlight::color::HighlightColor;
use crate::highlight::highlight_map::{FileKey, next_block_start, previous_block_start};
use crate::highlight::line_tracker::EditDelta;
use crate::highlight::render_throttle::RenderThrottle;
use crate::highlight::{ConcurrencyGate, HighlightSession};
use crate::utils::debug_log;

use super::watchlist_for;

#[derive(Args, Debug)]
pub struct SessionArgs {
    /// Answer yes to large change set confirmations
    #[arg(short = 'y', long)]
    pub yes: bool,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    AddCommits {
        messages: Vec<String>,
    },
    Clear,
    Open {
        path: PathBuf,
    },
    Save {
        path: PathBuf,
    },
    /// Editor content change: lines `start_line..=end_line` replaced by `text`
    Edit {
        path: PathBuf,
        start_line: u32,
        end_line: u32,
        #[serde(default)]
        text: String,
    },
    ToggleLine {
        path: PathBuf,
        line: u32,
    },
    NextBlock {
        path: PathBuf,
        line: u32,
    },
    PreviousBlock {
        path: PathBuf,
        line: u32,
    },
    Commits,
    Counts,
    HeadCheck,
}

#[derive(Debug, Serialize)]
struct CommitEntry {
    message: String,
    date: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Event {
    Render {
        file: FileKey,
        lines: Vec<u32>,
        color: HighlightColor,
    },
    Notice {
        level: &'static str,
        message: String,
    },
    Report {
        #[serde(flatten)]
        report: AddCommitsReport,
    },
    Count {
        file: FileKey,
        count: usize,
    },
    Toggled {
        file: FileKey,
        line: u32,
        highlighted: bool,
    },
    Block {
        file: FileKey,
        line: Option<u32>,
    },
    Commits {
        commits: Vec<CommitEntry>,
    },
    Counts {
        counts: BTreeMap<FileKey, usize>,
    },
    Head {
        rebuilt: bool,
    },
    Error {
        message: String,
    },
}

/// Serializes events one per line onto a shared sink
pub struct EventWriter {
    out: Mutex<Box<dyn Write + Send>>,
}

impl EventWriter {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        EventWriter {
            out: Mutex::new(out),
        }
    }

    fn emit(&self, event: &Event) {
        let line = match serde_json::to_string(event) {
            Ok(line) => line,
            Err(e) => {
                debug_log(&format!("could not serialize event: {}", e));
                return;
            }
        };
        let mut out = self.out.lock().unwrap_or_else(|e| e.into_inner());
        if writeln!(out, "{}", line).and_then(|_| out.flush()).is_err() {
            debug_log("event sink closed");
        }
    }
}

struct SessionNotifier {
    writer: Arc<EventWriter>,
    assume_yes: bool,
}

impl Notifier for SessionNotifier {
    fn info(&self, message: &str) {
        self.writer.emit(&Event::Notice {
            level: "info",
            message: message.to_string(),
        });
    }

    fn error(&self, message: &str) {
        self.writer.emit(&Event::Notice {
            level: "error",
            message: message.to_string(),
        });
    }

    // stdin carries requests, so there is nobody to ask
    fn confirm(&self, message: &str) -> bool {
        self.writer.emit(&Event::Notice {
            level: if self.assume_yes { "confirmed" } else { "declined" },
            message: message.to_string(),
        });
        self.assume_yes
    }
}

struct SessionRenderer {
    writer: Arc<EventWriter>,
}

impl HighlightRenderer for SessionRenderer {
    fn render(&self, file: &FileKey, lines: &[u32], color: &HighlightColor) {
        self.writer.emit(&Event::Render {
            file: file.clone(),
            lines: lines.to_vec(),
            color: *color,
        });
    }
}

pub struct SessionHost {
    gate: Arc<ConcurrencyGate<HighlightSession>>,
    renderer: Arc<dyn HighlightRenderer>,
    writer: Arc<EventWriter>,
    color: HighlightColor,
}

impl SessionHost {
    pub fn new(repo: &Repository, writer: Arc<EventWriter>, assume_yes: bool) -> SessionHost {
        let config = Config::get();
        let notifier: Arc<dyn Notifier> = Arc::new(SessionNotifier {
            writer: Arc::clone(&writer),
            assume_yes,
        });
        let renderer: Arc<dyn HighlightRenderer> = Arc::new(SessionRenderer {
            writer: Arc::clone(&writer),
        });
        let color = *config.highlight_color();

        let mut session = HighlightSession::open(
            repo.clone(),
            config.session_options(),
            Arc::clone(&notifier),
            Arc::new(NoProgress),
        );
        if config.realtime_highlighting() {
            session.attach_render_throttle(RenderThrottle::new(
                config.render_window(),
                Arc::clone(&renderer),
                color,
            ));
        }

        SessionHost {
            gate: Arc::new(ConcurrencyGate::with_notifier(session, notifier)),
            renderer,
            writer,
            color,
        }
    }

    /// Handle requests until `input` ends, then wait for in-flight work and flush
    /// pending renders.
    pub async fn serve<R>(&self, input: R) -> Result<(), GitVisionError>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();
        let mut in_flight = Vec::new();
        while let Some(line) = lines.next().await {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Request>(&line) {
                Ok(request) => {
                    if let Some(task) = self.handle(request).await {
                        in_flight.push(task);
                    }
                }
                Err(e) => self.writer.emit(&Event::Error {
                    message: format!("invalid request: {}", e),
                }),
            }
        }

        for task in in_flight {
            task.await;
        }
        let throttle = self.gate.enter().await.take_render_throttle();
        if let Some(throttle) = throttle {
            throttle.close().await;
        }
        Ok(())
    }

    async fn handle(&self, request: Request) -> Option<smol::Task<()>> {
        match request {
            Request::AddCommits { messages } => {
                let Some(mut session) = self.gate.try_enter_owned() else {
                    self.gate.notify_busy();
                    return None;
                };
                let renderer = Arc::clone(&self.renderer);
                let writer = Arc::clone(&self.writer);
                let color = self.color;
                return Some(smol::spawn(async move {
                    let before: Vec<FileKey> = session.highlight_map().keys().cloned().collect();
                    let watchlist = watchlist_for(&session, &messages);
                    // each request carries the full selection
                    session.clear_highlight_data();
                    let report = session.add_commits(&watchlist).await;
                    render_all(&session, before, renderer.as_ref(), &color);
                    writer.emit(&Event::Report { report });
                }));
            }
            Request::HeadCheck => {
                let Some(mut session) = self.gate.try_enter() else {
                    self.gate.notify_busy();
                    return None;
                };
                let before: Vec<FileKey> = session.highlight_map().keys().cloned().collect();
                let rebuilt = session.refresh_if_head_moved().await;
                if rebuilt {
                    render_all(&session, before, self.renderer.as_ref(), &self.color);
                }
                self.writer.emit(&Event::Head { rebuilt });
            }
            Request::Clear => {
                let mut session = self.gate.enter().await;
                let before: Vec<FileKey> = session.highlight_map().keys().cloned().collect();
                session.clear_highlight_data();
                render_all(&session, before, self.renderer.as_ref(), &self.color);
            }
            Request::Open { path } => {
                let mut session = self.gate.enter().await;
                let key = session.remember_key(&path);
                let lines = session.lines_for(&path).unwrap_or_default();
                self.renderer.render(&key, lines, &self.color);
            }
            Request::Save { path } => {
                let mut session = self.gate.enter().await;
                let count = session.update_file_highlights(&path).await;
                let key = session.key_for(&path);
                let lines = session.lines_for(&path).unwrap_or_default();
                self.renderer.render(&key, lines, &self.color);
                self.writer.emit(&Event::Count { file: key, count });
            }
            Request::Edit {
                path,
                start_line,
                end_line,
                text,
            } => {
                let mut session = self.gate.enter().await;
                session.on_edit(&path, &EditDelta::from_change(start_line, end_line, &text));
            }
            Request::ToggleLine { path, line } => {
                let mut session = self.gate.enter().await;
                let highlighted = session.toggle_line(&path, line);
                let key = session.key_for(&path);
                let lines = session.lines_for(&path).unwrap_or_default();
                self.renderer.render(&key, lines, &self.color);
                self.writer.emit(&Event::Toggled {
                    file: key,
                    line,
                    highlighted,
                });
            }
            Request::NextBlock { path, line } => {
                let session = self.gate.enter().await;
                let target = next_block_start(session.lines_for(&path).unwrap_or_default(), line);
                self.writer.emit(&Event::Block {
                    file: session.key_for(&path),
                    line: target,
                });
            }
            Request::PreviousBlock { path, line } => {
                let session = self.gate.enter().await;
                let target =
                    previous_block_start(session.lines_for(&path).unwrap_or_default(), line);
                self.writer.emit(&Event::Block {
                    file: session.key_for(&path),
                    line: target,
                });
            }
            Request::Commits => {
                let session = self.gate.enter().await;
                let commits = session
                    .commit_list()
                    .into_iter()
                    .map(|(message, date)| CommitEntry {
                        message,
                        date: date.map(|d| d.to_rfc3339()),
                    })
                    .collect();
                self.writer.emit(&Event::Commits { commits });
            }
            Request::Counts => {
                let session = self.gate.enter().await;
                self.writer.emit(&Event::Counts {
                    counts: session.change_counts().clone(),
                });
            }
        }
        None
    }
}

/// Re-render every document that had or now has highlights
fn render_all(
    session: &HighlightSession,
    before: Vec<FileKey>,
    renderer: &dyn HighlightRenderer,
    color: &HighlightColor,
) {
    let mut keys: Vec<FileKey> = before;
    keys.extend(session.highlight_map().keys().cloned());
    keys.sort();
    keys.dedup();
    for key in keys {
        let lines = session.highlight_map().get(&key).unwrap_or_default();
        renderer.render(&key, lines, color);
    }
}

pub fn run(repo: &Repository, args: &SessionArgs) -> Result<(), GitVisionError> {
    let writer = Arc::new(EventWriter::new(Box::new(std::io::stdout())));
    let host = SessionHost::new(repo, writer, args.yes);
    let input = BufReader::new(smol::Unblock::new(std::io::stdin()));
    smol::block_on(host.serve(input))
}
