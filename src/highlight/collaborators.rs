//! Seams between the highlight engine and whatever presents its results.

use crate::highlight::color::HighlightColor;
use crate::highlight::highlight_map::FileKey;

/// User-visible notices. Implementations must be cheap to call from any thread.
pub trait Notifier: Send + Sync {
    fn info(&self, message: &str);
    fn error(&self, message: &str);
    /// Blocking yes/no question. Returning false cancels the pending operation.
    fn confirm(&self, message: &str) -> bool;
}

/// Progress reporting for long attribution runs
pub trait ProgressSink: Send + Sync {
    fn start(&self, _title: &str, _total: usize) {}
    /// `fraction` is the share of the whole run that just completed
    fn advance(&self, fraction: f64);
    fn finish(&self) {}
}

/// Draws highlight decorations. Each call replaces every decoration of the document.
pub trait HighlightRenderer: Send + Sync {
    fn render(&self, file: &FileKey, lines: &[u32], color: &HighlightColor);
}

/// Drops every notice and answers confirmations with a fixed value
pub struct QuietNotifier {
    pub confirm_answer: bool,
}

impl Notifier for QuietNotifier {
    fn info(&self, _message: &str) {}
    fn error(&self, _message: &str) {}
    fn confirm(&self, _message: &str) -> bool {
        self.confirm_answer
    }
}

pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn advance(&self, _fraction: f64) {}
}

#[cfg(any(test, feature = "test-support"))]
pub use recording::{Notice, RecordingNotifier, RecordingProgress, RecordingRenderer};

#[cfg(any(test, feature = "test-support"))]
mod recording {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Notice {
        Info(String),
        Error(String),
        Confirm(String),
    }

    /// Keeps every notice for later assertions
    pub struct RecordingNotifier {
        confirm_answer: bool,
        notices: Mutex<Vec<Notice>>,
    }

    impl RecordingNotifier {
        pub fn new(confirm_answer: bool) -> Self {
            RecordingNotifier {
                confirm_answer,
                notices: Mutex::new(Vec::new()),
            }
        }

        pub fn notices(&self) -> Vec<Notice> {
            self.notices.lock().unwrap().clone()
        }
    }

    impl Notifier for RecordingNotifier {
        fn info(&self, message: &str) {
            self.notices
                .lock()
                .unwrap()
                .push(Notice::Info(message.to_string()));
        }

        fn error(&self, message: &str) {
            self.notices
                .lock()
                .unwrap()
                .push(Notice::Error(message.to_string()));
        }

        fn confirm(&self, message: &str) -> bool {
            self.notices
                .lock()
                .unwrap()
                .push(Notice::Confirm(message.to_string()));
            self.confirm_answer
        }
    }

    #[derive(Default)]
    pub struct RecordingProgress {
        steps: Mutex<Vec<f64>>,
    }

    impl RecordingProgress {
        pub fn total(&self) -> f64 {
            self.steps.lock().unwrap().iter().sum()
        }

        pub fn steps(&self) -> usize {
            self.steps.lock().unwrap().len()
        }
    }

    impl ProgressSink for RecordingProgress {
        fn advance(&self, fraction: f64) {
            self.steps.lock().unwrap().push(fraction);
        }
    }

    #[derive(Default)]
    pub struct RecordingRenderer {
        calls: Mutex<Vec<(FileKey, Vec<u32>)>>,
    }

    impl RecordingRenderer {
        pub fn calls(&self) -> Vec<(FileKey, Vec<u32>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl HighlightRenderer for RecordingRenderer {
        fn render(&self, file: &FileKey, lines: &[u32], _color: &HighlightColor) {
            self.calls
                .lock()
                .unwrap()
                .push((file.clone(), lines.to_vec()));
        }
    }
}
