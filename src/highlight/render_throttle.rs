//! Coalesces line-tracker updates into at most one render per document per window.
//!
//! The first dirty mark opens a window. Marks arriving while it is open only replace
//! the pending snapshot. When the window closes every pending document is rendered
//! once with its latest lines (trailing edge only).

use smol::Timer;
use smol::channel::{Receiver, Sender};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::highlight::collaborators::HighlightRenderer;
use crate::highlight::color::HighlightColor;
use crate::highlight::highlight_map::FileKey;
use crate::utils::debug_log;

type Snapshot = (FileKey, Vec<u32>);

enum Event {
    Dirty(Snapshot),
    Elapsed,
    Closed,
}

pub struct RenderThrottle {
    tx: Sender<Snapshot>,
    task: smol::Task<()>,
}

impl RenderThrottle {
    pub fn new(
        window: Duration,
        renderer: Arc<dyn HighlightRenderer>,
        color: HighlightColor,
    ) -> Self {
        let (tx, rx) = smol::channel::unbounded();
        let task = smol::spawn(run(rx, window, renderer, color));
        RenderThrottle { tx, task }
    }

    /// Record that `file` now has `lines`. Never blocks and never renders directly.
    pub fn mark_dirty(&self, file: FileKey, lines: Vec<u32>) {
        if self.tx.try_send((file, lines)).is_err() {
            debug_log("render throttle stopped; dropping dirty mark");
        }
    }

    /// Flush anything pending and stop
    pub async fn close(self) {
        self.tx.close();
        self.task.await;
    }
}

async fn run(
    rx: Receiver<Snapshot>,
    window: Duration,
    renderer: Arc<dyn HighlightRenderer>,
    color: HighlightColor,
) {
    let mut pending: BTreeMap<FileKey, Vec<u32>> = BTreeMap::new();
    loop {
        let Ok((file, lines)) = rx.recv().await else {
            return;
        };
        pending.insert(file, lines);
        let deadline = Instant::now() + window;

        let closed = loop {
            let event = smol::future::or(
                async {
                    match rx.recv().await {
                        Ok(snapshot) => Event::Dirty(snapshot),
                        Err(_) => Event::Closed,
                    }
                },
                async {
                    Timer::at(deadline).await;
                    Event::Elapsed
                },
            )
            .await;
            match event {
                Event::Dirty((file, lines)) => {
                    pending.insert(file, lines);
                }
                Event::Elapsed => break false,
                Event::Closed => break true,
            }
        };

        for (file, lines) in std::mem::take(&mut pending) {
            renderer.render(&file, &lines, &color);
        }
        if closed {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::highlight::collaborators::RecordingRenderer;
    use std::path::Path;

    fn key(name: &str) -> FileKey {
        FileKey::new(Path::new(name), Path::new("/throttle-test"))
    }

    #[test]
    fn test_burst_coalesces_into_one_render_per_file() {
        smol::block_on(async {
            let renderer = Arc::new(RecordingRenderer::default());
            let throttle = RenderThrottle::new(
                Duration::from_millis(100),
                renderer.clone(),
                HighlightColor::default(),
            );
            for i in 0..50u32 {
                throttle.mark_dirty(key("a.rs"), vec![i]);
            }
            throttle.mark_dirty(key("b.rs"), vec![7]);

            Timer::after(Duration::from_millis(20)).await;
            assert!(renderer.calls().is_empty(), "rendered on the leading edge");

            Timer::after(Duration::from_millis(250)).await;
            let calls = renderer.calls();
            assert_eq!(calls.len(), 2);
            assert!(calls.contains(&(key("a.rs"), vec![49])));
            assert!(calls.contains(&(key("b.rs"), vec![7])));
            throttle.close().await;
            assert_eq!(renderer.calls().len(), 2);
        });
    }

    #[test]
    fn test_separate_windows_render_separately() {
        smol::block_on(async {
            let renderer = Arc::new(RecordingRenderer::default());
            let throttle = RenderThrottle::new(
                Duration::from_millis(30),
                renderer.clone(),
                HighlightColor::default(),
            );
            throttle.mark_dirty(key("a.rs"), vec![1]);
            Timer::after(Duration::from_millis(150)).await;
            throttle.mark_dirty(key("a.rs"), vec![2]);
            Timer::after(Duration::from_millis(150)).await;
            assert_eq!(
                renderer.calls(),
                vec![(key("a.rs"), vec![1]), (key("a.rs"), vec![2])]
            );
            throttle.close().await;
        });
    }

    #[test]
    fn test_close_flushes_pending() {
        smol::block_on(async {
            let renderer = Arc::new(RecordingRenderer::default());
            let throttle = RenderThrottle::new(
                Duration::from_secs(60),
                renderer.clone(),
                HighlightColor::default(),
            );
            throttle.mark_dirty(key("a.rs"), vec![3, 4]);
            throttle.close().await;
            assert_eq!(renderer.calls(), vec![(key("a.rs"), vec![3, 4])]);
        });
    }
}
