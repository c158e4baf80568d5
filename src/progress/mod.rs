use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};

use crate::media::Stage;

/// Advisory progress events emitted by the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// An item entered `stage`, which is step `current` of `total`
    Step {
        stage: Stage,
        label: String,
        current: u64,
        total: u64,
    },
    /// Bytes copied so far for an item's payload
    Bytes {
        label: String,
        transferred: u64,
        total: Option<u64>,
    },
    /// An item reached a terminal state
    Finished {
        label: String,
        success: bool,
        message: String,
    },
}

/// Receiver of progress events.
///
/// Implementations must return quickly; the pipeline never waits on them.
pub trait ProgressSink: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Sink that ignores every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Terminal progress display with one bar per item
pub struct TerminalProgress {
    multi: MultiProgress,
    bars: Mutex<HashMap<String, ProgressBar>>,
}

impl TerminalProgress {
    /// Draw bars on `multi`, the same set log output is routed through
    pub fn new(multi: MultiProgress) -> Arc<Self> {
        Arc::new(Self {
            multi,
            bars: Mutex::new(HashMap::new()),
        })
    }

    fn step_style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{prefix:>10.bold} [{bar:20.cyan/blue}] {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("=> ")
    }

    fn bytes_style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{prefix:>10.bold} [{bar:20.cyan/blue}] {bytes}/{total_bytes} {msg}")
            .unwrap()
            .progress_chars("=> ")
    }

    fn bar_for(&self, label: &str) -> Option<ProgressBar> {
        let mut bars = self.bars.lock().ok()?;
        let bar = bars.entry(label.to_string()).or_insert_with(|| {
            let bar = self.multi.add(ProgressBar::new(Stage::ALL.len() as u64));
            bar.set_style(Self::step_style());
            bar.set_message(label.to_string());
            bar
        });
        Some(bar.clone())
    }
}

impl ProgressSink for TerminalProgress {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Step {
                stage,
                label,
                current,
                total,
            } => {
                if let Some(bar) = self.bar_for(&label) {
                    bar.set_style(Self::step_style());
                    bar.set_prefix(stage.name());
                    bar.set_length(total);
                    bar.set_position(current);
                }
            }
            ProgressEvent::Bytes {
                label,
                transferred,
                total,
            } => {
                if let Some(bar) = self.bar_for(&label) {
                    bar.set_style(Self::bytes_style());
                    bar.set_length(total.unwrap_or(0));
                    bar.set_position(transferred);
                }
            }
            ProgressEvent::Finished {
                label,
                success,
                message,
            } => {
                if let Some(bar) = self.bar_for(&label) {
                    bar.set_style(Self::step_style());
                    bar.set_prefix(if success { "Done" } else { "Failed" });
                    if success {
                        bar.set_position(bar.length().unwrap_or(0));
                    }
                    bar.finish_with_message(message);
                }
            }
        }
    }
}

/// Writer for log output that clears the progress bars while a line is
/// written and redraws them afterwards
#[derive(Clone)]
pub struct SuspendingWriter<W> {
    multi: MultiProgress,
    inner: W,
}

impl<W> SuspendingWriter<W> {
    pub fn new(multi: MultiProgress, inner: W) -> Self {
        Self { multi, inner }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: io::Write> io::Write for SuspendingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let inner = &mut self.inner;
        self.multi.suspend(|| inner.write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        let inner = &mut self.inner;
        self.multi.suspend(|| inner.flush())
    }
}
