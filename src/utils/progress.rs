//! Progress reporting for the CLI pipeline
//!
//! The pipeline runs on a worker thread and sends [`Progress`] messages; the
//! main thread draws them with indicatif until `Complete` or `Quit` arrives.

use indicatif::{ProgressBar, ProgressStyle};
use std::sync::mpsc::{Receiver, Sender};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    /// Number of steps the pipeline will take
    Init(u64),
    Step,
    Message(String),
    Complete,
    /// Stop early with this exit code
    Quit(i32),
}

/// Sending half handed to the pipeline.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    tx: Sender<Progress>,
}

impl ProgressReporter {
    pub fn new(tx: Sender<Progress>) -> Self {
        Self { tx }
    }

    /// Advance one step and show `message`.
    pub fn step(&self, message: impl Into<String>) {
        // a closed receiver only means nobody is drawing any more
        let _ = self.tx.send(Progress::Message(message.into()));
        let _ = self.tx.send(Progress::Step);
    }

    pub fn init(&self, steps: u64) {
        let _ = self.tx.send(Progress::Init(steps));
    }

    pub fn complete(&self) {
        let _ = self.tx.send(Progress::Complete);
    }

    pub fn quit(&self, code: i32) {
        let _ = self.tx.send(Progress::Quit(code));
    }
}

pub fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    let style = ProgressStyle::with_template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");
    bar.set_style(style);
    bar
}

/// Draw messages from `rx` on `bar`; returns the exit code.
pub fn render(rx: Receiver<Progress>, bar: &ProgressBar) -> i32 {
    for msg in rx {
        match msg {
            Progress::Init(steps) => {
                bar.set_length(steps);
                bar.set_position(0);
            }
            Progress::Step => bar.inc(1),
            Progress::Message(m) => bar.set_message(m),
            Progress::Complete => {
                bar.finish_with_message("done");
                return 0;
            }
            Progress::Quit(code) => {
                bar.abandon();
                return code;
            }
        }
    }
    // sender dropped without a verdict
    bar.abandon();
    1
}
