//! Terminal progress bars for the sync passes.

use indicatif::{ProgressBar, ProgressStyle};
use pagesync_core::Progress;
use std::sync::Mutex;

/// [`Progress`] sink rendering one indicatif bar per pipeline pass.
///
/// Hidden bars are used in quiet mode so the call sites stay unconditional.
pub struct TerminalProgress {
    quiet: bool,
    bar: Mutex<Option<ProgressBar>>,
}

impl TerminalProgress {
    pub fn new(quiet: bool) -> Self {
        Self {
            quiet,
            bar: Mutex::new(None),
        }
    }

    fn make_bar(&self, label: &str, total: usize) -> ProgressBar {
        if self.quiet {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} {msg} [{bar:40.cyan/blue}] {pos}/{len}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb.set_message(label.to_string());
        pb
    }
}

impl Progress for TerminalProgress {
    fn begin(&self, label: &str, total: usize) {
        let pb = self.make_bar(label, total);
        if let Ok(mut slot) = self.bar.lock() {
            if let Some(old) = slot.replace(pb) {
                old.finish_and_clear();
            }
        }
    }

    fn tick(&self) {
        if let Ok(slot) = self.bar.lock() {
            if let Some(pb) = slot.as_ref() {
                pb.inc(1);
            }
        }
    }

    fn finish(&self) {
        if let Ok(mut slot) = self.bar.lock() {
            if let Some(pb) = slot.take() {
                pb.finish_and_clear();
            }
        }
    }
}
