//! Progress reporting for stage loops

use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

/// Progress bar for one stage, plus success/failure tallies
pub struct StageProgress {
    /// Progress bar (None in quiet mode)
    progress_bar: Option<ProgressBar>,
    start_time: Instant,
    succeeded: AtomicUsize,
    failed: AtomicUsize,
}

impl StageProgress {
    /// Create a tracker for `total` units of work
    pub fn new(label: &str, total: u64, quiet: bool) -> Self {
        let progress_bar = if !quiet {
            let pb = ProgressBar::new(total);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} {prefix} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            pb.set_prefix(label.to_string());
            Some(pb)
        } else {
            None
        };

        Self {
            progress_bar,
            start_time: Instant::now(),
            succeeded: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        }
    }

    /// Tracker that never draws
    pub fn hidden() -> Self {
        Self::new("", 0, true)
    }

    /// Record one finished unit
    pub fn tick(&self, item: &str, ok: bool) {
        if ok {
            self.succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }

        if let Some(ref pb) = self.progress_bar {
            pb.inc(1);
            let display = if item.chars().count() > 40 {
                let truncated: String = item.chars().take(37).collect();
                format!("{}...", truncated)
            } else {
                item.to_string()
            };
            pb.set_message(display);
        }
    }

    pub fn succeeded(&self) -> usize {
        self.succeeded.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }

    /// Finish the bar with a tally
    pub fn finish(&self) {
        if let Some(ref pb) = self.progress_bar {
            pb.finish_with_message(format!(
                "Done! {} ok, {} failed in {:.1}s",
                self.succeeded(),
                self.failed(),
                self.start_time.elapsed().as_secs_f64()
            ));
        }
    }
}
