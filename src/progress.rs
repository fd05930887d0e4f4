//! Terminal progress for the fingerprinting and clustering stages.
//!
//! `--log-only` hides the bars. Extraction then reports through periodic
//! tracing lines, which read better than redraws once stderr is a file.

use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

static LOG_ONLY: AtomicBool = AtomicBool::new(false);

/// Tracks between two progress lines in log-only mode
const LOG_EVERY: u64 = 100;

pub fn set_log_only(value: bool) {
    LOG_ONLY.store(value, Ordering::Relaxed);
}

fn log_only() -> bool {
    LOG_ONLY.load(Ordering::Relaxed)
}

/// Elapsed time as "4.3s", "2m 05s" or "1h 07m".
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{}h {:02}m", secs / 3600, (secs % 3600) / 60)
    }
}

/// Per-track progress of fingerprint extraction.
pub struct ExtractionProgress {
    bar: ProgressBar,
    done: u64,
    total: u64,
    log_only: bool,
}

impl ExtractionProgress {
    pub fn new(total: u64) -> Self {
        let log_only = log_only();
        let bar = if log_only {
            ProgressBar::hidden()
        } else {
            let style = ProgressStyle::default_bar()
                .template(
                    "Fingerprinting [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} tracks ({per_sec}, ETA {eta})",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> ");
            ProgressBar::new(total).with_style(style)
        };
        Self {
            bar,
            done: 0,
            total,
            log_only,
        }
    }

    /// Count one finished track, whether it was cached, computed or failed.
    pub fn track_done(&mut self) {
        self.done += 1;
        self.bar.inc(1);
        if self.log_only && line_due(self.done, self.total) {
            let pct = 100.0 * self.done as f64 / self.total.max(1) as f64;
            tracing::info!("[EXTRACT] {}/{} tracks ({:.1}%)", self.done, self.total, pct);
        }
    }

    pub fn finish(self) {
        self.bar.finish_and_clear();
    }
}

fn line_due(done: u64, total: u64) -> bool {
    done % LOG_EVERY == 0 || done == total
}

/// Spinner shown while buckets are clustered. Hidden in log-only mode.
pub fn clustering_spinner() -> ProgressBar {
    if log_only() {
        return ProgressBar::hidden();
    }
    let style = ProgressStyle::default_spinner()
        .template("Clustering {spinner} [{elapsed_precise}]")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    let spinner = ProgressBar::new_spinner().with_style(style);
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}
