//! Run metrics.
//!
//! [`RunMetrics`] is a set of atomic counters updated by workers as files finish, plus
//! the run's start and end instants. It can be printed or exported as JSON alongside
//! the volume:
//!
//! ```no_run
//! use ironbates::metrics::RunMetrics;
//!
//! # fn main() -> anyhow::Result<()> {
//! let metrics = RunMetrics::new();
//! metrics.record_start();
//! metrics.incr_processed();
//! metrics.record_end();
//! metrics.save_to_file("out/run_metrics.json")?;
//! # Ok(())
//! # }
//! ```

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde_json::{Value, json};

/// Thread-safe counters for one run.
#[derive(Debug, Default)]
pub struct RunMetrics {
    processed: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
    timeouts: AtomicU64,
    pages: AtomicU64,
    failed_chunks: AtomicU64,
    stamped: AtomicU64,
    stamp_failures: AtomicU64,
    times: Mutex<(Option<Instant>, Option<Instant>)>,
}

macro_rules! counter {
    ($incr:ident, $get:ident, $field:ident) => {
        pub fn $incr(&self) {
            self.$field.fetch_add(1, Ordering::Relaxed);
        }

        pub fn $get(&self) -> u64 {
            self.$field.load(Ordering::Relaxed)
        }
    };
}

impl RunMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    counter!(incr_processed, processed, processed);
    counter!(incr_failed, failed, failed);
    counter!(incr_skipped, skipped, skipped);
    counter!(incr_timeouts, timeouts, timeouts);

    pub fn add_failed(&self, n: u64) {
        self.failed.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_skipped(&self, n: u64) {
        self.skipped.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_pages(&self, n: u64) {
        self.pages.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_failed_chunks(&self, n: u64) {
        self.failed_chunks.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_stamp_results(&self, stamped: u64, failed: u64) {
        self.stamped.fetch_add(stamped, Ordering::Relaxed);
        self.stamp_failures.fetch_add(failed, Ordering::Relaxed);
    }

    pub fn pages(&self) -> u64 {
        self.pages.load(Ordering::Relaxed)
    }

    pub fn failed_chunks(&self) -> u64 {
        self.failed_chunks.load(Ordering::Relaxed)
    }

    pub fn stamped(&self) -> u64 {
        self.stamped.load(Ordering::Relaxed)
    }

    pub fn stamp_failures(&self) -> u64 {
        self.stamp_failures.load(Ordering::Relaxed)
    }

    pub fn record_start(&self) {
        let mut times = self.times.lock().unwrap_or_else(PoisonError::into_inner);
        times.0 = Some(Instant::now());
    }

    pub fn record_end(&self) {
        let mut times = self.times.lock().unwrap_or_else(PoisonError::into_inner);
        times.1 = Some(Instant::now());
    }

    /// Time between start and end, or since start if the run has not ended.
    #[must_use]
    pub fn elapsed(&self) -> Option<Duration> {
        let times = self.times.lock().unwrap_or_else(PoisonError::into_inner);
        match *times {
            (Some(start), Some(end)) => Some(end.duration_since(start)),
            (Some(start), None) => Some(start.elapsed()),
            _ => None,
        }
    }

    #[must_use]
    pub fn to_json(&self) -> Value {
        let mut out = json!({
            "processed": self.processed(),
            "failed": self.failed(),
            "skipped": self.skipped(),
            "timeouts": self.timeouts(),
            "pages": self.pages(),
            "failed_chunks": self.failed_chunks(),
            "stamped": self.stamped(),
            "stamp_failures": self.stamp_failures(),
        });
        if let Some(elapsed) = self.elapsed() {
            out["execution_time_ms"] = json!(elapsed.as_millis());
        }
        out
    }

    /// Print a summary to stdout.
    pub fn print(&self) {
        println!("\n========== Production Metrics ==========");
        if let Some(elapsed) = self.elapsed() {
            println!(
                "Execution Time: {:.3}s ({} ms)",
                elapsed.as_secs_f64(),
                elapsed.as_millis()
            );
            println!("----------------------------------------");
        }
        println!("processed: {}", self.processed());
        println!("failed: {}", self.failed());
        println!("skipped: {}", self.skipped());
        println!("timeouts: {}", self.timeouts());
        println!("pages: {}", self.pages());
        println!("failed_chunks: {}", self.failed_chunks());
        println!("stamped: {}", self.stamped());
        println!("stamp_failures: {}", self.stamp_failures());
        println!("========================================\n");
    }

    /// Write [`RunMetrics::to_json`] to `path`, pretty-printed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or written to.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let formatted = serde_json::to_string_pretty(&self.to_json())?;
        let mut file = File::create(path).with_context(|| format!("create {}", path.display()))?;
        file.write_all(formatted.as_bytes())?;
        Ok(())
    }
}
