//! Progress reporting for indexing operations

use std::time::{Duration, Instant};
use tracing::trace;

/// Phase of an indexing operation, included in every progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexPhase {
    Preparing,
    Indexing,
    Saving,
    Clearing,
}

impl IndexPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexPhase::Preparing => "preparing",
            IndexPhase::Indexing => "indexing",
            IndexPhase::Saving => "saving",
            IndexPhase::Clearing => "clearing",
        }
    }
}

/// A progress event delivered at batch boundaries.
#[derive(Debug, Clone, Copy)]
pub struct IndexProgress {
    pub phase: IndexPhase,
    pub current: usize,
    pub total: usize,
    pub percentage: u8,
}

/// Callback invoked with progress events. Exceptions thrown by the
/// callback are swallowed; progress is best-effort.
pub type ProgressCallback = Box<dyn Fn(&IndexProgress) + Send + Sync>;

/// Drives a progress callback with monotonically non-decreasing
/// percentages.
pub struct ProgressReporter {
    callback: Option<ProgressCallback>,
    last_percentage: u8,
}

impl ProgressReporter {
    pub fn new(callback: Option<ProgressCallback>) -> Self {
        Self {
            callback,
            last_percentage: 0,
        }
    }

    /// Report progress; the percentage never moves backwards.
    pub fn report(&mut self, phase: IndexPhase, current: usize, total: usize) {
        let raw = if total == 0 {
            100
        } else {
            ((current * 100) / total).min(100) as u8
        };
        let percentage = raw.max(self.last_percentage);
        self.last_percentage = percentage;

        let event = IndexProgress {
            phase,
            current,
            total,
            percentage,
        };
        trace!(phase = phase.as_str(), current, total, percentage, "progress");

        if let Some(callback) = &self.callback {
            // A panicking callback must not take down the indexing run.
            let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| callback(&event)));
        }
    }
}

/// Statistics collected during indexing
#[derive(Debug, Default)]
pub struct IndexStats {
    /// Number of files successfully indexed
    pub files_indexed: usize,

    /// Number of files that failed to index
    pub files_failed: usize,

    /// Total number of chunks written to the store
    pub chunks_written: usize,

    /// Time elapsed during indexing
    pub elapsed: Duration,

    /// Errors encountered (limited to first 100)
    pub errors: Vec<(String, String)>,

    start_time: Option<Instant>,
}

impl IndexStats {
    /// Create new stats and start timing
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    /// Stop timing and record elapsed time
    pub fn stop_timing(&mut self) {
        if let Some(start) = self.start_time {
            self.elapsed = start.elapsed();
            self.start_time = None;
        }
    }

    /// Add an error (limited to first 100 errors)
    pub fn add_error(&mut self, path: String, error: String) {
        if self.errors.len() < 100 {
            self.errors.push((path, error));
        }
        self.files_failed += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU8, Ordering};

    #[test]
    fn test_percentage_is_monotonic() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let mut reporter = ProgressReporter::new(Some(Box::new(move |p| {
            seen_clone.lock().unwrap().push(p.percentage);
        })));

        reporter.report(IndexPhase::Indexing, 5, 10);
        reporter.report(IndexPhase::Indexing, 3, 10); // would regress
        reporter.report(IndexPhase::Indexing, 10, 10);

        let percentages = seen.lock().unwrap().clone();
        assert_eq!(percentages, vec![50, 50, 100]);
    }

    #[test]
    fn test_panicking_callback_is_swallowed() {
        let count = Arc::new(AtomicU8::new(0));
        let count_clone = count.clone();
        let mut reporter = ProgressReporter::new(Some(Box::new(move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
            panic!("listener bug");
        })));

        reporter.report(IndexPhase::Indexing, 1, 2);
        reporter.report(IndexPhase::Indexing, 2, 2);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_zero_total_reports_complete() {
        let mut reporter = ProgressReporter::new(None);
        reporter.report(IndexPhase::Saving, 0, 0);
        assert_eq!(reporter.last_percentage, 100);
    }

    #[test]
    fn test_error_limiting() {
        let mut stats = IndexStats::new();
        for i in 0..150 {
            stats.add_error(format!("file{i}.rs"), format!("Error {i}"));
        }
        assert_eq!(stats.errors.len(), 100);
        assert_eq!(stats.files_failed, 150);
    }
}
