// Run metrics module
//
// Lightweight counters for what an extraction run actually did

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Extraction metrics
///
/// Uses atomic operations so the orchestrator can record from `&self`.
/// Logged once at the end of a run.
#[derive(Debug)]
pub struct Metrics {
    /// Top-level archives whose outer decode succeeded
    pub archives_extracted: AtomicUsize,

    /// Top-level archives that failed
    pub archives_failed: AtomicUsize,

    /// Nested archives extracted below the top level
    pub nested_extracted: AtomicUsize,

    /// Nested archives that failed (kept as plain files)
    pub nested_failed: AtomicUsize,

    /// Files moved into a final output directory
    pub files_merged: AtomicUsize,

    /// Merges that needed a `_N` suffix
    pub collision_renames: AtomicUsize,

    /// Archives renamed to their detected extension
    pub extensions_fixed: AtomicUsize,

    /// Total time spent inside the decoder in milliseconds
    pub total_decode_time_ms: AtomicU64,

    /// Number of decoder invocations
    pub decoder_calls: AtomicU64,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            archives_extracted: AtomicUsize::new(0),
            archives_failed: AtomicUsize::new(0),
            nested_extracted: AtomicUsize::new(0),
            nested_failed: AtomicUsize::new(0),
            files_merged: AtomicUsize::new(0),
            collision_renames: AtomicUsize::new(0),
            extensions_fixed: AtomicUsize::new(0),
            total_decode_time_ms: AtomicU64::new(0),
            decoder_calls: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record the outcome of a top-level archive
    pub fn record_archive(&self, success: bool) {
        if success {
            self.archives_extracted.fetch_add(1, Ordering::Relaxed);
        } else {
            self.archives_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record the outcome of a nested archive
    pub fn record_nested(&self, success: bool) {
        if success {
            self.nested_extracted.fetch_add(1, Ordering::Relaxed);
        } else {
            self.nested_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_merge(&self, renamed: bool) {
        self.files_merged.fetch_add(1, Ordering::Relaxed);
        if renamed {
            self.collision_renames.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_extension_fixed(&self) {
        self.extensions_fixed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one decoder invocation and its wall time
    pub fn record_decode_time(&self, duration: Duration) {
        self.decoder_calls.fetch_add(1, Ordering::Relaxed);
        self.total_decode_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average decoder time per invocation in milliseconds
    pub fn avg_decode_time_ms(&self) -> f64 {
        let total = self.total_decode_time_ms.load(Ordering::Relaxed);
        let count = self.decoder_calls.load(Ordering::Relaxed);
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    /// Log metrics summary
    pub fn log_summary(&self) {
        tracing::info!("=== Extraction Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Archives: {} extracted, {} failed",
            self.archives_extracted.load(Ordering::Relaxed),
            self.archives_failed.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Nested archives: {} extracted, {} kept after failure",
            self.nested_extracted.load(Ordering::Relaxed),
            self.nested_failed.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Files merged: {} ({} renamed on collision), extensions fixed: {}",
            self.files_merged.load(Ordering::Relaxed),
            self.collision_renames.load(Ordering::Relaxed),
            self.extensions_fixed.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Decoder: {} calls, {:.2}s total (avg: {:.2}ms)",
            self.decoder_calls.load(Ordering::Relaxed),
            self.total_decode_time_ms.load(Ordering::Relaxed) as f64 / 1000.0,
            self.avg_decode_time_ms()
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new();
        assert_eq!(metrics.archives_extracted.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.files_merged.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_record_archive_outcomes() {
        let metrics = Metrics::new();

        metrics.record_archive(true);
        metrics.record_archive(true);
        metrics.record_archive(false);
        metrics.record_nested(false);

        assert_eq!(metrics.archives_extracted.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.archives_failed.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.nested_extracted.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.nested_failed.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_record_merge_counts_renames() {
        let metrics = Metrics::new();

        metrics.record_merge(false);
        metrics.record_merge(true);

        assert_eq!(metrics.files_merged.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.collision_renames.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_decode_time_average() {
        let metrics = Metrics::new();
        assert_eq!(metrics.avg_decode_time_ms(), 0.0);

        metrics.record_decode_time(Duration::from_millis(100));
        metrics.record_decode_time(Duration::from_millis(200));

        assert_eq!(metrics.total_decode_time_ms.load(Ordering::Relaxed), 300);
        assert_eq!(metrics.avg_decode_time_ms(), 150.0);
    }

    #[test]
    fn test_uptime() {
        let metrics = Metrics::new();
        thread::sleep(Duration::from_millis(10));
        assert!(metrics.uptime().as_millis() >= 10);
    }
}
