//! Read-only progress view for display loops

use std::sync::Arc;
use std::time::Duration;

use crate::upload::stats::{StatsTracker, UploadStats};

/// Consistent-read accessor over uploader statistics.
///
/// Not a thread; cloning is cheap and every clone observes the same
/// uploader.
#[derive(Clone)]
pub struct ProgressReporter {
    stats: Arc<StatsTracker>,
}

impl ProgressReporter {
    pub fn new(stats: Arc<StatsTracker>) -> Self {
        Self { stats }
    }

    /// Latest statistics, `None` until the first transfer has started
    pub fn snapshot(&self) -> Option<UploadStats> {
        self.stats.snapshot()
    }

    /// Terminal progress line, e.g.
    /// `duration: 12.300000 seconds, uploaded: 123456 @ 95 kBps`
    pub fn progress_line(&self, duration: Duration) -> Option<String> {
        self.snapshot().map(|stats| format_progress(duration, &stats))
    }

    /// Progress as a single JSON object
    pub fn progress_json(&self, duration: Duration) -> Option<String> {
        self.snapshot().map(|stats| {
            serde_json::json!({
                "duration_secs": duration.as_secs_f64(),
                "stats": stats,
            })
            .to_string()
        })
    }
}

pub fn format_progress(duration: Duration, stats: &UploadStats) -> String {
    format!(
        "duration: {:.6} seconds, uploaded: {} @ {} kBps",
        duration.as_secs_f64(),
        stats.bytes_uploaded(),
        (stats.bytes_per_second / 1000.0) as u64
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_progress() {
        let stats = UploadStats {
            bytes_sent_current: 456,
            total_bytes_uploaded: 123_000,
            bytes_per_second: 95_500.0,
            ..Default::default()
        };
        assert_eq!(
            format_progress(Duration::from_millis(12_300), &stats),
            "duration: 12.300000 seconds, uploaded: 123456 @ 95 kBps"
        );
    }

    #[test]
    fn test_reporter_before_first_transfer() {
        let reporter = ProgressReporter::new(Arc::new(StatsTracker::new()));
        assert!(reporter.progress_line(Duration::ZERO).is_none());
        assert!(reporter.progress_json(Duration::ZERO).is_none());
    }
}
