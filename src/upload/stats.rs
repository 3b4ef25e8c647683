//! Upload statistics shared between the upload worker and readers

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

use crate::error::UploadError;

/// Snapshot of upload progress
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UploadStats {
    /// Bytes sent so far in the transfer in progress
    pub bytes_sent_current: u64,
    /// Bytes of all completed transfers
    pub total_bytes_uploaded: u64,
    /// Throughput of the current (or most recent) transfer
    pub bytes_per_second: f64,
    pub chunks_uploaded: u64,
    pub chunks_failed: u64,
    pub chunks_cancelled: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl UploadStats {
    /// Bytes accounted for, including the transfer in progress
    pub fn bytes_uploaded(&self) -> u64 {
        self.total_bytes_uploaded + self.bytes_sent_current
    }
}

#[derive(Default)]
struct TrackerState {
    stats: UploadStats,
    transfer_started: Option<Instant>,
    /// Set once the first transfer has started
    available: bool,
    /// Set on stop; no further updates are accepted
    frozen: bool,
}

impl TrackerState {
    fn update_rate(&mut self, bytes: u64) {
        if let Some(started) = self.transfer_started {
            let secs = started.elapsed().as_secs_f64();
            if secs > 0.0 {
                self.stats.bytes_per_second = bytes as f64 / secs;
            }
        }
    }

    fn end_transfer(&mut self) {
        self.stats.bytes_sent_current = 0;
        self.transfer_started = None;
    }
}

/// Statistics written by the upload worker.
///
/// Guarded by its own lock so frequent polling from the display loop never
/// contends with chunk buffer traffic.
#[derive(Default)]
pub struct StatsTracker {
    state: Mutex<TrackerState>,
}

impl StatsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consistent snapshot, or `None` before the first transfer started
    pub fn snapshot(&self) -> Option<UploadStats> {
        let state = self.state.lock();
        state.available.then(|| state.stats.clone())
    }

    pub(crate) fn begin_transfer(&self) {
        let mut state = self.state.lock();
        if state.frozen {
            return;
        }
        state.available = true;
        state.stats.bytes_sent_current = 0;
        state.transfer_started = Some(Instant::now());
    }

    pub(crate) fn record_progress(&self, bytes: u64) {
        let mut state = self.state.lock();
        if state.frozen || state.transfer_started.is_none() {
            return;
        }
        state.stats.bytes_sent_current += bytes;
        let sent = state.stats.bytes_sent_current;
        state.update_rate(sent);
    }

    pub(crate) fn complete_transfer(&self, length: u64) {
        let mut state = self.state.lock();
        if state.frozen {
            return;
        }
        state.update_rate(length);
        state.stats.total_bytes_uploaded += length;
        state.stats.chunks_uploaded += 1;
        state.end_transfer();
    }

    pub(crate) fn fail_transfer(&self, error: &UploadError) {
        let mut state = self.state.lock();
        if state.frozen {
            return;
        }
        state.stats.chunks_failed += 1;
        state.stats.last_error = Some(error.to_string());
        state.end_transfer();
    }

    pub(crate) fn cancel_transfer(&self) {
        let mut state = self.state.lock();
        if state.frozen {
            return;
        }
        state.stats.chunks_cancelled += 1;
        state.end_transfer();
    }

    /// Stop accepting updates
    pub(crate) fn freeze(&self) {
        self.state.lock().frozen = true;
    }
}

/// Progress handle given to a transport for one transfer
#[derive(Clone)]
pub struct TransferProgress {
    tracker: Arc<StatsTracker>,
}

impl TransferProgress {
    pub fn new(tracker: Arc<StatsTracker>) -> Self {
        Self { tracker }
    }

    /// Record `bytes` more of the current chunk as sent
    pub fn advance(&self, bytes: u64) {
        self.tracker.record_progress(bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_unavailable_before_first_transfer() {
        let tracker = StatsTracker::new();
        assert!(tracker.snapshot().is_none());
        tracker.record_progress(10);
        assert!(tracker.snapshot().is_none());

        tracker.begin_transfer();
        assert_eq!(tracker.snapshot().unwrap(), UploadStats::default());
    }

    #[test]
    fn test_transfer_accounting() {
        let tracker = Arc::new(StatsTracker::new());
        let progress = TransferProgress::new(tracker.clone());

        tracker.begin_transfer();
        std::thread::sleep(Duration::from_millis(10));
        progress.advance(600);
        progress.advance(400);

        let stats = tracker.snapshot().unwrap();
        assert_eq!(stats.bytes_sent_current, 1000);
        assert_eq!(stats.total_bytes_uploaded, 0);
        assert!(stats.bytes_per_second > 0.0);

        tracker.complete_transfer(1000);
        let stats = tracker.snapshot().unwrap();
        assert_eq!(stats.bytes_sent_current, 0);
        assert_eq!(stats.total_bytes_uploaded, 1000);
        assert_eq!(stats.bytes_uploaded(), 1000);
        assert_eq!(stats.chunks_uploaded, 1);
    }

    #[test]
    fn test_failure_not_counted_as_uploaded() {
        let tracker = StatsTracker::new();
        tracker.begin_transfer();
        tracker.record_progress(50);
        tracker.fail_transfer(&UploadError::HttpStatus { status: 500 });

        let stats = tracker.snapshot().unwrap();
        assert_eq!(stats.bytes_sent_current, 0);
        assert_eq!(stats.total_bytes_uploaded, 0);
        assert_eq!(stats.chunks_failed, 1);
        assert_eq!(stats.last_error.as_deref(), Some("Server returned HTTP 500"));
    }

    #[test]
    fn test_frozen_tracker_ignores_updates() {
        let tracker = StatsTracker::new();
        tracker.begin_transfer();
        tracker.record_progress(10);
        tracker.freeze();
        tracker.record_progress(10);
        tracker.complete_transfer(20);

        let stats = tracker.snapshot().unwrap();
        assert_eq!(stats.bytes_sent_current, 10);
        assert_eq!(stats.chunks_uploaded, 0);
    }
}
